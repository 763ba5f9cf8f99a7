//! Record and message constructors shared by unit tests.

use hickory_proto::op::Message;
use hickory_proto::rr::{rdata, Name, RData, Record};
use std::net::{Ipv4Addr, Ipv6Addr};

pub(crate) fn a(name: &str, ttl: u32, ip: &str) -> Record {
    let ip: Ipv4Addr = ip.parse().unwrap();
    Record::from_rdata(Name::from_ascii(name).unwrap(), ttl, RData::A(rdata::A(ip)))
}

pub(crate) fn aaaa(name: &str, ttl: u32, ip: &str) -> Record {
    let ip: Ipv6Addr = ip.parse().unwrap();
    Record::from_rdata(Name::from_ascii(name).unwrap(), ttl, RData::AAAA(rdata::AAAA(ip)))
}

pub(crate) fn ns(name: &str, ttl: u32, target: &str) -> Record {
    Record::from_rdata(
        Name::from_ascii(name).unwrap(),
        ttl,
        RData::NS(rdata::NS(Name::from_ascii(target).unwrap())),
    )
}

pub(crate) fn cname(name: &str, ttl: u32, target: &str) -> Record {
    Record::from_rdata(
        Name::from_ascii(name).unwrap(),
        ttl,
        RData::CNAME(rdata::CNAME(Name::from_ascii(target).unwrap())),
    )
}

pub(crate) fn msg(answer: Vec<Record>, authority: Vec<Record>, additional: Vec<Record>) -> Message {
    let mut m = Message::new();
    for rr in answer {
        m.add_answer(rr);
    }
    for rr in authority {
        m.add_name_server(rr);
    }
    for rr in additional {
        m.add_additional(rr);
    }
    m
}
