//! Thin semantic helpers over the wire codec.

use std::net::IpAddr;

use hickory_proto::error::ProtoError;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{Name, Record, RecordType};

/// Returns the canonical form of a domain name: lower-case, fully qualified.
pub(crate) fn canonical_name(name: &str) -> Result<Name, ProtoError> {
    let mut name = Name::from_ascii(name)?.to_lowercase();
    name.set_fqdn(true);
    Ok(name)
}

/// Strips the trailing dot of a fully qualified name, leaving the root alone.
pub(crate) fn trim_dot(name: &str) -> &str {
    if name == "." {
        name
    } else {
        name.strip_suffix('.').unwrap_or(name)
    }
}

/// Classic presentation name of an rcode, as it appears in dig output.
pub(crate) fn rcode_name(rcode: ResponseCode) -> String {
    match rcode {
        ResponseCode::NoError => "NOERROR".to_string(),
        ResponseCode::FormErr => "FORMERR".to_string(),
        ResponseCode::ServFail => "SERVFAIL".to_string(),
        ResponseCode::NXDomain => "NXDOMAIN".to_string(),
        ResponseCode::NotImp => "NOTIMP".to_string(),
        ResponseCode::Refused => "REFUSED".to_string(),
        ResponseCode::YXDomain => "YXDOMAIN".to_string(),
        ResponseCode::YXRRSet => "YXRRSET".to_string(),
        ResponseCode::NXRRSet => "NXRRSET".to_string(),
        ResponseCode::NotAuth => "NOTAUTH".to_string(),
        ResponseCode::NotZone => "NOTZONE".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

/// True if the response carries no record in any section. EDNS OPT
/// pseudo-records do not count as content.
pub(crate) fn is_empty_response(msg: &Message) -> bool {
    msg.answers().is_empty()
        && msg.name_servers().is_empty()
        && msg
            .additionals()
            .iter()
            .all(|rr| rr.record_type() == RecordType::OPT)
}

/// Presentation value of a record, i.e. the zone-file form minus the
/// `name ttl class type` header prefix.
pub(crate) fn rdata_value(record: &Record) -> String {
    match record.data() {
        Some(data) => data.to_string(),
        None => String::new(),
    }
}

/// Returns the reverse-lookup name for an IP address, suitable for PTR
/// queries: dotted-reversed octets under `in-addr.arpa.` for v4, reversed
/// nibbles under `ip6.arpa.` for v6.
pub fn arpa_name(ip: IpAddr) -> Name {
    let name = match ip {
        IpAddr::V4(ip) => {
            let [a, b, c, d] = ip.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa.")
        }
        IpAddr::V6(ip) => {
            let mut labels = Vec::with_capacity(33);
            for byte in ip.octets().iter().rev() {
                labels.push(format!("{:x}", byte & 0xF));
                labels.push(format!("{:x}", byte >> 4));
            }
            labels.push("ip6.arpa.".to_string());
            labels.join(".")
        }
    };

    Name::from_ascii(&name).unwrap_or_else(|_| Name::root())
}
