//! Lazy conversion of referral records into concrete server endpoints.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};

use hickory_proto::rr::{Name, RData, Record};

/// One step of address iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Candidate {
    /// A usable endpoint.
    Endpoint(SocketAddr),
    /// A name-server or alias name without glue. No endpoint exists until a
    /// nested walk resolves the name.
    Unresolved(Name),
}

/// Iterates the endpoints named by a referral, or a hard-coded address list.
///
/// Records are consumed in order. Address records yield endpoints on the
/// configured default port; NS and CNAME records yield the target name for
/// the caller to resolve, unless the target is already an IP literal.
pub(crate) struct AddrIter {
    addrs: VecDeque<SocketAddr>,
    records: VecDeque<Record>,
    default_port: u16,
}

impl AddrIter {
    /// Iterator over referral records. Callers pass address and link records
    /// only; anything else in here is a bug.
    pub(crate) fn from_records(records: Vec<Record>, default_port: u16) -> Self {
        Self {
            addrs: VecDeque::new(),
            records: records.into(),
            default_port,
        }
    }

    /// Iterator over an explicitly configured server list.
    pub(crate) fn from_addrs(addrs: &[SocketAddr]) -> Self {
        Self {
            addrs: addrs.iter().copied().collect(),
            records: VecDeque::new(),
            default_port: 0,
        }
    }

    pub(crate) fn next(&mut self) -> Option<Candidate> {
        if let Some(addr) = self.addrs.pop_front() {
            return Some(Candidate::Endpoint(addr));
        }

        let rr = self.records.pop_front()?;
        let candidate = match rr.data() {
            Some(RData::A(a)) => Candidate::Endpoint(SocketAddr::new(IpAddr::V4(a.0), self.default_port)),
            Some(RData::AAAA(aaaa)) => {
                Candidate::Endpoint(SocketAddr::new(IpAddr::V6(aaaa.0), self.default_port))
            }
            Some(RData::NS(ns)) => self.name_candidate(&ns.0),
            Some(RData::CNAME(cname)) => self.name_candidate(&cname.0),
            _ => unreachable!("unexpected record type in referral: {}", rr.record_type()),
        };

        Some(candidate)
    }

    fn name_candidate(&self, target: &Name) -> Candidate {
        match ip_literal(target) {
            Some(ip) => Candidate::Endpoint(SocketAddr::new(ip, self.default_port)),
            None => Candidate::Unresolved(target.clone()),
        }
    }
}

/// Parses a name that is really an IP address, as some zones publish for NS
/// targets.
pub(crate) fn ip_literal(name: &Name) -> Option<IpAddr> {
    let name = name.to_string();
    name.strip_suffix('.').unwrap_or(&name).parse().ok()
}
