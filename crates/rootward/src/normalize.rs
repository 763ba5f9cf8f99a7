//! Response normalization and the record index used for value extraction.
//!
//! Responses frequently answer a question indirectly: a CNAME in the answer
//! section with the address in additional, or an NS delegation with glue.
//! [`normalize`] flattens those links so callers can read addresses off the
//! records directly, and [`RecordIndex`] resolves a (name, type) pair through
//! CNAME chains to the final values.

use std::collections::{HashMap, HashSet};

use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RData, Record, RecordType};

use crate::error::ErrorKind;
use crate::wire::rdata_value;

/// Target name of a CNAME or NS record, if it is one.
fn link_target(record: &Record) -> Option<&Name> {
    match record.data() {
        Some(RData::CNAME(cname)) => Some(&cname.0),
        Some(RData::NS(ns)) => Some(&ns.0),
        _ => None,
    }
}

/// Returns a copy of the response's records with CNAME and NS records
/// collapsed onto their resolved targets where the response allows it.
///
/// Each emitted record keeps the owner name of the record that headed its
/// chain and adopts the smallest TTL seen along the chain. Chains that close
/// on themselves contribute nothing. Records only reachable from the
/// additional section are omitted, and duplicates are removed keeping the
/// smallest TTL. The response itself is not modified.
pub(crate) fn normalize(msg: &Message) -> Vec<Record> {
    let all: Vec<&Record> = msg
        .answers()
        .iter()
        .chain(msg.name_servers())
        .chain(msg.additionals())
        .collect();

    // Names that are the target of some link are not chain heads themselves.
    let linked: HashSet<&Name> = all.iter().filter_map(|rr| link_target(rr)).collect();

    let mut out: Vec<Record> = Vec::new();

    for rr in msg.answers().iter().chain(msg.name_servers()) {
        if linked.contains(rr.name()) {
            continue;
        }

        let Some(target) = link_target(rr) else {
            out.push(rr.clone());
            continue;
        };

        let mut seen = HashSet::new();
        match find_replacements(&all, target, rr.ttl(), &mut seen) {
            // Chain closed on itself.
            None => continue,
            // Nothing to resolve the link against.
            Some((replacements, _)) if replacements.is_empty() => out.push(rr.clone()),
            Some((replacements, ttl)) => {
                for found in replacements {
                    let mut copy = found;
                    copy.set_name(rr.name().clone());
                    if ttl < copy.ttl() {
                        copy.set_ttl(ttl);
                    }
                    out.push(copy);
                }
            }
        }
    }

    dedup(out)
}

/// Collects the records a chain starting at `name` resolves to, following
/// CNAME links and carrying the smallest TTL seen. `None` signals a cycle.
fn find_replacements(
    all: &[&Record],
    name: &Name,
    mut ttl: u32,
    seen: &mut HashSet<Name>,
) -> Option<(Vec<Record>, u32)> {
    if !seen.insert(name.clone()) {
        return None;
    }

    let mut found = Vec::new();

    for rr in all {
        if rr.name() != name {
            continue;
        }

        if rr.ttl() < ttl {
            ttl = rr.ttl();
        }

        if let Some(RData::CNAME(cname)) = rr.data() {
            let (inner, new_ttl) = find_replacements(all, &cname.0, ttl, seen)?;
            ttl = new_ttl;
            if inner.is_empty() {
                found.push((*rr).clone());
            } else {
                found.extend(inner);
            }
        } else {
            found.push((*rr).clone());
        }
    }

    Some((found, ttl))
}

/// Removes duplicate records, keeping first occurrence and smallest TTL.
fn dedup(records: Vec<Record>) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Record> = Vec::new();

    for rr in records {
        let key = format!(
            "{} {} {} {}",
            rr.name().to_lowercase(),
            rr.dns_class(),
            rr.record_type(),
            rdata_value(&rr),
        );
        match index.get(&key) {
            Some(&at) => {
                if rr.ttl() < out[at].ttl() {
                    out[at].set_ttl(rr.ttl());
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(rr);
            }
        }
    }

    out
}

/// Per-(name, type) view of a response's answer and additional sections.
pub(crate) struct RecordIndex {
    entries: HashMap<Name, HashMap<RecordType, TypeEntry>>,
}

#[derive(Default)]
struct TypeEntry {
    /// Presentation values, in response order.
    values: Vec<String>,
    /// Link targets, populated for CNAME and NS records.
    targets: Vec<Name>,
    min_ttl: u32,
}

impl RecordIndex {
    pub(crate) fn new(msg: &Message) -> Self {
        let mut entries: HashMap<Name, HashMap<RecordType, TypeEntry>> = HashMap::new();

        for rr in msg.answers().iter().chain(msg.additionals()) {
            let entry = entries
                .entry(rr.name().to_lowercase())
                .or_default()
                .entry(rr.record_type())
                .or_insert_with(|| TypeEntry {
                    min_ttl: u32::MAX,
                    ..TypeEntry::default()
                });

            entry.values.push(rdata_value(rr));
            if let Some(target) = link_target(rr) {
                entry.targets.push(target.to_lowercase());
            }
            if rr.ttl() < entry.min_ttl {
                entry.min_ttl = rr.ttl();
            }
        }

        Self { entries }
    }

    /// Returns the values recorded for exactly (`name`, `rtype`), following
    /// single CNAME links otherwise, together with the smallest TTL along the
    /// path taken.
    pub(crate) fn search(&self, name: &Name, rtype: RecordType) -> Result<(Vec<String>, u32), ErrorKind> {
        let mut seen = HashSet::new();
        self.search_from(name.to_lowercase(), rtype, u32::MAX, &mut seen)
    }

    fn search_from(
        &self,
        name: Name,
        rtype: RecordType,
        ttl: u32,
        seen: &mut HashSet<Name>,
    ) -> Result<(Vec<String>, u32), ErrorKind> {
        if !seen.insert(name.clone()) {
            return Err(ErrorKind::Circular(format!("repeated name: {name}")));
        }

        let Some(by_type) = self.entries.get(&name) else {
            return Err(ErrorKind::NxDomain);
        };

        if let Some(entry) = by_type.get(&rtype) {
            return Ok((entry.values.clone(), ttl.min(entry.min_ttl)));
        }

        if let Some(cname) = by_type.get(&RecordType::CNAME) {
            if let Some(target) = cname.targets.first() {
                return self.search_from(target.clone(), rtype, ttl.min(cname.min_ttl), seen);
            }
        }

        Err(ErrorKind::NxDomain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{a, cname, msg, ns};

    fn lines(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|rr| {
                format!(
                    "{} {} {} {}",
                    rr.name(),
                    rr.ttl(),
                    rr.record_type(),
                    rdata_value(rr),
                )
            })
            .collect()
    }

    #[test]
    fn plain_records_are_copied_additional_dropped() {
        let m = msg(
            vec![a("ns1.example.com.", 300, "192.0.2.1"), a("ns1.example.com.", 300, "192.0.2.2")],
            vec![a("ns2.example.com.", 300, "192.0.2.3")],
            vec![a("ns3.example.com.", 300, "192.0.2.4")],
        );

        assert_eq!(
            lines(&normalize(&m)),
            vec![
                "ns1.example.com. 300 A 192.0.2.1",
                "ns1.example.com. 300 A 192.0.2.2",
                "ns2.example.com. 300 A 192.0.2.3",
            ],
        );
    }

    #[test]
    fn cname_collapses_onto_additional_glue() {
        let m = msg(
            vec![cname("ns1.", 300, "ns1.example.com.")],
            vec![],
            vec![a("ns1.example.com.", 300, "192.0.2.1")],
        );

        assert_eq!(lines(&normalize(&m)), vec!["ns1. 300 A 192.0.2.1"]);
    }

    #[test]
    fn cname_collapses_within_the_answer_section() {
        let m = msg(
            vec![cname("ns1.", 300, "ns1.example.com."), a("ns1.example.com.", 300, "192.0.2.1")],
            vec![],
            vec![],
        );

        assert_eq!(lines(&normalize(&m)), vec!["ns1. 300 A 192.0.2.1"]);
    }

    #[test]
    fn cname_chains_resolve_transitively() {
        let m = msg(
            vec![cname("ns1.", 300, "ns1.example.com."), cname("ns1.example.com.", 300, "ns2.example.com.")],
            vec![],
            vec![a("ns2.example.com.", 300, "192.0.2.1")],
        );

        assert_eq!(lines(&normalize(&m)), vec!["ns1. 300 A 192.0.2.1"]);
    }

    #[test]
    fn ns_collapses_onto_glue_keeping_direct_addresses() {
        let m = msg(
            vec![ns("ns1.", 300, "ns1.example.com."), a("ns1.", 300, "192.0.2.3")],
            vec![],
            vec![a("ns1.example.com.", 300, "192.0.2.1"), a("ns1.example.com.", 300, "192.0.2.2")],
        );

        assert_eq!(
            lines(&normalize(&m)),
            vec!["ns1. 300 A 192.0.2.1", "ns1. 300 A 192.0.2.2", "ns1. 300 A 192.0.2.3"],
        );
    }

    #[test]
    fn chain_adopts_the_smallest_ttl() {
        let m = msg(
            vec![ns("ns1.", 300, "ns.example.com."), ns("ns2.", 111, "ns.example.com.")],
            vec![],
            vec![a("ns.example.com.", 300, "192.0.2.1")],
        );

        assert_eq!(
            lines(&normalize(&m)),
            vec!["ns1. 300 A 192.0.2.1", "ns2. 111 A 192.0.2.1"],
        );
    }

    #[test]
    fn unrelated_additional_records_are_not_pulled_in() {
        let m = msg(
            vec![ns("ns1.", 300, "ns.example.com."), ns("ns2.", 111, "ns.example.com.")],
            vec![],
            vec![a("ns.example.com.", 300, "192.0.2.1"), a("unrelated.", 300, "192.0.2.1")],
        );

        assert_eq!(
            lines(&normalize(&m)),
            vec!["ns1. 300 A 192.0.2.1", "ns2. 111 A 192.0.2.1"],
        );
    }

    #[test]
    fn circular_glue_contributes_nothing() {
        let m = msg(
            vec![a("foo.", 300, "192.0.2.1")],
            vec![ns("ns1.", 300, "ns1.example.com.")],
            vec![
                cname("ns1.example.com.", 300, "ns2.example.com."),
                cname("ns2.example.com.", 300, "ns1.example.com."),
            ],
        );

        assert_eq!(lines(&normalize(&m)), vec!["foo. 300 A 192.0.2.1"]);
    }

    #[test]
    fn unresolved_chain_keeps_the_last_link_with_chain_ttl() {
        let m = msg(
            vec![cname("ns1.", 300, "ns2."), cname("ns2.", 111, "ns3."), cname("ns3.", 222, "ns4.")],
            vec![],
            vec![],
        );

        assert_eq!(lines(&normalize(&m)), vec!["ns1. 111 CNAME ns4."]);
    }

    #[test]
    fn glueless_delegations_pass_through() {
        let m = msg(
            vec![],
            vec![ns("ns1.", 300, "ns1.example.com."), ns("ns2.", 300, "ns2.example.com.")],
            vec![],
        );

        assert_eq!(
            lines(&normalize(&m)),
            vec!["ns1. 300 NS ns1.example.com.", "ns2. 300 NS ns2.example.com."],
        );
    }

    #[test]
    fn input_is_not_modified() {
        let m = msg(
            vec![cname("ns1.", 300, "ns1.example.com.")],
            vec![],
            vec![a("ns1.example.com.", 100, "192.0.2.1")],
        );
        let before = format!("{m:?}");

        let _ = normalize(&m);

        assert_eq!(before, format!("{m:?}"));
    }

    #[test]
    fn index_finds_exact_records() {
        let m = msg(vec![a("example.com.", 300, "192.0.2.1")], vec![], vec![]);
        let index = RecordIndex::new(&m);

        let (values, ttl) = index
            .search(&Name::from_ascii("example.com.").unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(values, vec!["192.0.2.1"]);
        assert_eq!(ttl, 300);
    }

    #[test]
    fn index_misses_on_wrong_type() {
        let m = msg(vec![a("example.com.", 300, "192.0.2.1")], vec![], vec![]);
        let index = RecordIndex::new(&m);

        let err = index
            .search(&Name::from_ascii("example.com.").unwrap(), RecordType::AAAA)
            .unwrap_err();
        assert!(matches!(err, ErrorKind::NxDomain));
    }

    #[test]
    fn index_follows_cname_into_additional() {
        let m = msg(
            vec![cname("example.com.", 300, "www.example.com.")],
            vec![],
            vec![a("www.example.com.", 200, "192.0.2.1")],
        );
        let index = RecordIndex::new(&m);

        let (values, ttl) = index
            .search(&Name::from_ascii("example.com.").unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(values, vec!["192.0.2.1"]);
        assert_eq!(ttl, 200);
    }

    #[test]
    fn index_carries_minimum_ttl_through_chains() {
        let m = msg(
            vec![
                cname("example.com.", 300, "www.example.com."),
                cname("www.example.com.", 199, "foo.www.example.com."),
                cname("foo.www.example.com.", 200, "bar.www.example.com."),
                a("bar.www.example.com.", 200, "192.0.2.1"),
                a("bar.www.example.com.", 200, "192.0.2.2"),
                a("bar.www.example.com.", 200, "192.0.2.3"),
            ],
            vec![],
            vec![],
        );
        let index = RecordIndex::new(&m);

        let (values, ttl) = index
            .search(&Name::from_ascii("example.com.").unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(values, vec!["192.0.2.1", "192.0.2.2", "192.0.2.3"]);
        assert_eq!(ttl, 199);
    }

    #[test]
    fn index_rejects_cname_loops() {
        let m = msg(
            vec![
                cname("example.com.", 300, "www.example.com."),
                cname("www.example.com.", 199, "example.com."),
            ],
            vec![],
            vec![],
        );
        let index = RecordIndex::new(&m);

        let err = index
            .search(&Name::from_ascii("example.com.").unwrap(), RecordType::A)
            .unwrap_err();
        assert!(err.is_circular());
    }
}
