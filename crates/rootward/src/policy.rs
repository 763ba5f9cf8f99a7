//! Timeout and cache policies.
//!
//! Both policies are plain functions: they are snapshotted at the start of a
//! lookup, so replacing them mid-walk from another thread is harmless.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use ipnet::IpNet;
use once_cell::sync::Lazy;

use crate::record_set::RecordSet;

/// Decides the round-trip timeout for a single DNS exchange, given the
/// record type and name being queried and the server endpoint. A zero
/// duration means no timeout.
pub type TimeoutPolicy = Arc<dyn Fn(RecordType, &Name, SocketAddr) -> Duration + Send + Sync>;

/// Decides how long a response may be served from the cache. Zero means the
/// response is not cached at all.
pub type CachePolicy = Arc<dyn Fn(&RecordSet) -> Duration + Send + Sync>;

/// Address blocks assumed to be nearby: private ranges, loopback,
/// link-local, and the documentation and benchmark nets.
pub static RESERVED_NETS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.0.2.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "198.51.100.0/24",
        "203.0.113.0/24",
        "233.252.0.0/24",
        "::1/128",
        "2001:db8::/32",
        "fd00::/8",
        "fe80::/10",
    ]
    .iter()
    .map(|net| net.parse().expect("reserved net literal"))
    .collect()
});

/// The timeout policy used when none is configured.
///
/// Assumes low latency to addresses in [`RESERVED_NETS`] and times those
/// exchanges out after 100 milliseconds; everything else gets one second.
pub fn default_timeout_policy() -> TimeoutPolicy {
    Arc::new(|_record_type, _name, server| {
        let ip = server.ip();
        if RESERVED_NETS.iter().any(|net| net.contains(&ip)) {
            Duration::from_millis(100)
        } else {
            Duration::from_secs(1)
        }
    })
}

/// The cache policy used when none is configured.
///
/// Obeys the server-returned TTL for responses that delegate a public suffix
/// (".com", "co.uk", ...; see <https://publicsuffix.org>) and caches nothing
/// else. Those delegations are the stable upper levels of the tree that
/// every lookup walks through.
pub fn default_cache_policy() -> CachePolicy {
    Arc::new(|set| {
        let Some(raw) = &set.raw else {
            return Duration::ZERO;
        };
        delegated_suffix_ttl(raw).unwrap_or(Duration::ZERO)
    })
}

/// Returns a policy that obeys the TTL advice returned by name servers,
/// caching non-success responses for `negative_ttl` instead.
pub fn obey_responder_advice(negative_ttl: Duration) -> CachePolicy {
    Arc::new(move |set| {
        let rcode = set
            .raw
            .as_ref()
            .map(Message::response_code)
            .unwrap_or(ResponseCode::NoError);
        if rcode != ResponseCode::NoError {
            negative_ttl
        } else {
            set.ttl
        }
    })
}

/// TTL of the delegation if answer and authority consist entirely of NS
/// records for one owner name that is a public suffix.
fn delegated_suffix_ttl(msg: &Message) -> Option<Duration> {
    let mut owner: Option<&Name> = None;
    let mut ttl: Option<u32> = None;

    for rr in msg.answers().iter().chain(msg.name_servers()) {
        if rr.record_type() != RecordType::NS {
            return None;
        }

        match owner {
            None => {
                if !is_public_suffix(&rr.name().to_lowercase().to_string()) {
                    return None;
                }
                owner = Some(rr.name());
            }
            Some(seen) if seen != rr.name() => return None,
            Some(_) => {}
        }

        ttl = Some(ttl.map_or(rr.ttl(), |t| t.min(rr.ttl())));
    }

    ttl.map(|t| Duration::from_secs(u64::from(t)))
}

/// True if the fully qualified name is a public suffix. The root is one.
pub(crate) fn is_public_suffix(fqdn: &str) -> bool {
    if fqdn == "." {
        return true;
    }

    let name = fqdn.strip_suffix('.').unwrap_or(fqdn);
    match psl::suffix(name.as_bytes()) {
        Some(suffix) => suffix.as_bytes() == name.as_bytes(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{a, msg, ns};

    #[test]
    fn public_suffix_accepts_root_and_registries() {
        for (fqdn, want) in [
            (".", true),
            ("com.", true),
            ("foo.com.", false),
            ("uk.", true),
            ("co.uk.", true),
            ("foo.co.uk.", false),
            ("aero.", true),
            ("in-addr.arpa.", true),
            ("ip6.arpa.", true),
        ] {
            assert_eq!(is_public_suffix(fqdn), want, "{fqdn}");
        }
    }

    #[test]
    fn default_timeouts_distinguish_reserved_ranges() {
        let policy = default_timeout_policy();
        let name = Name::from_ascii("example.com.").unwrap();

        assert_eq!(
            policy(RecordType::A, &name, "127.0.0.1:53".parse().unwrap()),
            Duration::from_millis(100),
        );
        assert_eq!(
            policy(RecordType::A, &name, "10.1.2.3:53".parse().unwrap()),
            Duration::from_millis(100),
        );
        assert_eq!(
            policy(RecordType::A, &name, "[fd00::1]:53".parse().unwrap()),
            Duration::from_millis(100),
        );
        assert_eq!(
            policy(RecordType::A, &name, "198.41.0.4:53".parse().unwrap()),
            Duration::from_secs(1),
        );
    }

    fn set_with(answer: Vec<hickory_proto::rr::Record>, authority: Vec<hickory_proto::rr::Record>) -> RecordSet {
        let mut set = RecordSet::shell("bbc.co.uk", "A");
        set.raw = Some(msg(answer, authority, vec![]));
        set
    }

    #[test]
    fn default_cache_policy_caches_public_suffix_delegations() {
        let policy = default_cache_policy();

        // Single public-suffix owner: obey the advertised TTL.
        let set = set_with(vec![], vec![ns("uk.", 172_800, "nsa.nic.uk.")]);
        assert_eq!(policy(&set), Duration::from_secs(172_800));

        // Several records for the same owner: smallest TTL wins.
        let set = set_with(
            vec![],
            vec![ns("uk.", 172_800, "nsa.nic.uk."), ns("uk.", 300, "nsb.nic.uk.")],
        );
        assert_eq!(policy(&set), Duration::from_secs(300));

        // Not a public suffix.
        let set = set_with(vec![], vec![ns("bbc.co.uk.", 172_800, "dns1.bbc.co.uk.")]);
        assert_eq!(policy(&set), Duration::ZERO);

        // Mixed owners are not a clean delegation.
        let set = set_with(
            vec![],
            vec![ns("uk.", 172_800, "nsa.nic.uk."), ns("co.uk.", 172_800, "nsa.nic.uk.")],
        );
        assert_eq!(policy(&set), Duration::ZERO);

        // Non-NS content disqualifies the response.
        let set = set_with(vec![a("uk.", 300, "192.0.2.1")], vec![ns("uk.", 172_800, "nsa.nic.uk.")]);
        assert_eq!(policy(&set), Duration::ZERO);

        // Nothing to go by.
        let set = set_with(vec![], vec![]);
        assert_eq!(policy(&set), Duration::ZERO);
    }

    #[test]
    fn responder_advice_uses_negative_ttl_for_errors() {
        let policy = obey_responder_advice(Duration::from_secs(30));

        let mut set = RecordSet::shell("example.com", "A");
        set.ttl = Duration::from_secs(300);
        set.raw = Some(msg(vec![a("example.com.", 300, "192.0.2.1")], vec![], vec![]));
        assert_eq!(policy(&set), Duration::from_secs(300));

        let mut failed = RecordSet::shell("example.com", "A");
        let mut raw = msg(vec![], vec![], vec![]);
        raw.set_response_code(ResponseCode::NXDomain);
        failed.raw = Some(raw);
        assert_eq!(policy(&failed), Duration::from_secs(30));
    }
}
