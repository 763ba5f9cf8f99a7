//! # Rootward response cache
//!
//! Bounded mapping from (question, server endpoint) to a complete DNS
//! response, evicted least-recently-used.
//!
//! Each entry carries a policy-assigned TTL; expired entries count as misses
//! and are removed lazily on lookup. The mapping and the eviction order are a
//! single invariant: every mutation updates both under one lock, and their
//! sizes must agree at every quiescent point.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, Query};
use parking_lot::Mutex;
use tracing::trace;

pub mod entry;
pub mod key;

pub use entry::CacheEntry;
pub use key::CacheKey;

/// Default maximum number of cached responses.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// A successful cache lookup.
#[derive(Debug)]
pub struct CacheHit {
    /// Copy of the cached response.
    pub response: Message,
    /// Time spent retrieving the entry.
    pub rtt: Duration,
    /// Time since the entry was inserted.
    pub age: Duration,
}

/// Bounded LRU response cache.
pub struct ResponseCache {
    max_size: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Eviction order, oldest access first. Values mirror `entries` keys.
    order: BTreeMap<u64, CacheKey>,
    next_seq: u64,
}

impl ResponseCache {
    /// Creates a cache holding at most `max_size` responses.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Looks up a cached response for `query` as answered by `server`.
    ///
    /// Entries whose TTL has elapsed at `now` are treated as misses and
    /// removed. A hit refreshes the entry's position in the eviction order.
    pub fn lookup(&self, query: &Query, server: SocketAddr, now: Instant) -> Option<CacheHit> {
        let started = Instant::now();
        let key = CacheKey::new(query.clone(), server);

        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(&key) {
            None => return None,
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.order.remove(&entry.seq);
            }
            inner.check_sync();
            return None;
        }

        let seq = inner.bump_seq();
        let entry = inner.entries.get_mut(&key)?;
        let old_seq = entry.seq;
        entry.seq = seq;
        let hit = CacheHit {
            response: entry.response().clone(),
            rtt: started.elapsed(),
            age: entry.age(now),
        };
        inner.order.remove(&old_seq);
        inner.order.insert(seq, key);
        inner.check_sync();

        Some(hit)
    }

    /// Inserts or replaces the response cached for (`query`, `server`).
    ///
    /// The entry becomes the most recently used; the least recently used
    /// entries are evicted while the cache exceeds its capacity.
    pub fn update(&self, query: &Query, server: SocketAddr, response: &Message, ttl: Duration) {
        let key = CacheKey::new(query.clone(), server);

        let mut inner = self.inner.lock();

        let seq = inner.bump_seq();
        if let Some(old) = inner
            .entries
            .insert(key.clone(), CacheEntry::new(response.clone(), Instant::now(), ttl, seq))
        {
            inner.order.remove(&old.seq);
        }
        inner.order.insert(seq, key);

        while inner.entries.len() > self.max_size {
            let Some((&oldest, _)) = inner.order.iter().next() else {
                break;
            };
            if let Some(evicted) = inner.order.remove(&oldest) {
                trace!(query = %evicted.query().name(), server = %evicted.server(), "evicting");
                inner.entries.remove(&evicted);
            }
        }

        inner.check_sync();
    }

    /// Removes all cached responses.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Returns the number of cached responses.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn check_sync(&self) {
        assert_eq!(
            self.entries.len(),
            self.order.len(),
            "cache mapping and eviction order out of sync",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::{rdata, Name, RData, Record, RecordType};
    use std::str::FromStr;

    fn query(name: &str) -> Query {
        Query::query(Name::from_str(name).unwrap(), RecordType::A)
    }

    fn server(n: u8) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, n], 53))
    }

    fn response(name: &str) -> Message {
        let mut msg = Message::new();
        msg.add_answer(Record::from_rdata(
            Name::from_str(name).unwrap(),
            300,
            RData::A(rdata::A(std::net::Ipv4Addr::new(192, 0, 2, 1))),
        ));
        msg
    }

    #[test]
    fn update_then_lookup_round_trips() {
        let cache = ResponseCache::new(8);
        let q = query("example.com.");
        cache.update(&q, server(1), &response("example.com."), Duration::from_secs(60));

        let hit = cache.lookup(&q, server(1), Instant::now()).unwrap();
        assert_eq!(hit.response.answers().len(), 1);
        assert_eq!(hit.response.answers()[0].name().to_string(), "example.com.");
        assert!(hit.age < Duration::from_secs(1));
    }

    #[test]
    fn miss_on_unknown_key_and_on_other_server() {
        let cache = ResponseCache::new(8);
        let q = query("example.com.");
        cache.update(&q, server(1), &response("example.com."), Duration::from_secs(60));

        assert!(cache.lookup(&query("other.com."), server(1), Instant::now()).is_none());
        assert!(cache.lookup(&q, server(2), Instant::now()).is_none());
    }

    #[test]
    fn expired_entries_are_misses_and_removed() {
        let cache = ResponseCache::new(8);
        let q = query("example.com.");
        cache.update(&q, server(1), &response("example.com."), Duration::from_millis(10));
        assert_eq!(cache.len(), 1);

        let later = Instant::now() + Duration::from_secs(5);
        assert!(cache.lookup(&q, server(1), later).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_is_enforced_lru() {
        let cache = ResponseCache::new(3);
        for i in 1..=3 {
            cache.update(&query(&format!("{i}.example.com.")), server(i), &response("example.com."), Duration::from_secs(60));
        }

        // Touch the oldest entry so it becomes the most recent.
        assert!(cache
            .lookup(&query("1.example.com."), server(1), Instant::now())
            .is_some());

        cache.update(&query("4.example.com."), server(4), &response("example.com."), Duration::from_secs(60));
        assert_eq!(cache.len(), 3);

        // Entry 2 was the least recently used one.
        assert!(cache.lookup(&query("2.example.com."), server(2), Instant::now()).is_none());
        assert!(cache.lookup(&query("1.example.com."), server(1), Instant::now()).is_some());
        assert!(cache.lookup(&query("4.example.com."), server(4), Instant::now()).is_some());
    }

    #[test]
    fn update_replaces_existing_entry_in_place() {
        let cache = ResponseCache::new(8);
        let q = query("example.com.");
        cache.update(&q, server(1), &response("example.com."), Duration::from_secs(60));
        cache.update(&q, server(1), &response("other.com."), Duration::from_secs(60));
        assert_eq!(cache.len(), 1);

        let hit = cache.lookup(&q, server(1), Instant::now()).unwrap();
        assert_eq!(hit.response.answers()[0].name().to_string(), "other.com.");
    }

    #[test]
    fn clear_empties_both_structures() {
        let cache = ResponseCache::new(8);
        cache.update(&query("example.com."), server(1), &response("example.com."), Duration::from_secs(60));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.lookup(&query("example.com."), server(1), Instant::now()).is_none());
    }
}
