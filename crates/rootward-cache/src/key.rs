//! Cache key implementation.

use hickory_proto::op::Query;
use std::net::SocketAddr;

/// Cache key for DNS responses.
///
/// Responses are cached per server, not just per question: during a
/// delegation walk the same question is asked of several servers and the
/// answers legitimately differ at every level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: Query,
    server: SocketAddr,
}

impl CacheKey {
    /// Creates a new cache key.
    pub fn new(query: Query, server: SocketAddr) -> Self {
        Self { query, server }
    }

    /// Returns the question.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the server endpoint.
    pub fn server(&self) -> SocketAddr {
        self.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn key(name: &str, server: &str) -> CacheKey {
        CacheKey::new(
            Query::query(Name::from_str(name).unwrap(), RecordType::A),
            server.parse().unwrap(),
        )
    }

    #[test]
    fn name_comparison_is_case_insensitive() {
        assert_eq!(key("example.com.", "127.0.0.1:53"), key("EXAMPLE.COM.", "127.0.0.1:53"));
    }

    #[test]
    fn server_is_part_of_the_key() {
        assert_ne!(key("example.com.", "127.0.0.1:53"), key("example.com.", "127.0.0.2:53"));
    }
}
