//! The public result of a lookup.

use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::op::{Message, Query, ResponseCode};

use crate::error::ErrorKind;
use crate::normalize::{normalize, RecordIndex};
use crate::trace::Trace;
use crate::wire::{rcode_name, trim_dot};

/// A resolved record set.
///
/// Name, record type, server, RTT, and age are filled in even when the
/// lookup ends in an error; the values and TTL only on success.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    /// The domain name as passed to [`crate::Resolver::query`].
    pub name: String,

    /// The record type that was queried, such as "A" or "SRV". If the final
    /// response indicates an error, this becomes the rcode name instead,
    /// such as "NXDOMAIN".
    pub record_type: String,

    /// Smallest time-to-live across the records that contributed values. A
    /// caching intermediary may advertise less than the authoritative TTL.
    pub ttl: Duration,

    /// Value of each contributing record, in the order sent by the server.
    /// Values may be quoted, for instance in TXT record sets.
    pub values: Vec<String>,

    /// The name server that produced the final response.
    pub server: Option<SocketAddr>,

    /// Time since the final response was inserted into the cache. `None`
    /// when it was answered live on the wire.
    pub age: Option<Duration>,

    /// Measured round-trip time of the final exchange. Excludes time spent
    /// on nested lookups such as glue resolution.
    pub rtt: Duration,

    /// Every DNS exchange performed for this lookup.
    pub trace: Trace,

    /// The raw final response.
    pub raw: Option<Message>,
}

impl RecordSet {
    /// An empty set carrying only the question.
    pub(crate) fn shell(name: &str, record_type: &str) -> Self {
        Self {
            name: name.to_string(),
            record_type: record_type.to_string(),
            ..Self::default()
        }
    }

    /// A single-exchange view of `response`, handed to cache policies and
    /// the log callback. Value extraction is best-effort here: referral
    /// responses do not answer the question directly, and then the TTL falls
    /// back to the smallest one among the normalized records.
    pub(crate) fn preview(
        query: &Query,
        response: &Message,
        server: SocketAddr,
        rtt: Duration,
        age: Option<Duration>,
    ) -> Self {
        let mut set = Self {
            name: trim_dot(&query.name().to_string()).to_string(),
            record_type: query.query_type().to_string(),
            server: Some(server),
            age,
            rtt,
            raw: Some(response.clone()),
            ..Self::default()
        };

        if response.response_code() != ResponseCode::NoError {
            set.record_type = rcode_name(response.response_code());
        }

        match RecordIndex::new(response).search(query.name(), query.query_type()) {
            Ok((values, ttl)) => {
                set.values = values;
                set.ttl = Duration::from_secs(u64::from(ttl));
            }
            Err(_) => {
                if let Some(ttl) = normalize(response).iter().map(|rr| rr.ttl()).min() {
                    set.ttl = Duration::from_secs(u64::from(ttl));
                }
            }
        }

        set
    }

    /// A view of a failed exchange, for the log callback.
    pub(crate) fn probe(query: &Query, server: SocketAddr, rtt: Duration) -> Self {
        Self {
            name: trim_dot(&query.name().to_string()).to_string(),
            record_type: query.query_type().to_string(),
            server: Some(server),
            rtt,
            ..Self::default()
        }
    }

    /// Extracts values and TTL from the terminal authoritative response.
    pub(crate) fn finish(&mut self, query: &Query, response: &Message) -> Result<(), ErrorKind> {
        match RecordIndex::new(response).search(query.name(), query.query_type()) {
            Ok((values, ttl)) => {
                self.values = values;
                self.ttl = Duration::from_secs(u64::from(ttl));
                Ok(())
            }
            Err(kind) => {
                if matches!(kind, ErrorKind::NxDomain) {
                    self.record_type = "NXDOMAIN".to_string();
                }
                Err(kind)
            }
        }
    }
}
