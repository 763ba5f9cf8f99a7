//! Error taxonomy for recursive lookups.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::record_set::RecordSet;

/// The failure kinds a lookup can end with.
///
/// Network-level kinds ([`Network`](ErrorKind::Network),
/// [`Timeout`](ErrorKind::Timeout), [`Protocol`](ErrorKind::Protocol)) are
/// recovered internally by skipping to the next candidate server; they only
/// surface when no candidate is left. Everything else ends the lookup
/// immediately.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Unknown record-type string passed to [`crate::Resolver::query`].
    #[error("unsupported record type: {0}")]
    UnsupportedType(String),

    /// The authoritative server denied the name's existence.
    #[error("NXDOMAIN response")]
    NxDomain,

    /// Records refer to one another, typically through CNAME or NS chains.
    #[error("circular reference: {0}")]
    Circular(String),

    /// Non-success rcode other than NXDOMAIN on the outermost question.
    #[error("{0} response")]
    Server(String),

    /// Every candidate endpoint and alternate server name has been tried.
    #[error("no name servers available")]
    ServersExhausted,

    /// A success response carrying neither referral endpoints nor names.
    #[error("empty response")]
    EmptyResponse,

    /// Root name server discovery failed on every bootstrap server.
    #[error("discover root name servers: {0}")]
    Bootstrap(#[source] Box<ErrorKind>),

    /// Transport-level failure on a single exchange.
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// A single exchange exceeded the policy-assigned timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Malformed or mismatched data from the wire.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ErrorKind {
    /// True if this is an NXDOMAIN failure, looking through the bootstrap
    /// wrapper.
    pub fn is_nx_domain(&self) -> bool {
        match self {
            Self::NxDomain => true,
            Self::Bootstrap(inner) => inner.is_nx_domain(),
            _ => false,
        }
    }

    /// True if this is a circular-reference failure, looking through the
    /// bootstrap wrapper.
    pub fn is_circular(&self) -> bool {
        match self {
            Self::Circular(_) => true,
            Self::Bootstrap(inner) => inner.is_circular(),
            _ => false,
        }
    }
}

/// A failed lookup, carrying the question for traceability and the partial
/// [`RecordSet`] (including its trace) collected before the failure.
#[derive(Debug, Error)]
#[error("{query_type} {name}: {kind}")]
pub struct ResolveError {
    query_type: String,
    name: String,
    #[source]
    kind: ErrorKind,
    record_set: Box<RecordSet>,
}

impl ResolveError {
    pub(crate) fn new(query_type: &str, name: &str, kind: ErrorKind, record_set: RecordSet) -> Self {
        Self {
            query_type: query_type.to_string(),
            name: name.to_string(),
            kind,
            record_set: Box::new(record_set),
        }
    }

    /// Returns the failure kind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the partial record set, whose trace reports every exchange
    /// performed before the failure.
    pub fn record_set(&self) -> &RecordSet {
        &self.record_set
    }

    /// Consumes the error, returning the partial record set.
    pub fn into_record_set(self) -> RecordSet {
        *self.record_set
    }

    /// True if the lookup ended with an NXDOMAIN response.
    pub fn is_nx_domain(&self) -> bool {
        self.kind.is_nx_domain()
    }

    /// True if the lookup was aborted because records refer to one another.
    pub fn is_circular(&self) -> bool {
        self.kind.is_circular()
    }
}

/// A bootstrap server address that is not an IP address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not an ip address: {0}")]
pub struct InvalidServerAddr(pub(crate) String);
