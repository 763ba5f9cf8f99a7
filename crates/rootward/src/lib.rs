//! # Rootward
//!
//! Recursive DNS resolver for callers that need authoritative, current
//! answers rather than whatever a stub resolver has cached.
//!
//! ## Features
//!
//! - Full delegation walk from the root name servers to the authoritative
//!   server, with referral fallback across redundant servers
//! - Glue resolution through nested walks when delegations name servers
//!   without addresses
//! - CNAME chasing with cycle rejection, in responses and across walks
//! - Bounded per-(question, server) response cache behind a pluggable
//!   [`CachePolicy`]
//! - Pluggable per-exchange [`TimeoutPolicy`]
//! - A complete [`Trace`] of every exchange a lookup performed
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> Result<(), rootward::ResolveError> {
//! let resolver = rootward::Resolver::new();
//! let set = resolver.query("A", "www.example.com").await?;
//! for value in &set.values {
//!     println!("{value}\t(ttl {:?})", set.ttl);
//! }
//! println!("{}", set.trace.dump());
//! # Ok(())
//! # }
//! ```
//!
//! The wire format is handled by [`hickory_proto`]; this crate only decides
//! where to send which question next.

mod addrs;
mod bootstrap;
mod normalize;
mod record_set;
#[cfg(test)]
mod testutil;
mod wire;

pub mod error;
pub mod policy;
pub mod resolver;
pub mod trace;

pub use error::{ErrorKind, InvalidServerAddr, ResolveError};
pub use policy::{
    default_cache_policy, default_timeout_policy, obey_responder_advice, CachePolicy, TimeoutPolicy,
};
pub use record_set::RecordSet;
pub use resolver::{LogFn, Resolver, ResolverConfig};
pub use trace::{Trace, TraceNode};
pub use wire::arpa_name;
