//! Query trace: a tree of every DNS exchange performed during one lookup.
//!
//! A trace typically starts with the root NS query against a bootstrap
//! server. Glue resolution nests: the exchanges of an inner walk become
//! children of the exchange whose referral made them necessary.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::Record;

use crate::wire::{is_empty_response, rcode_name, rdata_value};

const MAX_DUMP_DEPTH: usize = 20;

/// One DNS exchange: the question, where it was sent, and what came back.
#[derive(Debug, Clone)]
pub struct TraceNode {
    /// Server the query was sent to.
    pub server: SocketAddr,
    /// The question asked.
    pub query: Query,
    /// The response, if one was received.
    pub response: Option<Message>,
    /// Round-trip time of this exchange, or the cache retrieval time.
    pub rtt: Duration,
    /// Present when the response was served from the cache.
    pub cache_age: Option<Duration>,
    /// Present when the exchange failed.
    pub error: Option<String>,
    /// Exchanges of nested walks caused by this one.
    pub children: Vec<TraceNode>,
}

/// Tree-structured record of every query performed during one lookup.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    nodes: Vec<TraceNode>,
    /// Index path to the node new exchanges currently nest under.
    path: Vec<usize>,
}

impl Trace {
    /// Returns the top-level exchanges.
    pub fn nodes(&self) -> &[TraceNode] {
        &self.nodes
    }

    /// True if an exchange for (`query`, `server`) was already recorded
    /// anywhere in this trace.
    pub(crate) fn contains(&self, query: &Query, server: SocketAddr) -> bool {
        fn scan(nodes: &[TraceNode], query: &Query, server: SocketAddr) -> bool {
            nodes.iter().any(|node| {
                (node.server == server && &node.query == query)
                    || scan(&node.children, query, server)
            })
        }
        scan(&self.nodes, query, server)
    }

    pub(crate) fn add(&mut self, node: TraceNode) {
        self.level().push(node);
    }

    /// Makes subsequent exchanges children of the most recent one.
    pub(crate) fn push(&mut self) {
        let len = self.level().len();
        if len > 0 {
            self.path.push(len - 1);
        }
    }

    /// Returns to the previous nesting level.
    pub(crate) fn pop(&mut self) {
        self.path.pop();
    }

    fn level(&mut self) -> &mut Vec<TraceNode> {
        let mut level = &mut self.nodes;
        for &at in &self.path {
            level = &mut level[at].children;
        }
        level
    }

    /// Renders the trace for human consumption. Lines starting with a
    /// question mark are requests, exclamation marks are response records,
    /// `X` marks errors and non-success rcodes, `~ EMPTY` a success without
    /// records. The format may change without notice.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.dump(&mut out, 0);
        }
        out
    }
}

impl TraceNode {
    fn dump(&self, out: &mut String, depth: usize) {
        if depth > MAX_DUMP_DEPTH {
            return;
        }

        let pad = "    ".repeat(depth);
        let _ = writeln!(
            out,
            "{pad}? {} {} {} @{} {}ms",
            self.query.name(),
            self.query.query_class(),
            self.query.query_type(),
            self.server,
            self.rtt.as_millis(),
        );

        if let Some(error) = &self.error {
            let _ = writeln!(out, "{pad}  X {error}");
        }

        if let Some(response) = &self.response {
            if response.response_code() != ResponseCode::NoError {
                let _ = writeln!(out, "{pad}  X {}", rcode_name(response.response_code()));
            } else if is_empty_response(response) {
                let _ = writeln!(out, "{pad}  ~ EMPTY");
            }

            for rr in response
                .answers()
                .iter()
                .chain(response.name_servers())
                .chain(response.additionals())
            {
                let _ = writeln!(out, "{pad}  ! {}", record_line(rr));
            }
        }

        for child in &self.children {
            child.dump(out, depth + 1);
        }
    }
}

fn record_line(rr: &Record) -> String {
    format!(
        "{} {} {} {} {}",
        rr.name(),
        rr.ttl(),
        rr.dns_class(),
        rr.record_type(),
        rdata_value(rr),
    )
}
