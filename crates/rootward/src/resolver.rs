//! The recursive resolution engine.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, Record, RecordType};
use parking_lot::RwLock;
use rootward_cache::ResponseCache;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::addrs::{AddrIter, Candidate};
use crate::bootstrap;
use crate::error::{ErrorKind, InvalidServerAddr, ResolveError};
use crate::normalize::normalize;
use crate::policy::{default_cache_policy, default_timeout_policy, CachePolicy, TimeoutPolicy};
use crate::record_set::RecordSet;
use crate::trace::{Trace, TraceNode};
use crate::wire::{canonical_name, is_empty_response, rcode_name};

const MAX_DATAGRAM: usize = 65_535;

/// Callback invoked after every exchange with a single-exchange view of the
/// response and the error, if any.
pub type LogFn = Arc<dyn Fn(&RecordSet, Option<&ErrorKind>) + Send + Sync>;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Port used for endpoints that name no port of their own, such as NS
    /// referral targets. 53 for the real world; tests override it.
    pub default_port: u16,

    /// When true, A records and IPv4 endpoints are ignored.
    pub ipv4_disabled: bool,

    /// When true, AAAA records and IPv6 endpoints are ignored.
    pub ipv6_disabled: bool,

    /// Maximum number of cached responses.
    pub max_cache_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_port: 53,
            ipv4_disabled: false,
            ipv6_disabled: false,
            max_cache_size: rootward_cache::DEFAULT_MAX_SIZE,
        }
    }
}

/// Recursive DNS resolver.
///
/// Every lookup walks the delegation chain itself, starting from the root
/// name servers, instead of trusting a recursive intermediary. The root
/// server set is discovered once through the operating system's resolvers
/// (or the servers given to [`set_bootstrap_servers`](Self::set_bootstrap_servers))
/// and kept for the lifetime of the resolver.
///
/// Name servers are usually redundant. Servers named by one delegation are
/// tried in the order they appear until one of them produces a response;
/// after any response has been received, the remaining servers of that set
/// are not consulted, even if the response indicates an error such as
/// NXDOMAIN.
///
/// Responses are cached per (question, server) according to the configured
/// [`CachePolicy`]. Matching cache entries are returned regardless of the
/// current policy; use [`clear_cache`](Self::clear_cache) after a policy
/// change if that matters.
///
/// Concurrent lookups are safe and share only the cache, the bootstrap
/// list, and the policy slots. Each lookup snapshots the policies at entry,
/// so replacing them affects subsequent calls only.
pub struct Resolver {
    config: ResolverConfig,
    cache: ResponseCache,
    shared: RwLock<Shared>,
}

#[derive(Default)]
struct Shared {
    timeout_policy: Option<TimeoutPolicy>,
    cache_policy: Option<CachePolicy>,
    /// Explicitly configured bootstrap servers; takes precedence.
    bootstrap: Vec<SocketAddr>,
    /// Servers discovered from the operating system, kept after first use.
    system: Vec<SocketAddr>,
    log: Option<LogFn>,
}

impl Resolver {
    /// Creates a resolver with the default configuration and policies.
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    /// Creates a resolver with the given configuration.
    pub fn with_config(config: ResolverConfig) -> Self {
        Self {
            cache: ResponseCache::new(config.max_cache_size),
            config,
            shared: RwLock::new(Shared::default()),
        }
    }

    /// Overrides the servers used to discover the root name server set.
    ///
    /// Accepts `ip` or `ip:port`; the configured default port is applied
    /// when none is given, and duplicates are dropped. Any entry whose host
    /// is not an IP address fails the whole call. Without an override, the
    /// operating system's resolvers are discovered on first use.
    pub fn set_bootstrap_servers<S: AsRef<str>>(&self, servers: &[S]) -> Result<(), InvalidServerAddr> {
        let servers = normalize_addrs(servers, self.config.default_port)?;
        self.shared.write().bootstrap = servers;
        Ok(())
    }

    /// Installs the policy deciding per-exchange timeouts. Takes effect on
    /// subsequent lookups.
    pub fn set_timeout_policy<F>(&self, policy: F)
    where
        F: Fn(RecordType, &Name, SocketAddr) -> Duration + Send + Sync + 'static,
    {
        self.shared.write().timeout_policy = Some(Arc::new(policy));
    }

    /// Installs the policy deciding how long responses stay cached. Takes
    /// effect on subsequent lookups.
    pub fn set_cache_policy<F>(&self, policy: F)
    where
        F: Fn(&RecordSet) -> Duration + Send + Sync + 'static,
    {
        self.shared.write().cache_policy = Some(Arc::new(policy));
    }

    /// Installs a callback invoked after every exchange.
    pub fn set_log_fn<F>(&self, log: F)
    where
        F: Fn(&RecordSet, Option<&ErrorKind>) + Send + Sync + 'static,
    {
        self.shared.write().log = Some(Arc::new(log));
    }

    /// Removes all cached responses.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Resolves `domain` recursively for the given record type ("A",
    /// "AAAA", "SRV", ...).
    ///
    /// The domain is understood as fully qualified; the trailing dot is
    /// optional. On failure the returned [`ResolveError`] carries the
    /// partial [`RecordSet`], whose trace reports every exchange performed.
    ///
    /// Dropping the returned future aborts the lookup and releases its
    /// socket.
    pub async fn query(&self, record_type: &str, domain: &str) -> Result<RecordSet, ResolveError> {
        let mut set = RecordSet::shell(domain, record_type);
        match self.run(record_type, domain, &mut set).await {
            Ok(()) => Ok(set),
            Err(kind) => Err(ResolveError::new(record_type, domain, kind, set)),
        }
    }

    async fn run(&self, record_type: &str, domain: &str, set: &mut RecordSet) -> Result<(), ErrorKind> {
        let rtype = RecordType::from_str(record_type)
            .map_err(|_| ErrorKind::UnsupportedType(record_type.to_string()))?;
        let qname = canonical_name(domain).map_err(|err| ErrorKind::Protocol(err.to_string()))?;

        let mut walk = self.walk_setup()?;

        let roots = match walk.discover_roots(set).await {
            Ok(roots) => roots,
            Err(kind) => return Err(ErrorKind::Bootstrap(Box::new(kind))),
        };
        debug!(count = roots.len(), "root name servers");

        let mut stack = vec![Frame::new(make_query(qname, rtype), &roots)];

        loop {
            let depth = stack.len();

            let (question, server) = {
                let Some(frame) = stack.last_mut() else {
                    return Err(ErrorKind::ServersExhausted);
                };

                match frame.endpoints.pop_front() {
                    Some(server) => (frame.question.clone(), server),
                    None => {
                        // All endpoints for this name are spent; alternate
                        // server names restart from the root set.
                        if let Some(next) = frame.alt_names.pop_front() {
                            debug!(name = %next, "trying alternate name server");
                            frame.restart(next, &roots, walk.ipv6_enabled);
                        } else if depth == 1 {
                            return Err(ErrorKind::ServersExhausted);
                        } else {
                            stack.pop();
                            set.trace.pop();
                        }
                        continue;
                    }
                }
            };

            if !walk.family_enabled(server.ip()) {
                continue;
            }

            let (response, rtt, age) = match walk.exchange(&question, server, false, set).await {
                Ok(result) => result,
                Err(kind) => match &kind {
                    ErrorKind::Network(err) if is_unreachable(err) => {
                        warn!(%server, "address family unreachable for the rest of this lookup");
                        match server.ip() {
                            IpAddr::V4(_) => walk.ipv4_enabled = false,
                            IpAddr::V6(_) => walk.ipv6_enabled = false,
                        }
                        continue;
                    }
                    ErrorKind::Network(_) | ErrorKind::Timeout(_) | ErrorKind::Protocol(_) => continue,
                    _ => return Err(kind),
                },
            };

            set.server = Some(server);
            set.rtt = rtt;
            set.age = age;
            set.raw = Some(response.clone());

            // Empty success while resolving glue: a AAAA question falls back
            // to A on the same server before alternates are considered.
            if depth > 1 && is_empty_response(&response) {
                if let Some(frame) = stack.last_mut() {
                    if question.query_type() == RecordType::AAAA && walk.ipv4_enabled {
                        frame.question = make_query(question.name().clone(), RecordType::A);
                        frame.endpoints.push_front(server);
                    } else if let Some(next) = frame.alt_names.pop_front() {
                        frame.restart(next, &roots, walk.ipv6_enabled);
                    }
                }
                continue;
            }

            let rcode = response.response_code();
            if rcode != ResponseCode::NoError {
                if depth > 1 {
                    continue;
                }
                match rcode {
                    ResponseCode::ServFail => continue,
                    ResponseCode::NXDomain => {
                        set.record_type = "NXDOMAIN".to_string();
                        return Err(ErrorKind::NxDomain);
                    }
                    other => {
                        set.record_type = rcode_name(other);
                        return Err(ErrorKind::Server(rcode_name(other)));
                    }
                }
            }

            if response.authoritative() {
                stack.pop();
                set.trace.pop();
                if stack.is_empty() {
                    return set.finish(&question, &response);
                }

                // The inner walk resolved a name server's address; its
                // referrals feed the waiting parent frame.
                let refs = referrals(&response, walk.port, walk.ipv4_enabled, walk.ipv6_enabled);
                apply_referral(&mut stack, refs, &roots, &mut set.trace, walk.ipv6_enabled, ReferralFrom::InnerWalk)?;
                continue;
            }

            let refs = referrals(&response, walk.port, walk.ipv4_enabled, walk.ipv6_enabled);
            apply_referral(&mut stack, refs, &roots, &mut set.trace, walk.ipv6_enabled, ReferralFrom::Delegation)?;
        }
    }

    /// Snapshots policies and bootstrap servers, installing defaults and
    /// running system-resolver discovery on first use.
    fn walk_setup(&self) -> Result<Walk<'_>, ErrorKind> {
        {
            let shared = self.shared.read();
            if let Some(walk) = self.walk_from(&shared) {
                return Ok(walk);
            }
        }

        let mut shared = self.shared.write();
        if shared.timeout_policy.is_none() {
            shared.timeout_policy = Some(default_timeout_policy());
        }
        if shared.cache_policy.is_none() {
            shared.cache_policy = Some(default_cache_policy());
        }
        if shared.bootstrap.is_empty() && shared.system.is_empty() {
            let servers = bootstrap::system_servers(53)
                .map_err(|err| ErrorKind::Bootstrap(Box::new(ErrorKind::Network(err))))?;
            debug!(count = servers.len(), "discovered system resolvers");
            shared.system = servers;
        }

        match self.walk_from(&shared) {
            Some(walk) => Ok(walk),
            None => Err(ErrorKind::Bootstrap(Box::new(ErrorKind::ServersExhausted))),
        }
    }

    fn walk_from(&self, shared: &Shared) -> Option<Walk<'_>> {
        let timeout_policy = shared.timeout_policy.clone()?;
        let cache_policy = shared.cache_policy.clone()?;
        let bootstrap = if !shared.bootstrap.is_empty() {
            shared.bootstrap.clone()
        } else if !shared.system.is_empty() {
            shared.system.clone()
        } else {
            return None;
        };

        Some(Walk {
            cache: &self.cache,
            timeout_policy,
            cache_policy,
            log: shared.log.clone(),
            bootstrap,
            port: self.config.default_port,
            ipv4_enabled: !self.config.ipv4_disabled,
            ipv6_enabled: !self.config.ipv6_disabled,
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-lookup state: a snapshot of the shared configuration, plus the
/// address-family switches that an unreachable network can flip mid-walk.
struct Walk<'a> {
    cache: &'a ResponseCache,
    timeout_policy: TimeoutPolicy,
    cache_policy: CachePolicy,
    log: Option<LogFn>,
    bootstrap: Vec<SocketAddr>,
    port: u16,
    ipv4_enabled: bool,
    ipv6_enabled: bool,
}

impl Walk<'_> {
    fn family_enabled(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(_) => self.ipv4_enabled,
            IpAddr::V6(_) => self.ipv6_enabled,
        }
    }

    /// Asks each bootstrap server for the root NS set until one referral
    /// yields at least one usable address.
    async fn discover_roots(&self, set: &mut RecordSet) -> Result<Vec<SocketAddr>, ErrorKind> {
        let root_query = make_query(Name::root(), RecordType::NS);
        let mut last: Option<ErrorKind> = None;

        let mut iter = AddrIter::from_addrs(&self.bootstrap);
        while let Some(candidate) = iter.next() {
            let Candidate::Endpoint(server) = candidate else {
                continue;
            };
            if !self.family_enabled(server.ip()) {
                continue;
            }

            match self.exchange(&root_query, server, true, set).await {
                Err(kind) => last = Some(kind),
                Ok((response, _, _)) => {
                    if response.response_code() != ResponseCode::NoError {
                        last = Some(ErrorKind::Server(rcode_name(response.response_code())));
                        continue;
                    }
                    let refs = referrals(&response, self.port, self.ipv4_enabled, self.ipv6_enabled);
                    if !refs.endpoints.is_empty() {
                        return Ok(refs.endpoints);
                    }
                    last = Some(ErrorKind::EmptyResponse);
                }
            }
        }

        Err(last.unwrap_or(ErrorKind::ServersExhausted))
    }

    /// Performs one exchange: cycle guard, cache lookup, wire transfer,
    /// cache update, trace node, log callback.
    async fn exchange(
        &self,
        question: &Query,
        server: SocketAddr,
        recursion_desired: bool,
        set: &mut RecordSet,
    ) -> Result<(Message, Duration, Option<Duration>), ErrorKind> {
        if set.trace.contains(question, server) {
            let kind = ErrorKind::Circular(format!(
                "repeated query: {} {} @{}",
                question.query_type(),
                question.name(),
                server,
            ));
            set.trace.add(TraceNode {
                server,
                query: question.clone(),
                response: None,
                rtt: Duration::ZERO,
                cache_age: None,
                error: Some(kind.to_string()),
                children: Vec::new(),
            });
            return Err(kind);
        }

        if let Some(hit) = self.cache.lookup(question, server, Instant::now()) {
            trace!(query = %question.name(), qtype = %question.query_type(), %server, age = ?hit.age, "cache hit");
            set.trace.add(TraceNode {
                server,
                query: question.clone(),
                response: Some(hit.response.clone()),
                rtt: hit.rtt,
                cache_age: Some(hit.age),
                error: None,
                children: Vec::new(),
            });
            if let Some(log) = &self.log {
                log(&RecordSet::preview(question, &hit.response, server, hit.rtt, Some(hit.age)), None);
            }
            return Ok((hit.response, hit.rtt, Some(hit.age)));
        }

        let mut request = Message::new();
        request
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(recursion_desired)
            .add_query(question.clone());

        let timeout = (self.timeout_policy)(question.query_type(), question.name(), server);
        debug!(query = %question.name(), qtype = %question.query_type(), %server, ?timeout, "sending query");

        let started = Instant::now();
        let outcome = if timeout > Duration::ZERO {
            match tokio::time::timeout(timeout, send_udp(&request, server)).await {
                Ok(result) => result,
                Err(_) => Err(ErrorKind::Timeout(timeout)),
            }
        } else {
            send_udp(&request, server).await
        };
        let rtt = started.elapsed();

        let outcome = outcome.and_then(|response| {
            if response.id() == request.id() {
                Ok(response)
            } else {
                Err(ErrorKind::Protocol(format!(
                    "response id {:#06x} does not match query id {:#06x}",
                    response.id(),
                    request.id(),
                )))
            }
        });

        let response = match outcome {
            Ok(response) => response,
            Err(kind) => {
                debug!(%server, error = %kind, "exchange failed");
                set.trace.add(TraceNode {
                    server,
                    query: question.clone(),
                    response: None,
                    rtt,
                    cache_age: None,
                    error: Some(kind.to_string()),
                    children: Vec::new(),
                });
                if let Some(log) = &self.log {
                    log(&RecordSet::probe(question, server, rtt), Some(&kind));
                }
                return Err(kind);
            }
        };

        let preview = RecordSet::preview(question, &response, server, rtt, None);
        let cache_ttl = (self.cache_policy)(&preview);
        if cache_ttl > Duration::ZERO {
            self.cache.update(question, server, &response, cache_ttl);
        }

        set.trace.add(TraceNode {
            server,
            query: question.clone(),
            response: Some(response.clone()),
            rtt,
            cache_age: None,
            error: None,
            children: Vec::new(),
        });
        if let Some(log) = &self.log {
            log(&preview, None);
        }

        Ok((response, rtt, None))
    }
}

/// One level of the delegation walk: the question asked at this level, the
/// endpoints still to try, and the alternate server names to fall back to
/// once they are spent.
struct Frame {
    question: Query,
    endpoints: VecDeque<SocketAddr>,
    alt_names: VecDeque<Name>,
}

impl Frame {
    fn new(question: Query, endpoints: &[SocketAddr]) -> Self {
        Self {
            question,
            endpoints: endpoints.iter().copied().collect(),
            alt_names: VecDeque::new(),
        }
    }

    /// Re-targets this level at another server name, starting over from the
    /// root set with the preferred address family.
    fn restart(&mut self, name: Name, roots: &[SocketAddr], ipv6_enabled: bool) {
        let rtype = if ipv6_enabled { RecordType::AAAA } else { RecordType::A };
        self.question = make_query(name, rtype);
        self.endpoints = roots.iter().copied().collect();
    }
}

/// What a response points the walk at next: concrete endpoints, or server
/// names that still need their addresses resolved.
struct Referral {
    endpoints: Vec<SocketAddr>,
    names: Vec<Name>,
}

fn referrals(response: &Message, default_port: u16, ipv4_enabled: bool, ipv6_enabled: bool) -> Referral {
    let relevant: Vec<Record> = normalize(response)
        .into_iter()
        .filter(|rr| {
            matches!(
                rr.record_type(),
                RecordType::A | RecordType::AAAA | RecordType::NS | RecordType::CNAME,
            )
        })
        .collect();

    let mut endpoints = Vec::new();
    let mut names = Vec::new();

    let mut iter = AddrIter::from_records(relevant, default_port);
    while let Some(candidate) = iter.next() {
        match candidate {
            Candidate::Endpoint(addr) => {
                let keep = match addr.ip() {
                    IpAddr::V4(_) => ipv4_enabled,
                    IpAddr::V6(_) => ipv6_enabled,
                };
                if keep {
                    endpoints.push(addr);
                }
            }
            Candidate::Unresolved(name) => names.push(name),
        }
    }

    Referral { endpoints, names }
}

/// Where a referral came from, which decides how it meets the frame it
/// lands on.
#[derive(Clone, Copy, PartialEq)]
enum ReferralFrom {
    /// A delegation response at this level; it supersedes the level's
    /// endpoint candidates, and carrying nothing usable is an error.
    Delegation,
    /// The result of a popped glue walk; its endpoints are tried before the
    /// parent's own remaining candidates, and it may carry nothing.
    InnerWalk,
}

fn apply_referral(
    stack: &mut Vec<Frame>,
    refs: Referral,
    roots: &[SocketAddr],
    trace: &mut Trace,
    ipv6_enabled: bool,
    from: ReferralFrom,
) -> Result<(), ErrorKind> {
    if !refs.endpoints.is_empty() {
        if let Some(frame) = stack.last_mut() {
            match from {
                ReferralFrom::Delegation => frame.endpoints = refs.endpoints.into_iter().collect(),
                ReferralFrom::InnerWalk => {
                    for addr in refs.endpoints.into_iter().rev() {
                        frame.endpoints.push_front(addr);
                    }
                }
            }
        }
        return Ok(());
    }

    let mut names = refs.names.into_iter();
    if let Some(first) = names.next() {
        let rtype = if ipv6_enabled { RecordType::AAAA } else { RecordType::A };
        let mut frame = Frame::new(make_query(first, rtype), roots);
        frame.alt_names = names.collect();
        trace.push();
        stack.push(frame);
        return Ok(());
    }

    if from == ReferralFrom::Delegation {
        return Err(ErrorKind::EmptyResponse);
    }
    Ok(())
}

fn make_query(name: Name, rtype: RecordType) -> Query {
    let mut query = Query::query(name, rtype);
    query.set_query_class(DNSClass::IN);
    query
}

fn normalize_addrs<S: AsRef<str>>(servers: &[S], default_port: u16) -> Result<Vec<SocketAddr>, InvalidServerAddr> {
    let mut out = Vec::with_capacity(servers.len());

    for raw in servers {
        let raw = raw.as_ref();
        let server = match raw.parse::<SocketAddr>() {
            Ok(server) => server,
            Err(_) => match raw.parse::<IpAddr>() {
                Ok(ip) => SocketAddr::new(ip, default_port),
                Err(_) => return Err(InvalidServerAddr(raw.to_string())),
            },
        };
        if !out.contains(&server) {
            out.push(server);
        }
    }

    Ok(out)
}

async fn send_udp(request: &Message, server: SocketAddr) -> Result<Message, ErrorKind> {
    let bind = match server {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };

    let socket = UdpSocket::bind(bind).await?;
    socket.connect(server).await?;

    let wire = request.to_vec().map_err(|err| ErrorKind::Protocol(err.to_string()))?;
    socket.send(&wire).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let len = socket.recv(&mut buf).await?;

    Message::from_vec(&buf[..len]).map_err(|err| ErrorKind::Protocol(err.to_string()))
}

fn is_unreachable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable,
    )
}
