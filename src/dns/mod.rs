//! Hostname resolution.
//!
//! Two engines hide behind one contract: the stub resolver speaks DNS over
//! UDP directly and is driven by the main poll loop (its transport socket
//! rides the same readiness machinery as every other descriptor), while the
//! threaded engine runs the platform resolver on a small worker pool.
//! Engine probing prefers the resolver and falls back to the workers.
//!
//! Either way a query completes on the main loop: engines produce
//! [`Completion`]s that the reactor drains at the start of every tick,
//! before poll dispatch.

use std::cell::RefCell;
use std::io;
use std::net::IpAddr;
use std::ops;
use std::rc::Rc;
use std::time::Instant;

use log::debug;

mod resolver;
mod threaded;
pub(crate) mod wire;

use crate::reactor::BoxedDnsCallback;

/// Which record types a forward lookup asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecordSet(u8);

impl RecordSet {
    /// IPv4 addresses.
    pub const A: RecordSet = RecordSet(0b01);
    /// IPv6 addresses.
    pub const AAAA: RecordSet = RecordSet(0b10);

    pub const fn contains_a(self) -> bool {
        self.0 & Self::A.0 != 0
    }

    pub const fn contains_aaaa(self) -> bool {
        self.0 & Self::AAAA.0 != 0
    }
}

impl ops::BitOr for RecordSet {
    type Output = RecordSet;

    fn bitor(self, other: RecordSet) -> RecordSet {
        RecordSet(self.0 | other.0)
    }
}

/// One resolved record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsRecord {
    V4(std::net::Ipv4Addr),
    V6(std::net::Ipv6Addr),
    /// Reverse lookup result.
    Name(String),
}

/// How the reactor picks its DNS engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum DnsMode {
    /// Stub resolver when the system configuration allows it, worker
    /// threads otherwise.
    #[default]
    Auto,
    /// Worker threads running the platform resolver.
    Threaded,
    /// UDP stub resolver only; init fails without usable nameservers.
    Resolver,
}

#[derive(Clone, Debug)]
pub(crate) enum QueryKind {
    Forward { host: String, records: RecordSet },
    Reverse { addr: IpAddr },
}

/// Where a finished query reports to.
pub(crate) enum QueryOwner {
    /// User-facing query with its callback.
    Public(Option<Rc<RefCell<BoxedDnsCallback>>>),
    /// Lookup feeding a socket's bind or destination side.
    Socket { socket: usize, gen: u32, bind_side: bool },
}

pub(crate) struct QueryEntry {
    pub(crate) gen: u32,
    /// Aborted or delivered; kept as a tombstone until collected.
    pub(crate) dead: bool,
    pub(crate) owner: QueryOwner,
}

/// A finished (or failed) query, reported by an engine.
pub(crate) struct Completion {
    pub(crate) query: usize,
    pub(crate) gen: u32,
    pub(crate) outcome: Result<Vec<DnsRecord>, String>,
}

pub(crate) enum Engine {
    Resolver(resolver::ResolverEngine),
    Threaded(threaded::ThreadedEngine),
}

impl Engine {
    pub(crate) fn probe(mode: DnsMode) -> io::Result<Engine> {
        match mode {
            DnsMode::Resolver => resolver::ResolverEngine::new().map(Engine::Resolver),
            DnsMode::Threaded => Ok(Engine::Threaded(threaded::ThreadedEngine::new())),
            DnsMode::Auto => match resolver::ResolverEngine::new() {
                Ok(engine) => Ok(Engine::Resolver(engine)),
                Err(err) => {
                    debug!("stub resolver unavailable ({}), using threaded engine", err);
                    Ok(Engine::Threaded(threaded::ThreadedEngine::new()))
                }
            },
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Engine::Resolver(_) => "resolver",
            Engine::Threaded(_) => "threaded",
        }
    }

    pub(crate) fn add(&mut self, query: usize, gen: u32, kind: &QueryKind) {
        match self {
            Engine::Resolver(engine) => engine.add(query, gen, kind),
            Engine::Threaded(engine) => engine.add(query, gen, kind),
        }
    }

    pub(crate) fn remove(&mut self, query: usize) {
        match self {
            Engine::Resolver(engine) => engine.remove(query),
            Engine::Threaded(engine) => engine.remove(query),
        }
    }

    /// Engine housekeeping at tick start: completed lookups, retransmits.
    pub(crate) fn poll(&mut self, now: Instant) -> Vec<Completion> {
        match self {
            Engine::Resolver(engine) => engine.poll(now),
            Engine::Threaded(engine) => engine.poll(),
        }
    }

    /// The resolver's transport descriptor, when the engine has one to
    /// register with the poll backend.
    pub(crate) fn transport_fd(&self) -> Option<crate::sys::Fd> {
        match self {
            Engine::Resolver(engine) => Some(engine.transport_fd()),
            Engine::Threaded(_) => None,
        }
    }

    /// Readiness on the transport descriptor.
    pub(crate) fn socket_ready(&mut self) -> Vec<Completion> {
        match self {
            Engine::Resolver(engine) => engine.socket_ready(),
            Engine::Threaded(_) => Vec::new(),
        }
    }

    pub(crate) fn stop(&mut self) {
        match self {
            Engine::Resolver(_) => {}
            Engine::Threaded(engine) => engine.stop(),
        }
    }
}
