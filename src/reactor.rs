//! The event-loop runtime.
//!
//! One `Reactor` instance owns everything: the probed poll backend, the
//! socket registry, the timer list, the DNS engine and the garbage
//! collector. All operations go through `&mut Reactor`; user callbacks are
//! handed the reactor back, so everything is callable from within any
//! callback. Handles ([`Socket`], [`Timer`], [`Query`]) are small `Copy`
//! ids carrying a generation; operations on a handle whose object is gone
//! degrade into a logged no-op.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};
use slab::Slab;

use crate::dns::{self, DnsMode, DnsRecord, QueryEntry, QueryKind, QueryOwner, RecordSet};
use crate::event::{Event, Status};
use crate::gc::{GarbageCollector, Kind as GcKind, DEFAULT_GRACE};
use crate::logger::FATAL_TARGET;
use crate::socket::{
    self, Connect, Family, Framing, Listen, LookupSide, LookupState, SocketEntry, Stage,
};
use crate::sys;
use crate::timer::Timers;
use crate::tls;
use crate::token::Token;

pub(crate) type BoxedSocketCallback = Box<dyn FnMut(&mut Reactor, Socket, Event<'_>)>;
pub(crate) type BoxedTimerCallback = Box<dyn FnMut(&mut Reactor, Timer)>;
pub(crate) type BoxedDnsCallback =
    Box<dyn FnMut(&mut Reactor, Query, Result<Vec<DnsRecord>, String>)>;

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) index: usize,
            pub(crate) gen: u32,
        }

        impl fmt::Debug for $name {
            fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(fmt, concat!(stringify!($name), "({}.{})"), self.index, self.gen)
            }
        }
    };
}

handle_type! {
    /// Caller-visible socket handle. Stays resolvable (as a logged no-op)
    /// for a grace period after close.
    Socket
}
handle_type! {
    /// Caller-visible timer handle.
    Timer
}
handle_type! {
    /// Caller-visible DNS query handle.
    Query
}

/// Construction-time settings for a [`Reactor`].
#[derive(Debug, Clone)]
pub struct Config {
    max_sockets: usize,
    poll_cap: Duration,
    gc_enabled: bool,
    gc_grace: Duration,
    dns: DnsMode,
    backend: Option<sys::Backend>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_sockets: 1024,
            poll_cap: Duration::from_millis(100),
            gc_enabled: true,
            gc_grace: DEFAULT_GRACE,
            dns: DnsMode::Auto,
            backend: None,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Upper bound on concurrent sockets (also sizes backend hints).
    pub fn max_sockets(mut self, max: usize) -> Config {
        self.max_sockets = max;
        self
    }

    /// Longest a single loop tick blocks in the poll backend.
    pub fn poll_cap(mut self, cap: Duration) -> Config {
        self.poll_cap = cap;
        self
    }

    /// Toggles deferred handle reclamation; disabled means closed handles
    /// are reclaimed immediately.
    pub fn gc(mut self, enabled: bool) -> Config {
        self.gc_enabled = enabled;
        self
    }

    /// How long a closed handle stays resolvable.
    pub fn gc_grace(mut self, grace: Duration) -> Config {
        self.gc_grace = grace;
        self
    }

    pub fn dns(mut self, mode: DnsMode) -> Config {
        self.dns = mode;
        self
    }

    /// Forces a poll backend instead of probing.
    pub fn backend(mut self, backend: sys::Backend) -> Config {
        self.backend = Some(backend);
        self
    }
}

/// The runtime. See the crate docs for the big picture.
pub struct Reactor {
    selector: sys::Selector,
    events: sys::Events,
    sockets: Slab<SocketEntry>,
    timers: Timers,
    queries: Slab<QueryEntry>,
    gc: GarbageCollector,
    dns: dns::Engine,
    /// Completions not produced by an engine (literal fast-path).
    dns_ready: Vec<dns::Completion>,
    running: bool,
    in_tick: bool,
    next_gen: u32,
    max_sockets: usize,
    poll_cap: Duration,
}

impl Reactor {
    pub fn new() -> io::Result<Reactor> {
        Reactor::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> io::Result<Reactor> {
        let gc = GarbageCollector::new(config.gc_enabled, config.gc_grace);
        let timers = Timers::new();
        let dns = dns::Engine::probe(config.dns)?;
        let selector = sys::Selector::new(config.max_sockets, config.backend)?;
        debug!(
            "using {} poll backend and {} dns engine",
            selector.name(),
            dns.name()
        );

        let mut reactor = Reactor {
            selector,
            events: Vec::with_capacity(32),
            sockets: Slab::with_capacity(64),
            timers,
            queries: Slab::new(),
            gc,
            dns,
            dns_ready: Vec::new(),
            running: false,
            in_tick: false,
            next_gen: 1,
            max_sockets: config.max_sockets,
            poll_cap: config.poll_cap,
        };

        // The stub resolver's transport rides the normal readiness
        // machinery, with its interest forced past the socket mask.
        if let Some(fd) = reactor.dns.transport_fd() {
            let gen = reactor.bump_gen();
            let mut entry = SocketEntry::new(gen);
            entry.fd = Some(fd);
            entry.dns_owned = true;
            entry.stage = Stage::Connected;
            entry.status = Status::Connected;
            let index = reactor.sockets.insert(entry);
            reactor.activate(index);
            if reactor.sockets[index].dead {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "could not register dns transport",
                ));
            }
        }

        Ok(reactor)
    }

    /// Name of the probed poll backend.
    pub fn backend_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Name of the probed DNS engine.
    pub fn dns_engine_name(&self) -> &'static str {
        self.dns.name()
    }

    fn bump_gen(&mut self) -> u32 {
        let gen = self.next_gen;
        self.next_gen = self.next_gen.wrapping_add(1);
        gen
    }

    // ---- Event loop ----------------------------------------------------

    /// Runs until [`stop`](Reactor::stop) is called.
    pub fn run(&mut self) -> io::Result<()> {
        if self.in_tick {
            warn!("run() called from within a callback, ignoring");
            return Ok(());
        }
        self.running = true;
        while self.running {
            let cap = self.poll_cap;
            self.tick(cap);
        }
        Ok(())
    }

    /// Stops the loop; the current tick completes and `run` returns.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Runs one loop tick, blocking at most `timeout` (capped by the
    /// configured poll cap).
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        if self.in_tick {
            warn!("poll_once() called from within a callback, ignoring");
            return Ok(());
        }
        let cap = timeout.unwrap_or(self.poll_cap).min(self.poll_cap);
        self.tick(cap);
        Ok(())
    }

    fn tick(&mut self, cap: Duration) {
        self.in_tick = true;

        // Deferred handle reclamation first.
        let now = Instant::now();
        for (kind, index, gen) in self.gc.expired(now) {
            self.reclaim(kind, index, gen);
        }

        // DNS completions, delivered before poll dispatch.
        let mut completions = self.dns.poll(now);
        if !self.dns_ready.is_empty() {
            let mut ready = std::mem::take(&mut self.dns_ready);
            ready.append(&mut completions);
            completions = ready;
        }
        self.dispatch_dns(completions);
        self.sweep_dead();

        // Wait for readiness, bounded by the next timer deadline.
        let timeout = match self.timers.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(cap),
            None => cap,
        };
        let mut events = std::mem::take(&mut self.events);
        match self.selector.select(&mut events, Some(timeout)) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => events.clear(),
            Err(err) => {
                error!(target: FATAL_TARGET, "poll wait failed: {}", err);
                events.clear();
            }
        }

        for event in &events {
            self.handle_ready(event.token, event.readable, event.writable);
        }
        self.events = events;

        self.fire_timers();
        self.sweep_dead();

        self.in_tick = false;
    }

    fn handle_ready(&mut self, token: Token, readable: bool, writable: bool) {
        let index = token.0;
        let entry = match self.sockets.get(index) {
            Some(entry) => entry,
            None => return, // stale event for a reclaimed slot
        };
        if entry.stage == Stage::Closed || entry.dead {
            return;
        }
        if entry.dns_owned {
            let completions = self.dns.socket_ready();
            self.dispatch_dns(completions);
            return;
        }
        match entry.stage {
            Stage::Listening => {
                if readable {
                    self.accept_ready(index);
                }
            }
            Stage::Connecting => self.connecting_ready(index, readable, writable),
            Stage::TlsHandshake => self.handshake_ready(index),
            Stage::Connected => self.stream_ready(index, readable, writable),
            Stage::Lookup | Stage::Closed => {}
        }
    }

    // ---- Sockets: public API -------------------------------------------

    /// Starts an outgoing connection. Host and bind address accept
    /// literals or hostnames; hostnames resolve without blocking the loop.
    /// The callback sees `Connected` (or `NotConnected`/`DnsFailed`), then
    /// data events, then `Closed`.
    pub fn connect<F>(&mut self, options: Connect, callback: F) -> io::Result<Socket>
    where
        F: FnMut(&mut Reactor, Socket, Event<'_>) + 'static,
    {
        let Connect {
            host,
            port,
            bind,
            family,
            tls: tls_options,
        } = options;

        if self.sockets.len() >= self.max_sockets {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "socket limit reached",
            ));
        }

        let tls_client = match tls_options {
            Some(options) => Some(options.build(&host)?),
            None => None,
        };

        let gen = self.bump_gen();
        let mut entry = SocketEntry::new(gen);
        entry.port = port;
        entry.status = Status::Connecting;
        entry.tls_client = tls_client;
        entry.callback = Some(Rc::new(RefCell::new(
            Box::new(callback) as BoxedSocketCallback
        )));
        let index = self.sockets.insert(entry);
        let handle = Socket { index, gen };

        let bind_side = match bind {
            Some(bind_host) => self.make_side(index, gen, &bind_host, family, true),
            None => LookupSide::absent(),
        };
        let dest_side = self.make_side(index, gen, &host, family, false);
        let lookup = LookupState {
            bind: bind_side,
            dest: dest_side,
            family,
        };
        let finished = lookup.finished();
        self.sockets[index].lookup = Some(Box::new(lookup));

        if finished && self.apply_lookup(index, false) {
            if let Err(err) = self.connect_finish(index) {
                self.close_internal(index);
                return Err(err);
            }
        }
        Ok(handle)
    }

    /// Starts a listening socket; the callback sees one `Accept` per
    /// connection. With [`Listen::tls`], accepted children complete their
    /// handshake before they are announced.
    pub fn listen<F>(&mut self, options: Listen, callback: F) -> io::Result<Socket>
    where
        F: FnMut(&mut Reactor, Socket, Event<'_>) + 'static,
    {
        let Listen {
            host,
            port,
            family,
            tls: tls_files,
        } = options;

        if self.sockets.len() >= self.max_sockets {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "socket limit reached",
            ));
        }

        let tls_creds = match tls_files {
            Some((certfile, keyfile)) => Some(tls::load_server_config(&certfile, &keyfile)?),
            None => None,
        };

        let gen = self.bump_gen();
        let mut entry = SocketEntry::new(gen);
        entry.port = port;
        entry.status = Status::Listening;
        entry.tls_creds = tls_creds;
        entry.callback = Some(Rc::new(RefCell::new(
            Box::new(callback) as BoxedSocketCallback
        )));
        let index = self.sockets.insert(entry);
        let handle = Socket { index, gen };

        let bind_side = self.make_side(index, gen, &host, family, true);
        let lookup = LookupState {
            bind: bind_side,
            dest: LookupSide::absent(),
            family,
        };
        let finished = lookup.finished();
        self.sockets[index].lookup = Some(Box::new(lookup));

        if finished && self.apply_lookup(index, false) {
            self.sockets[index].lookup = None;
            if let Err(err) = self.listen_finish(index) {
                self.close_internal(index);
                return Err(err);
            }
        }
        Ok(handle)
    }

    /// Appends bytes to the write buffer and requests write readiness.
    /// Order is preserved; partial kernel writes retry transparently.
    pub fn send(&mut self, socket: Socket, data: &[u8]) {
        let index = match self.live_socket(socket, "send") {
            Some(index) => index,
            None => return,
        };
        let entry = &mut self.sockets[index];
        if entry.shutdown {
            error!("could not write to socket (socket is closing)");
            return;
        }
        trace!("queueing {} bytes (fd: {:?})", data.len(), entry.fd);
        entry.writebuf.extend(data);
        if entry.active {
            self.update_interest(index);
        }
    }

    /// `send` for string data.
    pub fn write(&mut self, socket: Socket, line: &str) {
        self.send(socket, line.as_bytes());
    }

    /// Formats and sends; pairs with the [`sendf!`](crate::sendf) macro.
    /// No newline is appended, callers frame their own lines.
    pub fn send_fmt(&mut self, socket: Socket, args: fmt::Arguments<'_>) {
        let text = fmt::format(args);
        self.send(socket, text.as_bytes());
    }

    /// Closes a socket: drains what it can of the write buffer, tears down
    /// TLS, releases the descriptor and queues the handle for collection.
    /// Safe mid-callback; a second close is a logged no-op.
    pub fn close(&mut self, socket: Socket) {
        let index = match self.live_socket(socket, "close") {
            Some(index) => index,
            None => return,
        };
        self.close_internal(index);
    }

    /// Switches the socket to line framing: any of up to five delimiter
    /// bytes ends a segment. Empty segments are suppressed unless
    /// `parse_empty`.
    pub fn parse_lines(&mut self, socket: Socket, delimiters: &[u8], parse_empty: bool) {
        let index = match self.live_socket(socket, "parse_lines") {
            Some(index) => index,
            None => return,
        };
        match Framing::lines(delimiters, parse_empty) {
            Some(framing) => {
                let entry = &mut self.sockets[index];
                entry.framing = framing;
                entry.skipping = false;
            }
            None => warn!(
                "parse_lines needs between 1 and {} delimiter bytes",
                socket::MAX_DELIMITERS
            ),
        }
    }

    /// Switches the socket back to raw buffer delivery.
    pub fn parse_raw(&mut self, socket: Socket) {
        if let Some(index) = self.live_socket(socket, "parse_raw") {
            let entry = &mut self.sockets[index];
            entry.framing = Framing::Raw;
            entry.skipping = false;
        }
    }

    /// Replaces the event callback (e.g. on a freshly accepted socket).
    pub fn set_callback<F>(&mut self, socket: Socket, callback: F)
    where
        F: FnMut(&mut Reactor, Socket, Event<'_>) + 'static,
    {
        if let Some(index) = self.live_socket(socket, "set_callback") {
            self.sockets[index].callback = Some(Rc::new(RefCell::new(
                Box::new(callback) as BoxedSocketCallback
            )));
        }
    }

    /// During a `Data` dispatch: keep the last `n` bytes of the delivered
    /// buffer unconsumed for the next dispatch.
    pub fn retain(&mut self, socket: Socket, n: usize) {
        if let Some(index) = self.live_socket(socket, "retain") {
            self.sockets[index].retain = Some(n);
        }
    }

    pub fn status(&self, socket: Socket) -> Status {
        match self.sockets.get(socket.index) {
            Some(entry) if entry.gen == socket.gen => entry.status,
            _ => Status::Closed,
        }
    }

    pub fn peer_addr(&self, socket: Socket) -> Option<SocketAddr> {
        self.sockets
            .get(socket.index)
            .filter(|entry| entry.gen == socket.gen)
            .and_then(|entry| entry.peer)
    }

    pub fn local_addr(&self, socket: Socket) -> Option<SocketAddr> {
        self.sockets
            .get(socket.index)
            .filter(|entry| entry.gen == socket.gen)
            .and_then(|entry| entry.local)
    }

    // ---- Sockets: lookup / connect / listen ----------------------------

    /// Builds one side of a lookup: literal addresses resolve in place,
    /// hostnames start a query owned by the socket.
    fn make_side(
        &mut self,
        sock_index: usize,
        sock_gen: u32,
        host: &str,
        family: Family,
        bind_side: bool,
    ) -> LookupSide {
        if let Ok(ip) = host.parse::<IpAddr>() {
            let allowed = match ip {
                IpAddr::V4(_) => family.allows_v4(),
                IpAddr::V6(_) => family.allows_v6(),
            };
            if allowed {
                return LookupSide::literal(ip);
            }
            // Literal of a masked-out family: selection will report it.
            return LookupSide {
                present: true,
                host: Some(host.to_string()),
                pending: None,
                results: Vec::new(),
            };
        }

        let records = match family {
            Family::V4 => RecordSet::A,
            Family::V6 => RecordSet::AAAA,
            Family::Both => RecordSet::A | RecordSet::AAAA,
        };
        let gen = self.bump_gen();
        let query = self.queries.insert(QueryEntry {
            gen,
            dead: false,
            owner: QueryOwner::Socket {
                socket: sock_index,
                gen: sock_gen,
                bind_side,
            },
        });
        self.dns.add(
            query,
            gen,
            &QueryKind::Forward {
                host: host.to_string(),
                records,
            },
        );
        LookupSide::resolving(host.to_string(), query)
    }

    /// Applies finished lookups: picks addresses or fails the socket with
    /// a `DnsFailed` event. Returns whether the socket may proceed.
    fn apply_lookup(&mut self, index: usize, no_v6: bool) -> bool {
        let entry = &self.sockets[index];
        let listening = entry.status == Status::Listening;
        let lookup = match entry.lookup.as_deref() {
            Some(lookup) => lookup,
            None => return false,
        };
        match socket::select_addresses(lookup, no_v6) {
            Ok(selection) => {
                let entry = &mut self.sockets[index];
                let bind_port = if listening { entry.port } else { 0 };
                let port = entry.port;
                entry.ipv6 = selection.ipv6;
                entry.reconnect_v4 = selection.fallback_v4;
                entry.local = selection.bind.map(|ip| SocketAddr::new(ip, bind_port));
                if let Some(dest) = selection.dest {
                    entry.peer = Some(SocketAddr::new(dest, port));
                }
                true
            }
            Err(message) => {
                error!("error applying lookup results: {}", message);
                let handle = self.handle_for(index);
                self.emit(handle, Event::DnsFailed(message));
                if let Some(entry) = self.sockets.get(index) {
                    if entry.gen == handle.gen && entry.stage != Stage::Closed {
                        self.close_internal(index);
                    }
                }
                false
            }
        }
    }

    /// Creates the descriptor and issues the non-blocking `connect`.
    fn connect_finish(&mut self, index: usize) -> io::Result<()> {
        let entry = &self.sockets[index];
        let ipv6 = entry.ipv6;
        let bind_addr = entry.local;
        let dest = match entry.peer {
            Some(dest) => dest,
            None => return Err(io::Error::new(io::ErrorKind::Other, "no destination")),
        };

        let fd = match sys::new_tcp_socket(ipv6) {
            Ok(fd) => fd,
            Err(err) => {
                error!("could not create socket ({})", err);
                return Err(err);
            }
        };
        if let Some(bind_addr) = bind_addr {
            if let Err(err) = sys::bind(fd, &bind_addr) {
                debug!("bind to {} failed ({})", bind_addr, err);
            }
        }

        let entry = &mut self.sockets[index];
        entry.fd = Some(fd);
        entry.stage = Stage::Connecting;
        entry.status = Status::Connecting;

        match sys::connect(fd, &dest) {
            Ok(()) => {}
            Err(ref err) if sys::connect_in_progress(err) => {}
            Err(err) => {
                // An immediate failure (e.g. unreachable network) takes the
                // same path as one reported by readiness.
                debug!("connect to {} failed immediately ({})", dest, err);
                self.connect_failed(index, Some(err));
                return Ok(());
            }
        }
        trace!("connecting fd {:?} to {}", fd, dest);
        self.activate(index);
        Ok(())
    }

    /// Failed connect: silent retry over IPv4 when armed, otherwise a
    /// `NotConnected` event.
    fn connect_failed(&mut self, index: usize, err: Option<io::Error>) {
        let entry = &mut self.sockets[index];
        if entry.reconnect_v4 && entry.ipv6 {
            debug!("connecting over IPv6 failed, retrying over IPv4");
            entry.reconnect_v4 = false;
            self.deactivate(index);
            if let Some(fd) = self.sockets[index].fd.take() {
                let _ = sys::close(fd);
            }
            if self.apply_lookup(index, true) {
                if self.connect_finish(index).is_ok() {
                    return;
                }
            }
            // Fallback selection failed; surface the original error.
        }
        let handle = self.handle_for(index);
        self.sockets[index].dead = true;
        self.emit(handle, Event::NotConnected(err));
        self.teardown_if_dead(index);
    }

    /// Creates, binds and activates the listening descriptor.
    fn listen_finish(&mut self, index: usize) -> io::Result<()> {
        let entry = &self.sockets[index];
        let ipv6 = entry.ipv6;
        let addr = match entry.local {
            Some(addr) => addr,
            None => return Err(io::Error::new(io::ErrorKind::Other, "no bind address")),
        };

        let fd = sys::new_tcp_socket(ipv6).map_err(|err| {
            error!("could not create socket ({})", err);
            err
        })?;
        let setup = sys::set_reuseaddr(fd)
            .and_then(|()| sys::bind(fd, &addr))
            .and_then(|()| sys::listen(fd, 1));
        if let Err(err) = setup {
            error!("could not listen on {} ({})", addr, err);
            let _ = sys::close(fd);
            return Err(err);
        }

        let entry = &mut self.sockets[index];
        entry.fd = Some(fd);
        entry.stage = Stage::Listening;
        entry.status = Status::Listening;
        // Reflect the kernel-chosen port when binding to 0.
        if let Ok(local) = sys::local_addr(fd) {
            entry.local = Some(local);
        }
        self.activate(index);
        Ok(())
    }

    /// Readiness while connecting. Writable means connected; readable
    /// means failure unless the socket connected and data is already
    /// waiting.
    fn connecting_ready(&mut self, index: usize, readable: bool, writable: bool) {
        if readable {
            let err = self.sockets[index]
                .fd
                .and_then(|fd| sys::take_error(fd).ok().flatten());
            if err.is_some() || !writable {
                self.connect_failed(index, err);
                return;
            }
            // No socket error and writable too: connected, with data
            // already queued; fall through.
        }
        if !writable {
            return;
        }

        let entry = &mut self.sockets[index];
        entry.lookup = None;
        entry.reconnect_v4 = false;
        if let Some(fd) = entry.fd {
            if let Ok(local) = sys::local_addr(fd) {
                entry.local = Some(local);
            }
        }

        if entry.tls_client.is_some() {
            debug!("client socket connected, starting TLS handshake");
            let setup = entry.tls_client.take().unwrap();
            match tls::client_session(&setup) {
                Ok(session) => {
                    entry.tls = Some(session);
                    entry.stage = Stage::TlsHandshake;
                    entry.status = Status::TlsHandshake;
                    self.handshake_ready(index);
                }
                Err(err) => {
                    error!("could not create TLS session ({})", err);
                    let handle = self.handle_for(index);
                    self.sockets[index].dead = true;
                    self.emit(handle, Event::NotConnected(Some(err)));
                    self.teardown_if_dead(index);
                }
            }
            return;
        }

        entry.stage = Stage::Connected;
        entry.status = Status::Connected;
        entry.readbuf.ensure_read_room();
        self.update_interest(index);
        let handle = self.handle_for(index);
        self.emit(handle, Event::Connected);
        self.teardown_if_dead(index);
    }

    /// One accepted connection per readiness event, inheriting TLS from
    /// the listener. Accept errors keep the listener alive.
    fn accept_ready(&mut self, index: usize) {
        let listener = &self.sockets[index];
        let listener_fd = match listener.fd {
            Some(fd) => fd,
            None => return,
        };
        let listener_handle = self.handle_for(index);

        let (fd, peer) = match sys::accept(listener_fd) {
            Ok(accepted) => accepted,
            Err(ref err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                return;
            }
            Err(err) => {
                warn!("accept failed ({})", err);
                return;
            }
        };

        if self.sockets.len() >= self.max_sockets {
            error!("socket limit reached, dropping incoming connection");
            let _ = sys::close(fd);
            return;
        }

        let gen = self.bump_gen();
        let listener = &self.sockets[index];
        let mut child = SocketEntry::new(gen);
        child.fd = Some(fd);
        child.incoming = true;
        child.ipv6 = listener.ipv6;
        child.port = listener.port;
        child.peer = Some(peer);
        child.local = listener.local;
        child.accept_parent = Some(listener_handle);

        let tls_child = match &listener.tls_creds {
            Some(creds) => match tls::server_session(creds) {
                Ok(session) => {
                    child.tls = Some(session);
                    child.stage = Stage::TlsHandshake;
                    child.status = Status::TlsHandshake;
                    true
                }
                Err(err) => {
                    error!("could not create TLS session for accepted fd ({})", err);
                    let _ = sys::close(fd);
                    return;
                }
            },
            None => {
                child.stage = Stage::Connected;
                child.status = Status::Connected;
                child.readbuf.ensure_read_room();
                false
            }
        };

        let child_index = self.sockets.insert(child);
        let child_handle = Socket {
            index: child_index,
            gen,
        };
        trace!("accepted fd {:?} from {}", fd, peer);
        self.activate(child_index);

        if !tls_child {
            // TLS children are announced once their handshake completes.
            self.emit(listener_handle, Event::Accept(child_handle));
        }
    }

    /// Drives a TLS handshake one readiness cycle further.
    fn handshake_ready(&mut self, index: usize) {
        let entry = &mut self.sockets[index];
        let fd = match entry.fd {
            Some(fd) => fd,
            None => return,
        };
        let status = match entry.tls.as_mut() {
            Some(tls) => tls.handshake_step(fd),
            None => return,
        };

        match status {
            tls::HsStatus::Done => {
                debug!("TLS handshake for fd {:?} successful", fd);
                let entry = &mut self.sockets[index];
                entry.stage = Stage::Connected;
                entry.status = Status::Connected;
                entry.readbuf.ensure_read_room();
                self.update_interest(index);
                let handle = self.handle_for(index);
                if let Some(parent) = self.sockets[index].accept_parent {
                    self.emit(parent, Event::Accept(handle));
                } else {
                    self.emit(handle, Event::Connected);
                }
                self.teardown_if_dead(index);
            }
            tls::HsStatus::WantRead | tls::HsStatus::WantWrite => self.update_interest(index),
            tls::HsStatus::Failed(err) => {
                let entry = &mut self.sockets[index];
                entry.dead = true;
                if entry.incoming {
                    // Incoming handshake failures drop the child silently.
                    error!(
                        "TLS handshake failed for incoming connection, dropping fd {:?} ({})",
                        fd, err
                    );
                    self.teardown_if_dead(index);
                } else {
                    let handle = self.handle_for(index);
                    self.emit(handle, Event::NotConnected(Some(err)));
                    self.teardown_if_dead(index);
                }
            }
        }
    }

    /// Readiness on an established socket: the read path first (it may
    /// close the socket), then the write drain.
    fn stream_ready(&mut self, index: usize, readable: bool, writable: bool) {
        if readable {
            self.read_ready(index);
        }
        let live = matches!(
            self.sockets.get(index),
            Some(entry) if entry.stage == Stage::Connected && !entry.dead
        );
        if live && writable {
            self.write_ready(index);
        }
    }

    fn read_ready(&mut self, index: usize) {
        loop {
            let entry = match self.sockets.get_mut(index) {
                Some(entry) if entry.stage == Stage::Connected && !entry.dead => entry,
                _ => return,
            };
            entry.readbuf.ensure_read_room();
            let fd = match entry.fd {
                Some(fd) => fd,
                None => return,
            };
            let result = match entry.tls.as_mut() {
                Some(tls) => {
                    let spare = entry.readbuf.spare_mut();
                    tls.read(fd, spare)
                }
                None => sys::recv(fd, entry.readbuf.spare_mut()),
            };

            match result {
                Ok(0) => {
                    let handle = self.handle_for(index);
                    self.sockets[index].dead = true;
                    self.emit(handle, Event::Closed(None));
                    self.teardown_if_dead(index);
                    return;
                }
                Ok(n) => {
                    let entry = &mut self.sockets[index];
                    entry.readbuf.advance(n);
                    trace!("received {} bytes (fd: {:?})", n, fd);
                    let drained_to_brim = entry.readbuf.is_full();
                    self.dispatch_read(index);
                    if !drained_to_brim {
                        self.update_interest(index);
                        return;
                    }
                    // Buffer filled to the brim: the kernel may hold more.
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    // TLS may have flipped its write appetite.
                    self.update_interest(index);
                    return;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    error!("could not read from socket (fd: {:?}): {}", fd, err);
                    let handle = self.handle_for(index);
                    self.sockets[index].dead = true;
                    self.emit(handle, Event::Closed(Some(err)));
                    self.teardown_if_dead(index);
                    return;
                }
            }
        }
    }

    /// Delivers buffered bytes: raw buffer or scanned segments.
    fn dispatch_read(&mut self, index: usize) {
        let handle = self.handle_for(index);
        let entry = &mut self.sockets[index];
        if entry.readbuf.is_empty() {
            return;
        }

        let framing = match entry.delimiters() {
            None => None,
            Some((delimiters, parse_empty)) => {
                Some((delimiters.to_vec(), parse_empty, entry.skipping))
            }
        };
        let mut buf = std::mem::take(&mut entry.readbuf);

        match framing {
            None => {
                entry.retain = None;
                let len = buf.len();
                self.emit(handle, Event::Data(buf.filled()));
                if let Some(entry) = self.sockets.get_mut(index) {
                    if entry.gen == handle.gen && entry.stage != Stage::Closed {
                        let keep = entry.retain.take().unwrap_or(0).min(len);
                        buf.consume(len - keep);
                        entry.readbuf = buf;
                    }
                }
            }
            Some((delimiters, parse_empty, skipping)) => {
                let (consumed, still_skipping) = {
                    let mut scanner = socket::LineScanner::new(
                        buf.filled(),
                        &delimiters,
                        parse_empty,
                        skipping,
                    );
                    loop {
                        let (start, end) = match scanner.next_segment() {
                            Some(segment) => segment,
                            None => break,
                        };
                        self.emit(handle, Event::Line(&buf.filled()[start..end]));
                        let live = matches!(
                            self.sockets.get(index),
                            Some(entry) if entry.gen == handle.gen
                                && entry.stage != Stage::Closed
                        );
                        if !live {
                            // Closed mid-dispatch; the rest of the buffer
                            // goes with the socket.
                            return;
                        }
                    }
                    (scanner.consumed(), scanner.still_skipping())
                };
                buf.consume(consumed);
                if let Some(entry) = self.sockets.get_mut(index) {
                    if entry.gen == handle.gen && entry.stage != Stage::Closed {
                        entry.skipping = still_skipping;
                        entry.readbuf = buf;
                    }
                }
            }
        }
    }

    fn write_ready(&mut self, index: usize) {
        match self.try_write(index) {
            Ok(_) => {
                if self
                    .sockets
                    .get(index)
                    .map_or(false, |entry| entry.active && !entry.dead)
                {
                    self.update_interest(index);
                }
            }
            Err(err) => {
                error!(
                    "could not write to socket (fd: {:?}): {}",
                    self.sockets.get(index).and_then(|entry| entry.fd),
                    err
                );
                let handle = self.handle_for(index);
                self.sockets[index].dead = true;
                self.emit(handle, Event::Closed(Some(err)));
                self.teardown_if_dead(index);
            }
        }
    }

    /// Drains as much of the write buffer as the transport accepts.
    fn try_write(&mut self, index: usize) -> io::Result<usize> {
        let entry = &mut self.sockets[index];
        let fd = match entry.fd {
            Some(fd) => fd,
            None => return Ok(0),
        };
        if let Some(tls) = entry.tls.as_mut() {
            if entry.writebuf.is_empty() {
                // Nothing buffered, but the record layer may still owe the
                // kernel bytes (handshake traffic, close notify).
                tls.flush(fd)?;
                return Ok(0);
            }
            match tls.write(fd, entry.writebuf.filled()) {
                Ok(n) => {
                    entry.writebuf.consume(n);
                    Ok(n)
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
                Err(err) => Err(err),
            }
        } else {
            if entry.writebuf.is_empty() {
                return Ok(0);
            }
            match sys::send(fd, entry.writebuf.filled()) {
                Ok(n) => {
                    trace!("wrote {} bytes (fd: {:?})", n, fd);
                    entry.writebuf.consume(n);
                    Ok(n)
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::Interrupted =>
                {
                    Ok(0)
                }
                Err(err) => Err(err),
            }
        }
    }

    /// Shared teardown: best-effort blocking flush of pending writes, TLS
    /// close-notify, descriptor release, tombstone + collection.
    fn close_internal(&mut self, index: usize) {
        let entry = &mut self.sockets[index];
        if entry.stage == Stage::Closed {
            return;
        }
        entry.shutdown = true;

        if !entry.writebuf.is_empty()
            && entry.fd.is_some()
            && entry.stage == Stage::Connected
        {
            // Final flush in blocking mode; the descriptor is about to be
            // closed anyway.
            let fd = entry.fd.unwrap();
            let _ = sys::set_nonblocking(fd, false);
            let _ = self.try_write(index);
        }

        let entry = &mut self.sockets[index];
        if let (Some(tls), Some(fd)) = (entry.tls.as_mut(), entry.fd) {
            tls.disconnect(fd);
        }
        entry.tls = None;
        entry.tls_client = None;
        entry.tls_creds = None;

        if let Some(lookup) = entry.lookup.take() {
            let LookupState { bind, dest, .. } = *lookup;
            for side in [bind, dest] {
                if let Some(query) = side.pending {
                    self.abort_socket_query(query);
                }
            }
        }

        self.deactivate(index);
        let dns_owned = self.sockets[index].dns_owned;
        if let Some(fd) = self.sockets[index].fd.take() {
            // The DNS engine owns its transport descriptor.
            if !dns_owned {
                let _ = sys::close(fd);
            }
        }

        let entry = &mut self.sockets[index];
        entry.stage = Stage::Closed;
        entry.status = Status::Closed;
        entry.dead = false;
        entry.callback = None;
        entry.readbuf.clear();
        entry.writebuf.clear();
        let gen = entry.gen;
        trace!("socket {}.{} closed", index, gen);
        if !self.gc.add(GcKind::Socket, index, gen) {
            self.sockets.remove(index);
        }
    }

    fn teardown_if_dead(&mut self, index: usize) {
        if let Some(entry) = self.sockets.get(index) {
            if entry.dead && entry.stage != Stage::Closed {
                self.close_internal(index);
            }
        }
    }

    /// Surfaces `Closed` for sockets that died outside a dispatch (e.g. a
    /// failed backend registration).
    fn sweep_dead(&mut self) {
        let dead: Vec<usize> = self
            .sockets
            .iter()
            .filter(|(_, entry)| entry.dead && entry.stage != Stage::Closed)
            .map(|(index, _)| index)
            .collect();
        for index in dead {
            let handle = self.handle_for(index);
            self.emit(handle, Event::Closed(None));
            self.teardown_if_dead(index);
        }
    }

    // ---- Timers --------------------------------------------------------

    /// Creates a timer; with a deadline it is queued immediately.
    pub fn timer_create(&mut self, deadline: Option<Instant>) -> Timer {
        let gen = self.bump_gen();
        let index = self.timers.insert(gen, deadline);
        Timer { index, gen }
    }

    pub fn timer_set_callback<F>(&mut self, timer: Timer, callback: F)
    where
        F: FnMut(&mut Reactor, Timer) + 'static,
    {
        if let Some(index) = self.live_timer(timer, "timer_set_callback") {
            self.timers.get_mut(index).unwrap().callback = Some(Rc::new(RefCell::new(
                Box::new(callback) as BoxedTimerCallback,
            )));
        }
    }

    /// (Re)programs the deadline and queues the timer.
    pub fn timer_set_timeout(&mut self, timer: Timer, deadline: Instant) {
        if let Some(index) = self.live_timer(timer, "timer_set_timeout") {
            self.timers.set_timeout(index, deadline);
        }
    }

    /// `Some(interval)` makes the timer periodic (re-armed from its stored
    /// deadline, so it does not drift); `None` reverts it to one-shot with
    /// the most recent deadline.
    pub fn timer_set_autoreload(&mut self, timer: Timer, interval: Option<Duration>) {
        if let Some(index) = self.live_timer(timer, "timer_set_autoreload") {
            self.timers.set_autoreload(index, interval, Instant::now());
        }
    }

    /// Queues the timer at its programmed deadline if it is not queued.
    pub fn timer_start(&mut self, timer: Timer) {
        if let Some(index) = self.live_timer(timer, "timer_start") {
            self.timers.start(index);
        }
    }

    /// Destroys a timer; safe from within its own callback.
    pub fn timer_destroy(&mut self, timer: Timer) {
        if let Some(index) = self.live_timer(timer, "timer_destroy") {
            self.destroy_timer_slot(index);
        }
    }

    /// One-shot convenience: fires once after `delay`.
    pub fn timer_after<F>(&mut self, delay: Duration, callback: F) -> Timer
    where
        F: FnMut(&mut Reactor, Timer) + 'static,
    {
        let timer = self.timer_create(Some(Instant::now() + delay));
        self.timer_set_callback(timer, callback);
        timer
    }

    /// Periodic convenience: fires every `interval` until destroyed.
    pub fn timer_every<F>(&mut self, interval: Duration, callback: F) -> Timer
    where
        F: FnMut(&mut Reactor, Timer) + 'static,
    {
        let timer = self.timer_create(None);
        self.timer_set_callback(timer, callback);
        self.timer_set_autoreload(timer, Some(interval));
        timer
    }

    fn destroy_timer_slot(&mut self, index: usize) {
        let gen = self.timers.get(index).map(|entry| entry.gen).unwrap_or(0);
        self.timers.destroy(index);
        if !self.gc.add(GcKind::Timer, index, gen) {
            self.timers.remove(index);
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        while let Some(index) = self.timers.pop_expired(now) {
            let entry = match self.timers.get(index) {
                Some(entry) => entry,
                None => continue,
            };
            let handle = Timer {
                index,
                gen: entry.gen,
            };
            let callback = entry.callback.clone();
            if let Some(callback) = callback {
                (&mut *callback.borrow_mut())(self, handle);
            }
            // One-shot timers are done once dispatched, unless the
            // callback reprogrammed them (autoreload or a fresh deadline,
            // either of which leaves them queued).
            if let Some(entry) = self.timers.get(index) {
                if entry.gen == handle.gen
                    && !entry.dead
                    && entry.interval.is_none()
                    && !entry.in_list()
                {
                    self.destroy_timer_slot(index);
                }
            }
        }
    }

    fn live_timer(&self, timer: Timer, op: &str) -> Option<usize> {
        match self.timers.get(timer.index) {
            Some(entry) if entry.gen == timer.gen && !entry.dead => Some(timer.index),
            Some(entry) if entry.gen == timer.gen => {
                warn!("called {} for destroyed timer", op);
                None
            }
            _ => {
                warn!("called {} for unknown timer", op);
                None
            }
        }
    }

    // ---- DNS -----------------------------------------------------------

    /// Forward lookup; the callback receives address records (or an error
    /// string). Literals complete on the next tick without touching the
    /// engine.
    pub fn resolve<F>(&mut self, host: &str, records: RecordSet, callback: F) -> io::Result<Query>
    where
        F: FnMut(&mut Reactor, Query, Result<Vec<DnsRecord>, String>) + 'static,
    {
        let gen = self.bump_gen();
        let index = self.queries.insert(QueryEntry {
            gen,
            dead: false,
            owner: QueryOwner::Public(Some(Rc::new(RefCell::new(
                Box::new(callback) as BoxedDnsCallback
            )))),
        });

        if let Ok(ip) = host.parse::<IpAddr>() {
            let outcome = match ip {
                IpAddr::V4(v4) if records.contains_a() => Ok(vec![DnsRecord::V4(v4)]),
                IpAddr::V6(v6) if records.contains_aaaa() => Ok(vec![DnsRecord::V6(v6)]),
                _ => Err(format!("no usable records for {}", host)),
            };
            self.dns_ready.push(dns::Completion {
                query: index,
                gen,
                outcome,
            });
        } else {
            self.dns.add(
                index,
                gen,
                &QueryKind::Forward {
                    host: host.to_string(),
                    records,
                },
            );
        }
        Ok(Query { index, gen })
    }

    /// Reverse lookup; the callback receives the hostname.
    pub fn resolve_reverse<F>(&mut self, addr: IpAddr, callback: F) -> io::Result<Query>
    where
        F: FnMut(&mut Reactor, Query, Result<Vec<DnsRecord>, String>) + 'static,
    {
        let gen = self.bump_gen();
        let index = self.queries.insert(QueryEntry {
            gen,
            dead: false,
            owner: QueryOwner::Public(Some(Rc::new(RefCell::new(
                Box::new(callback) as BoxedDnsCallback
            )))),
        });
        self.dns.add(index, gen, &QueryKind::Reverse { addr });
        Ok(Query { index, gen })
    }

    /// Cancels a query; a result already in flight is discarded.
    pub fn dns_abort(&mut self, query: Query) {
        match self.queries.get_mut(query.index) {
            Some(entry) if entry.gen == query.gen && !entry.dead => {
                entry.dead = true;
                entry.owner = QueryOwner::Public(None);
                self.dns.remove(query.index);
                if !self.gc.add(GcKind::Query, query.index, query.gen) {
                    self.queries.remove(query.index);
                }
            }
            Some(entry) if entry.gen == query.gen => {
                warn!("called dns_abort for finished query");
            }
            _ => warn!("called dns_abort for unknown query"),
        }
    }

    /// Socket-owned lookups are silently cancelled on close.
    fn abort_socket_query(&mut self, index: usize) {
        if self.queries.contains(index) {
            self.dns.remove(index);
            self.queries.remove(index);
        }
    }

    fn dispatch_dns(&mut self, completions: Vec<dns::Completion>) {
        for completion in completions {
            let entry = match self.queries.get(completion.query) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.gen != completion.gen {
                continue;
            }
            if entry.dead {
                trace!("discarding results for aborted query");
                continue;
            }
            match &entry.owner {
                QueryOwner::Public(callback) => {
                    let callback = callback.clone();
                    let handle = Query {
                        index: completion.query,
                        gen: completion.gen,
                    };
                    let entry = self.queries.get_mut(completion.query).unwrap();
                    entry.dead = true;
                    entry.owner = QueryOwner::Public(None);
                    if !self.gc.add(GcKind::Query, completion.query, completion.gen) {
                        self.queries.remove(completion.query);
                    }
                    if let Some(callback) = callback {
                        (&mut *callback.borrow_mut())(self, handle, completion.outcome);
                    }
                }
                QueryOwner::Socket {
                    socket,
                    gen,
                    bind_side,
                } => {
                    let (socket, gen, bind_side) = (*socket, *gen, *bind_side);
                    self.queries.remove(completion.query);
                    self.socket_lookup_done(socket, gen, bind_side, completion.outcome);
                }
            }
        }
    }

    /// A socket-owned lookup finished; when the pending set is empty the
    /// resolution is applied and the connect/listen proceeds.
    fn socket_lookup_done(
        &mut self,
        index: usize,
        gen: u32,
        bind_side: bool,
        outcome: Result<Vec<DnsRecord>, String>,
    ) {
        let entry = match self.sockets.get_mut(index) {
            Some(entry) if entry.gen == gen && entry.stage == Stage::Lookup => entry,
            _ => return,
        };
        let listening = entry.status == Status::Listening;
        let lookup = match entry.lookup.as_deref_mut() {
            Some(lookup) => lookup,
            None => return,
        };
        let side = if bind_side {
            &mut lookup.bind
        } else {
            &mut lookup.dest
        };
        side.pending = None;
        match outcome {
            Ok(records) => {
                side.results = records
                    .into_iter()
                    .filter_map(|record| match record {
                        DnsRecord::V4(ip) => Some(IpAddr::V4(ip)),
                        DnsRecord::V6(ip) => Some(IpAddr::V6(ip)),
                        DnsRecord::Name(_) => None,
                    })
                    .collect();
            }
            Err(message) => debug!("socket lookup failed: {}", message),
        }

        if !lookup.finished() {
            return;
        }
        debug!("all pending lookups finished, applying results");
        if self.apply_lookup(index, false) {
            let result = if listening {
                self.sockets[index].lookup = None;
                self.listen_finish(index)
            } else {
                self.connect_finish(index)
            };
            if result.is_err() {
                self.sockets[index].dead = true;
            }
        }
    }

    // ---- Internals -----------------------------------------------------

    fn handle_for(&self, index: usize) -> Socket {
        Socket {
            index,
            gen: self.sockets[index].gen,
        }
    }

    fn live_socket(&self, socket: Socket, op: &str) -> Option<usize> {
        match self.sockets.get(socket.index) {
            Some(entry)
                if entry.gen == socket.gen && entry.stage != Stage::Closed && !entry.dns_owned =>
            {
                Some(socket.index)
            }
            Some(entry) if entry.gen == socket.gen => {
                warn!("called {} for closed socket", op);
                None
            }
            _ => {
                warn!("called {} for unknown socket", op);
                None
            }
        }
    }

    fn emit(&mut self, handle: Socket, event: Event<'_>) {
        let callback = match self.sockets.get(handle.index) {
            Some(entry) if entry.gen == handle.gen => entry.callback.clone(),
            _ => None,
        };
        if let Some(callback) = callback {
            trace!("dispatching {:?} to {:?}", event, handle);
            (&mut *callback.borrow_mut())(self, handle, event);
        }
    }

    fn activate(&mut self, index: usize) {
        let entry = &mut self.sockets[index];
        if entry.active {
            return;
        }
        let fd = match entry.fd {
            Some(fd) => fd,
            None => return,
        };
        let interest = entry.interest();
        entry.active = true;
        if let Err(err) = self.selector.add(fd, Token(index), interest) {
            error!("could not register fd {:?} with poll backend ({})", fd, err);
            let entry = &mut self.sockets[index];
            entry.active = false;
            entry.dead = true;
        }
    }

    fn deactivate(&mut self, index: usize) {
        let entry = &mut self.sockets[index];
        if !entry.active {
            return;
        }
        entry.active = false;
        if let Some(fd) = entry.fd {
            if let Err(err) = self.selector.remove(fd) {
                debug!("could not remove fd {:?} from poll backend ({})", fd, err);
            }
        }
    }

    fn update_interest(&mut self, index: usize) {
        let entry = &self.sockets[index];
        if !entry.active {
            return;
        }
        let fd = match entry.fd {
            Some(fd) => fd,
            None => return,
        };
        let interest = entry.interest();
        if let Err(err) = self.selector.update(fd, Token(index), interest) {
            error!("could not update fd {:?} in poll backend ({})", fd, err);
            self.sockets[index].dead = true;
        }
    }

    fn reclaim(&mut self, kind: GcKind, index: usize, gen: u32) {
        match kind {
            GcKind::Socket => {
                if let Some(entry) = self.sockets.get(index) {
                    if entry.gen == gen && entry.stage == Stage::Closed {
                        self.sockets.remove(index);
                    }
                }
            }
            GcKind::Timer => {
                if let Some(entry) = self.timers.get(index) {
                    if entry.gen == gen && entry.dead {
                        self.timers.remove(index);
                    }
                }
            }
            GcKind::Query => {
                if let Some(entry) = self.queries.get(index) {
                    if entry.gen == gen && entry.dead {
                        self.queries.remove(index);
                    }
                }
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.dns.stop();
        for (_, entry) in self.sockets.iter_mut() {
            if entry.dns_owned {
                continue;
            }
            if let Some(fd) = entry.fd.take() {
                let _ = sys::close(fd);
            }
        }
    }
}

/// `printf`-style send: formats into the socket's write buffer.
///
/// ```no_run
/// # use muxio::{Reactor, Connect, Event};
/// # let mut reactor = Reactor::new().unwrap();
/// # let sock = reactor.connect(Connect::new("127.0.0.1", 6667), |_, _, _| {}).unwrap();
/// muxio::sendf!(reactor, sock, "NICK {}\r\n", "muxbot");
/// ```
#[macro_export]
macro_rules! sendf {
    ($reactor:expr, $socket:expr, $($arg:tt)*) => {
        $reactor.send_fmt($socket, format_args!($($arg)*))
    };
}
