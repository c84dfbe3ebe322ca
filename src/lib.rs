//! Callback-driven non-blocking TCP I/O.
//!
//! `muxio` is an embeddable event loop for TCP clients and servers: register
//! sockets, timers and DNS queries with a [`Reactor`], and it drives them
//! off whichever kernel readiness mechanism is available (kqueue, epoll, a
//! Win32 message pump, or `select`), delivering line- or buffer-oriented
//! [`Event`]s through callbacks. TLS is transparent on both sides; hostname
//! resolution never blocks the loop.
//!
//! # Example
//!
//! An echo server for newline-terminated input:
//!
//! ```no_run
//! use muxio::{Event, Listen, Reactor};
//!
//! fn main() -> std::io::Result<()> {
//!     let mut reactor = Reactor::new()?;
//!     reactor.listen(Listen::new("127.0.0.1", 4000), |reactor, _listener, event| {
//!         if let Event::Accept(client) = event {
//!             reactor.parse_lines(client, b"\n", false);
//!             reactor.set_callback(client, |reactor, client, event| match event {
//!                 Event::Line(line) => {
//!                     let line = line.to_vec();
//!                     reactor.send(client, &line);
//!                     reactor.send(client, b"\n");
//!                 }
//!                 Event::Closed(_) => {}
//!                 _ => {}
//!             });
//!         }
//!     })?;
//!     reactor.run()
//! }
//! ```
//!
//! # Model
//!
//! A single `Reactor` instance owns everything and runs on one thread; the
//! only blocking point is the readiness wait inside [`Reactor::run`]. Every
//! operation is safe from within any callback, including closing the socket
//! currently being dispatched: handles are generation-checked ids, and a
//! closed handle stays resolvable (as a logged no-op) for a grace period.
//! Worker threads exist only inside the blocking DNS engine and never touch
//! reactor state.

#[macro_use]
mod macros;

mod buffer;
mod dns;
mod event;
mod gc;
mod interest;
pub mod logger;
mod reactor;
mod socket;
mod sys;
mod timer;
mod tls;
mod token;

pub use dns::{DnsMode, DnsRecord, RecordSet};
pub use event::{Event, Status};
pub use reactor::{Config, Query, Reactor, Socket, Timer};
pub use socket::{Connect, Family, Listen, MAX_DELIMITERS};
pub use sys::Backend;
pub use tls::TlsClientOptions;
