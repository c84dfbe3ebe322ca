use std::io;

/// An event delivered to a socket callback.
///
/// For a given socket, events arrive in the order they become observable:
/// `DnsFailed` or `NotConnected` (at most one of them, terminal),
/// or `Connected` followed by any number of `Data`/`Line` events and a final
/// `Closed`. Listening sockets only see `Accept`.
#[derive(Debug)]
pub enum Event<'a> {
    /// Outgoing connection (and TLS handshake, if requested) completed.
    Connected,
    /// Raw receive buffer, delivered when line parsing is off. The whole
    /// buffer is consumed when the callback returns unless
    /// [`Reactor::retain`] is called during dispatch.
    ///
    /// [`Reactor::retain`]: crate::Reactor::retain
    Data(&'a [u8]),
    /// One parsed segment, delivered when line parsing is on. Contains none
    /// of the configured delimiter bytes and is at most 1024 bytes long.
    Line(&'a [u8]),
    /// A listening socket accepted a connection. The new socket has no
    /// callback until one is set.
    Accept(crate::Socket),
    /// The connection attempt failed; carries the socket error if the OS
    /// reported one.
    NotConnected(Option<io::Error>),
    /// The connection is gone. `None` for a clean end-of-stream, `Some` for
    /// a hard I/O or TLS error.
    Closed(Option<io::Error>),
    /// Address resolution failed; the message describes what was missing.
    DnsFailed(String),
}

/// Externally visible state of a socket handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The descriptor is dead; the handle is waiting for collection.
    Closed,
    /// Server socket waiting for connections.
    Listening,
    /// Client socket waiting for address resolution or connection approval.
    Connecting,
    /// TCP established, TLS handshake still in flight.
    TlsHandshake,
    /// Connected client socket.
    Connected,
}
