//! OS-specific readiness backends.
//!
//! Each platform exposes the same capability set behind `sys::Selector`:
//! `add`/`update`/`remove` a registration and `select` for the next batch of
//! readiness events. The backend is probed at startup in preferred order
//! (kqueue, epoll, win32 message pump, select); the first one whose init
//! succeeds wins.

use crate::token::Token;

/// A readiness backend, selectable through [`Config::backend`].
///
/// [`Config::backend`]: crate::Config::backend
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    /// BSD/macOS `kevent`.
    Kqueue,
    /// Linux `epoll`, level-triggered.
    Epoll,
    /// Windows hidden-window `WSAAsyncSelect` message pump.
    Win32,
    /// Portable `select` fallback.
    Select,
}

/// One readiness notification out of the backend.
#[derive(Copy, Clone, Debug)]
pub(crate) struct EventData {
    pub(crate) token: Token,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

/// Reused event buffer.
pub(crate) type Events = Vec<EventData>;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use self::unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use self::windows::*;
