use std::io;
use std::time::Duration;

use log::debug;

use crate::interest::Interest;
use crate::sys::{Backend, Events};
use crate::token::Token;

mod net;
pub(crate) use self::net::*;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd"
))]
mod kqueue;

mod select;

pub(crate) type Fd = std::os::unix::io::RawFd;

/// The probed readiness backend.
#[derive(Debug)]
pub(crate) enum Selector {
    #[cfg(any(
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    Kqueue(kqueue::Selector),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Epoll(epoll::Selector),
    Select(select::Selector),
}

impl Selector {
    /// Probes backends in preferred order, honoring an explicit override.
    pub(crate) fn new(size_hint: usize, force: Option<Backend>) -> io::Result<Selector> {
        if let Some(backend) = force {
            return Selector::init(backend, size_hint);
        }

        #[cfg(any(
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd"
        ))]
        match kqueue::Selector::new() {
            Ok(sel) => return Ok(Selector::Kqueue(sel)),
            Err(err) => debug!("kqueue backend unavailable: {}", err),
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        match epoll::Selector::new(size_hint) {
            Ok(sel) => return Ok(Selector::Epoll(sel)),
            Err(err) => debug!("epoll backend unavailable: {}", err),
        }

        let _ = size_hint;
        select::Selector::new().map(Selector::Select)
    }

    fn init(backend: Backend, size_hint: usize) -> io::Result<Selector> {
        match backend {
            #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "ios",
                target_os = "macos",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            Backend::Kqueue => kqueue::Selector::new().map(Selector::Kqueue),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::Epoll => epoll::Selector::new(size_hint).map(Selector::Epoll),
            Backend::Select => {
                let _ = size_hint;
                select::Selector::new().map(Selector::Select)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "backend not available on this platform",
            )),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "ios",
                target_os = "macos",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            Selector::Kqueue(_) => "kqueue",
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(_) => "epoll",
            Selector::Select(_) => "select",
        }
    }

    pub(crate) fn add(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        match self {
            #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "ios",
                target_os = "macos",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            Selector::Kqueue(sel) => sel.add(fd, token, interest),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(sel) => sel.add(fd, token, interest),
            Selector::Select(sel) => sel.add(fd, token, interest),
        }
    }

    pub(crate) fn update(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        match self {
            #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "ios",
                target_os = "macos",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            Selector::Kqueue(sel) => sel.update(fd, token, interest),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(sel) => sel.update(fd, token, interest),
            Selector::Select(sel) => sel.update(fd, token, interest),
        }
    }

    pub(crate) fn remove(&mut self, fd: Fd) -> io::Result<()> {
        match self {
            #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "ios",
                target_os = "macos",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            Selector::Kqueue(sel) => sel.remove(fd),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(sel) => sel.remove(fd),
            Selector::Select(sel) => sel.remove(fd),
        }
    }

    pub(crate) fn select(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        match self {
            #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "ios",
                target_os = "macos",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            Selector::Kqueue(sel) => sel.select(events, timeout),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(sel) => sel.select(events, timeout),
            Selector::Select(sel) => sel.select(events, timeout),
        }
    }
}
