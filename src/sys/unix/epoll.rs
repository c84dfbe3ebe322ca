use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT};

use crate::interest::Interest;
use crate::sys::{EventData, Events};
use crate::token::Token;

use super::Fd;

const MAX_EVENTS: usize = 32;

#[derive(Debug)]
pub(crate) struct Selector {
    ep: OwnedFd,
}

impl Selector {
    pub(crate) fn new(size_hint: usize) -> io::Result<Selector> {
        // The sizing hint is meaningless since Linux 2.6.8, `epoll_create1`
        // only takes flags.
        let _ = size_hint;
        // SAFETY: `epoll_create1(2)` ensures the fd is valid.
        let ep = unsafe { OwnedFd::from_raw_fd(syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?) };
        Ok(Selector { ep })
    }

    pub(crate) fn add(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)
    }

    pub(crate) fn update(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)
    }

    pub(crate) fn remove(&mut self, fd: Fd) -> io::Result<()> {
        let ep = self.ep.as_raw_fd();
        syscall!(epoll_ctl(ep, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())).map(|_| ())
    }

    fn ctl(&self, op: libc::c_int, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: usize::from(token) as u64,
        };
        let ep = self.ep.as_raw_fd();
        syscall!(epoll_ctl(ep, op, fd, &mut event)).map(|_| ())
    }

    pub(crate) fn select(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        // `Duration::as_millis` truncates; round up so sub-millisecond
        // timeouts don't spin.
        let timeout = timeout
            .map(|to| {
                to.checked_add(Duration::from_nanos(999_999))
                    .unwrap_or(to)
                    .as_millis()
                    .min(libc::c_int::MAX as u128) as libc::c_int
            })
            .unwrap_or(-1);

        let mut raw: [MaybeUninit<libc::epoll_event>; MAX_EVENTS] =
            unsafe { MaybeUninit::uninit().assume_init() };
        let n_events = syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            raw.as_mut_ptr() as *mut libc::epoll_event,
            MAX_EVENTS as libc::c_int,
            timeout,
        ))?;

        events.clear();
        for event in raw.iter().take(n_events as usize) {
            // SAFETY: `epoll_wait` initialized the first `n_events` entries.
            let event = unsafe { event.assume_init() };
            let bits = event.events as libc::c_int;
            events.push(EventData {
                token: Token(event.u64 as usize),
                readable: bits & (EPOLLIN | EPOLLHUP | EPOLLERR) != 0,
                writable: bits & EPOLLOUT != 0,
            });
        }
        Ok(())
    }
}

fn interest_to_epoll(interest: Interest) -> u32 {
    let mut kind = EPOLLHUP;
    if interest.is_readable() {
        kind |= EPOLLIN;
    }
    if interest.is_writable() {
        kind |= EPOLLOUT;
    }
    kind as u32
}
