use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;
use std::time::Duration;

use crate::interest::Interest;
use crate::sys::{EventData, Events};
use crate::token::Token;

use super::Fd;

const MAX_EVENTS: usize = 32;

// Type of the `nchanges` and `nevents` parameters in the `kevent` function.
#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

// Type of the `filter` field in the `kevent` structure.
#[cfg(any(target_os = "dragonfly", target_os = "freebsd", target_os = "openbsd"))]
type Filter = libc::c_short;
#[cfg(any(target_os = "macos", target_os = "ios"))]
type Filter = i16;
#[cfg(target_os = "netbsd")]
type Filter = u32;

// Type of the `flags` field in the `kevent` structure.
#[cfg(any(target_os = "dragonfly", target_os = "freebsd", target_os = "openbsd"))]
type Flags = libc::c_ushort;
#[cfg(any(target_os = "macos", target_os = "ios"))]
type Flags = u16;
#[cfg(target_os = "netbsd")]
type Flags = u32;

// Type of the `udata` field in the `kevent` structure.
#[cfg(not(target_os = "netbsd"))]
type UData = *mut libc::c_void;
#[cfg(target_os = "netbsd")]
type UData = libc::intptr_t;

macro_rules! kevent {
    ($id: expr, $filter: expr, $flags: expr, $data: expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as Filter,
            flags: $flags as Flags,
            fflags: 0,
            data: 0,
            udata: $data as UData,
        }
    };
}

#[derive(Debug)]
pub(crate) struct Selector {
    kq: OwnedFd,
}

impl Selector {
    pub(crate) fn new() -> io::Result<Selector> {
        // SAFETY: `kqueue(2)` ensures the fd is valid.
        let kq = unsafe { OwnedFd::from_raw_fd(syscall!(kqueue())?) };
        syscall!(fcntl(kq.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC))?;
        Ok(Selector { kq })
    }

    pub(crate) fn add(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        self.update(fd, token, interest)
    }

    pub(crate) fn update(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        let token = usize::from(token);
        let read_flags = if interest.is_readable() {
            libc::EV_ADD
        } else {
            libc::EV_DELETE
        };
        let write_flags = if interest.is_writable() {
            libc::EV_ADD
        } else {
            libc::EV_DELETE
        };
        let mut changes: [libc::kevent; 2] = [
            kevent!(fd, libc::EVFILT_READ, read_flags | libc::EV_RECEIPT, token),
            kevent!(fd, libc::EVFILT_WRITE, write_flags | libc::EV_RECEIPT, token),
        ];
        self.apply(&mut changes)
    }

    pub(crate) fn remove(&mut self, fd: Fd) -> io::Result<()> {
        let mut changes: [libc::kevent; 2] = [
            kevent!(fd, libc::EVFILT_READ, libc::EV_DELETE | libc::EV_RECEIPT, 0),
            kevent!(fd, libc::EVFILT_WRITE, libc::EV_DELETE | libc::EV_RECEIPT, 0),
        ];
        self.apply(&mut changes)
    }

    /// Applies a changelist, reading back per-change receipts. Removing a
    /// filter that was never added reports `ENOENT`, which is fine: write
    /// interest comes and goes with the write buffer.
    fn apply(&self, changes: &mut [libc::kevent; 2]) -> io::Result<()> {
        let mut out: [MaybeUninit<libc::kevent>; 2] = unsafe { MaybeUninit::uninit().assume_init() };
        let n = syscall!(kevent(
            self.kq.as_raw_fd(),
            changes.as_ptr(),
            changes.len() as Count,
            out.as_mut_ptr() as *mut libc::kevent,
            out.len() as Count,
            ptr::null(),
        ))?;
        for receipt in out.iter().take(n as usize) {
            // SAFETY: `kevent` initialized the first `n` entries.
            let receipt = unsafe { receipt.assume_init() };
            if (receipt.flags & libc::EV_ERROR as Flags) != 0
                && receipt.data != 0
                && receipt.data != libc::ENOENT as _
            {
                return Err(io::Error::from_raw_os_error(receipt.data as i32));
            }
        }
        Ok(())
    }

    pub(crate) fn select(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let timespec = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let timespec_ptr = timespec
            .as_ref()
            .map(|ts| ts as *const libc::timespec)
            .unwrap_or(ptr::null());

        let mut raw: [MaybeUninit<libc::kevent>; MAX_EVENTS] =
            unsafe { MaybeUninit::uninit().assume_init() };
        let n_events = syscall!(kevent(
            self.kq.as_raw_fd(),
            ptr::null(),
            0,
            raw.as_mut_ptr() as *mut libc::kevent,
            MAX_EVENTS as Count,
            timespec_ptr,
        ))?;

        events.clear();
        for event in raw.iter().take(n_events as usize) {
            // SAFETY: `kevent` initialized the first `n_events` entries.
            let event = unsafe { event.assume_init() };
            let eof = (event.flags & libc::EV_EOF as Flags) != 0;
            let (readable, writable) = match event.filter {
                f if f == libc::EVFILT_READ as Filter => (true, false),
                // EV_EOF on the write filter is how a failed or torn-down
                // connection surfaces; route it through the read path too.
                f if f == libc::EVFILT_WRITE as Filter => (eof, true),
                _ => (false, false),
            };
            events.push(EventData {
                token: Token(event.udata as usize),
                readable,
                writable,
            });
        }
        Ok(())
    }
}
