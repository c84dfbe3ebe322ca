use std::io;
use std::mem;
use std::time::{Duration, Instant};

use log::debug;

use crate::interest::Interest;
use crate::sys::{EventData, Events};
use crate::token::Token;

use super::Fd;

#[derive(Debug)]
struct Registration {
    fd: Fd,
    token: Token,
    interest: Interest,
}

/// Portable `select(2)` backend.
///
/// There is no kernel-side registration; the fd sets are rebuilt from the
/// registration table on every wait. `select` rounds timeouts to scheduler
/// granularity, so the backend learns the average overshoot and subtracts it
/// from future timeouts, keeping periodic timers close to nominal.
#[derive(Debug)]
pub(crate) struct Selector {
    registrations: Vec<Registration>,
    /// Moving average of how much a timed-out wait overshot, in
    /// microseconds.
    delay_fix: i64,
}

impl Selector {
    pub(crate) fn new() -> io::Result<Selector> {
        Ok(Selector {
            registrations: Vec::new(),
            delay_fix: 0,
        })
    }

    pub(crate) fn add(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        if fd as usize >= libc::FD_SETSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd exceeds FD_SETSIZE",
            ));
        }
        self.registrations.retain(|reg| reg.fd != fd);
        self.registrations.push(Registration {
            fd,
            token,
            interest,
        });
        Ok(())
    }

    pub(crate) fn update(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        match self.registrations.iter_mut().find(|reg| reg.fd == fd) {
            Some(reg) => {
                reg.token = token;
                reg.interest = interest;
                Ok(())
            }
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    pub(crate) fn remove(&mut self, fd: Fd) -> io::Result<()> {
        let before = self.registrations.len();
        self.registrations.retain(|reg| reg.fd != fd);
        if self.registrations.len() == before {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(())
    }

    pub(crate) fn select(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        // Apply the learned overshoot to the requested timeout.
        let adjusted = timeout.map(|to| {
            let us = to.as_micros().min(i64::MAX as u128) as i64 - self.delay_fix;
            Duration::from_micros(us.max(0) as u64)
        });

        // With nothing registered there is no point entering select; sleep
        // the timeout out instead.
        if self.registrations.is_empty() {
            let to = adjusted.unwrap_or(Duration::from_millis(10));
            let ts = libc::timespec {
                tv_sec: to.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
                tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
            };
            let _ = unsafe { libc::nanosleep(&ts, std::ptr::null_mut()) };
            return Ok(());
        }

        let mut read_fds: libc::fd_set = unsafe { mem::zeroed() };
        let mut write_fds: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_fds);
            libc::FD_ZERO(&mut write_fds);
        }
        let mut max_fd: Fd = 0;
        for reg in &self.registrations {
            if reg.interest.is_readable() {
                unsafe { libc::FD_SET(reg.fd, &mut read_fds) };
            }
            if reg.interest.is_writable() {
                unsafe { libc::FD_SET(reg.fd, &mut write_fds) };
            }
            if reg.fd > max_fd {
                max_fd = reg.fd;
            }
        }

        let mut tv = adjusted.map(|to| libc::timeval {
            tv_sec: to.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_usec: libc::suseconds_t::from(to.subsec_micros() as i32),
        });
        let tv_ptr = tv
            .as_mut()
            .map(|tv| tv as *mut libc::timeval)
            .unwrap_or(std::ptr::null_mut());

        let start = Instant::now();
        let n_ready = syscall!(select(
            max_fd + 1,
            &mut read_fds,
            &mut write_fds,
            std::ptr::null_mut(),
            tv_ptr,
        ))?;

        // Learn the overshoot only from waits that actually timed out.
        if n_ready == 0 {
            if let Some(adjusted) = adjusted {
                let elapsed = start.elapsed();
                let overshoot = elapsed.as_micros().min(i64::MAX as u128) as i64
                    - adjusted.as_micros().min(i64::MAX as u128) as i64;
                if overshoot.abs() < 100_000 {
                    let old = self.delay_fix;
                    self.delay_fix = (self.delay_fix * 19 + overshoot) / 20;
                    if (self.delay_fix - old).abs() > 100 {
                        debug!("select timer delay fix set to {} us", self.delay_fix);
                    }
                }
            }
            return Ok(());
        }

        for reg in &self.registrations {
            let readable = unsafe { libc::FD_ISSET(reg.fd, &read_fds) };
            let writable = unsafe { libc::FD_ISSET(reg.fd, &write_fds) };
            if readable || writable {
                events.push(EventData {
                    token: reg.token,
                    readable,
                    writable,
                });
            }
        }
        Ok(())
    }
}
