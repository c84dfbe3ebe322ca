//! Default DNS engine: the platform resolver on worker threads.
//!
//! Queries go into a condvar-guarded queue; workers block in
//! `getaddrinfo`/`getnameinfo` and push completions into a list the main
//! loop drains at tick start. The pool scales itself: one more worker
//! (up to ten) whenever the backlog exceeds five queries per worker. If the
//! first worker cannot be spawned at all, queries are resolved synchronously
//! at loop ticks instead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, error, warn};

use super::{Completion, DnsRecord, QueryKind, RecordSet};

const MAX_WORKERS: usize = 10;
const QUERIES_PER_WORKER: usize = 5;

struct Job {
    query: usize,
    gen: u32,
    kind: QueryKind,
}

struct Shared {
    jobs: Mutex<VecDeque<Job>>,
    cond: Condvar,
    done: Mutex<Vec<Completion>>,
    stop: AtomicBool,
}

pub(crate) struct ThreadedEngine {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
    /// No threads available; resolve at loop ticks instead.
    inline: bool,
}

impl ThreadedEngine {
    pub(crate) fn new() -> ThreadedEngine {
        let shared = Arc::new(Shared {
            jobs: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            done: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });
        let mut engine = ThreadedEngine {
            shared,
            workers: Vec::new(),
            inline: false,
        };
        if !engine.spawn_worker() {
            warn!("could not spawn dns worker, resolving at loop ticks");
            engine.inline = true;
        }
        engine
    }

    fn spawn_worker(&mut self) -> bool {
        if self.workers.len() >= MAX_WORKERS {
            return false;
        }
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("muxio-dns".into())
            .spawn(move || worker_main(shared))
        {
            Ok(handle) => {
                self.workers.push(handle);
                true
            }
            Err(err) => {
                error!("could not spawn dns worker: {}", err);
                false
            }
        }
    }

    pub(crate) fn add(&mut self, query: usize, gen: u32, kind: &QueryKind) {
        let backlog = {
            let mut jobs = self.shared.jobs.lock().unwrap();
            jobs.push_back(Job {
                query,
                gen,
                kind: kind.clone(),
            });
            jobs.len()
        };
        if self.inline {
            return;
        }
        self.shared.cond.notify_one();
        if backlog / self.workers.len().max(1) > QUERIES_PER_WORKER {
            if self.spawn_worker() {
                debug!("scaled dns worker pool to {}", self.workers.len());
            }
        }
    }

    pub(crate) fn remove(&mut self, _query: usize) {
        // Cancellation is handled by the caller discarding the completion;
        // a worker may already be resolving the query.
    }

    pub(crate) fn poll(&mut self) -> Vec<Completion> {
        if self.inline {
            let jobs: Vec<Job> = {
                let mut jobs = self.shared.jobs.lock().unwrap();
                jobs.drain(..).collect()
            };
            let mut done = self.shared.done.lock().unwrap();
            for job in jobs {
                done.push(run_job(&job));
            }
        }
        std::mem::take(&mut *self.shared.done.lock().unwrap())
    }

    pub(crate) fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.cond.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadedEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_main(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut jobs = shared.jobs.lock().unwrap();
            loop {
                if shared.stop.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(job) = jobs.pop_front() {
                    break job;
                }
                jobs = shared.cond.wait(jobs).unwrap();
            }
        };
        let completion = run_job(&job);
        shared.done.lock().unwrap().push(completion);
    }
}

fn run_job(job: &Job) -> Completion {
    let outcome = match &job.kind {
        QueryKind::Forward { host, records } => resolve_host(host, *records),
        QueryKind::Reverse { addr } => resolve_addr(addr),
    };
    Completion {
        query: job.query,
        gen: job.gen,
        outcome,
    }
}

#[cfg(unix)]
fn resolve_host(host: &str, records: RecordSet) -> Result<Vec<DnsRecord>, String> {
    use std::ffi::CString;
    use std::mem;
    use std::ptr;

    let c_host =
        CString::new(host).map_err(|_| format!("invalid hostname ({:?})", host))?;
    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = libc::SOCK_STREAM;

    let mut list: *mut libc::addrinfo = ptr::null_mut();
    let ret = unsafe { libc::getaddrinfo(c_host.as_ptr(), ptr::null(), &hints, &mut list) };
    if ret != 0 {
        let msg = unsafe { std::ffi::CStr::from_ptr(libc::gai_strerror(ret)) };
        return Err(format!(
            "could not resolve {} ({})",
            host,
            msg.to_string_lossy()
        ));
    }

    let mut results = Vec::new();
    let mut cur = list;
    while !cur.is_null() {
        let info = unsafe { &*cur };
        match info.ai_family {
            libc::AF_INET if records.contains_a() => {
                let addr = unsafe { &*(info.ai_addr as *const libc::sockaddr_in) };
                let ip = std::net::Ipv4Addr::from(addr.sin_addr.s_addr.to_ne_bytes());
                if !results.contains(&DnsRecord::V4(ip)) {
                    results.push(DnsRecord::V4(ip));
                }
            }
            libc::AF_INET6 if records.contains_aaaa() => {
                let addr = unsafe { &*(info.ai_addr as *const libc::sockaddr_in6) };
                let ip = std::net::Ipv6Addr::from(addr.sin6_addr.s6_addr);
                if !results.contains(&DnsRecord::V6(ip)) {
                    results.push(DnsRecord::V6(ip));
                }
            }
            _ => {}
        }
        cur = info.ai_next;
    }
    unsafe { libc::freeaddrinfo(list) };

    if results.is_empty() {
        Err(format!("no usable records for {}", host))
    } else {
        Ok(results)
    }
}

#[cfg(not(unix))]
fn resolve_host(host: &str, records: RecordSet) -> Result<Vec<DnsRecord>, String> {
    use std::net::ToSocketAddrs;

    let addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|err| format!("could not resolve {} ({})", host, err))?;
    let mut results = Vec::new();
    for addr in addrs {
        match addr.ip() {
            std::net::IpAddr::V4(ip) if records.contains_a() => {
                if !results.contains(&DnsRecord::V4(ip)) {
                    results.push(DnsRecord::V4(ip));
                }
            }
            std::net::IpAddr::V6(ip) if records.contains_aaaa() => {
                if !results.contains(&DnsRecord::V6(ip)) {
                    results.push(DnsRecord::V6(ip));
                }
            }
            _ => {}
        }
    }
    if results.is_empty() {
        Err(format!("no usable records for {}", host))
    } else {
        Ok(results)
    }
}

#[cfg(unix)]
fn resolve_addr(addr: &std::net::IpAddr) -> Result<Vec<DnsRecord>, String> {
    use crate::sys;

    const HOST_BUF: usize = 1025; // NI_MAXHOST

    let sock_addr = std::net::SocketAddr::new(*addr, 0);
    let (raw, len) = sys::socket_addr(&sock_addr);
    let mut host = [0 as libc::c_char; HOST_BUF];
    let ret = unsafe {
        libc::getnameinfo(
            raw.as_ptr(),
            len,
            host.as_mut_ptr(),
            HOST_BUF as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };
    if ret != 0 {
        let msg = unsafe { std::ffi::CStr::from_ptr(libc::gai_strerror(ret)) };
        return Err(format!(
            "could not resolve {} ({})",
            addr,
            msg.to_string_lossy()
        ));
    }
    let name = unsafe { std::ffi::CStr::from_ptr(host.as_ptr()) };
    Ok(vec![DnsRecord::Name(name.to_string_lossy().into_owned())])
}

#[cfg(not(unix))]
fn resolve_addr(addr: &std::net::IpAddr) -> Result<Vec<DnsRecord>, String> {
    Err(format!("reverse lookup for {} is not supported here", addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_as_itself() {
        let records = resolve_host("127.0.0.1", RecordSet::A | RecordSet::AAAA).unwrap();
        assert_eq!(records, vec![DnsRecord::V4(std::net::Ipv4Addr::LOCALHOST)]);
    }

    #[test]
    fn record_mask_filters_families() {
        let records = resolve_host("127.0.0.1", RecordSet::AAAA);
        assert!(records.is_err());
    }

    #[test]
    fn completions_cross_the_pool() {
        let mut engine = ThreadedEngine::new();
        engine.add(
            3,
            7,
            &QueryKind::Forward {
                host: "127.0.0.1".into(),
                records: RecordSet::A,
            },
        );
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            let completions = engine.poll();
            if !completions.is_empty() {
                assert_eq!(completions[0].query, 3);
                assert_eq!(completions[0].gen, 7);
                assert!(completions[0].outcome.is_ok());
                break;
            }
            assert!(std::time::Instant::now() < deadline, "worker never finished");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        engine.stop();
    }
}
