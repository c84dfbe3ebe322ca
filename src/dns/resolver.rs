//! Stub resolver engine: DNS over UDP, driven by the main poll loop.
//!
//! The engine owns one nonblocking UDP socket. The reactor registers its
//! descriptor with the poll backend (read interest, forced past the normal
//! socket mask computation) and routes readiness back here. Retransmission
//! deadlines are checked from the engine's poll step at every loop tick,
//! which the tick cap bounds to the same granularity the original engine's
//! timer gave it.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;

use super::wire::{self, RData};
use super::{Completion, DnsRecord, QueryKind};
use crate::sys::Fd;

const MAX_NAMESERVERS: usize = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ATTEMPTS: u32 = 2;
const MAX_PACKET: usize = 2048;

#[derive(Debug)]
pub(crate) struct ResolvConf {
    pub(crate) servers: Vec<SocketAddr>,
    pub(crate) timeout: Duration,
    pub(crate) attempts: u32,
}

pub(crate) fn parse_resolv_conf(path: &Path) -> io::Result<ResolvConf> {
    let contents = std::fs::read_to_string(path)?;
    let mut conf = ResolvConf {
        servers: Vec::new(),
        timeout: DEFAULT_TIMEOUT,
        attempts: DEFAULT_ATTEMPTS,
    };
    for line in contents.lines() {
        let line = line
            .split(|c| c == '#' || c == ';')
            .next()
            .unwrap_or("")
            .trim();
        let mut words = line.split_whitespace();
        match words.next() {
            Some("nameserver") => {
                if conf.servers.len() >= MAX_NAMESERVERS {
                    continue;
                }
                if let Some(ip) = words.next().and_then(|word| {
                    // Scoped link-local entries (fe80::1%eth0) are skipped.
                    word.parse::<IpAddr>().ok()
                }) {
                    conf.servers.push(SocketAddr::new(ip, 53));
                }
            }
            Some("options") => {
                for option in words {
                    if let Some(value) = option.strip_prefix("timeout:") {
                        if let Ok(secs) = value.parse::<u64>() {
                            conf.timeout = Duration::from_secs(secs.clamp(1, 30));
                        }
                    } else if let Some(value) = option.strip_prefix("attempts:") {
                        if let Ok(n) = value.parse::<u32>() {
                            conf.attempts = n.clamp(1, 5);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(conf)
}

struct Txn {
    query: usize,
    attempt: u32,
    server: usize,
    deadline: Instant,
    packet: Vec<u8>,
    qtype: u16,
}

struct Pending {
    gen: u32,
    parts_left: u8,
    records: Vec<DnsRecord>,
    error: Option<String>,
}

pub(crate) struct ResolverEngine {
    socket: UdpSocket,
    servers: Vec<SocketAddr>,
    timeout: Duration,
    attempts: u32,
    txns: HashMap<u16, Txn>,
    pending: HashMap<usize, Pending>,
    ready: Vec<Completion>,
}

impl ResolverEngine {
    pub(crate) fn new() -> io::Result<ResolverEngine> {
        let conf = parse_resolv_conf(Path::new("/etc/resolv.conf"))?;
        ResolverEngine::with_conf(conf)
    }

    pub(crate) fn with_conf(conf: ResolvConf) -> io::Result<ResolverEngine> {
        if conf.servers.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no usable nameservers",
            ));
        }
        // One transport socket; its family follows the first nameserver.
        let socket = if conf.servers[0].is_ipv4() {
            UdpSocket::bind("0.0.0.0:0")?
        } else {
            UdpSocket::bind("[::]:0")?
        };
        socket.set_nonblocking(true)?;
        let servers = conf
            .servers
            .iter()
            .filter(|server| server.is_ipv4() == conf.servers[0].is_ipv4())
            .copied()
            .collect();
        Ok(ResolverEngine {
            socket,
            servers,
            timeout: conf.timeout,
            attempts: conf.attempts,
            txns: HashMap::new(),
            pending: HashMap::new(),
            ready: Vec::new(),
        })
    }

    pub(crate) fn transport_fd(&self) -> Fd {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            self.socket.as_raw_fd()
        }
        #[cfg(windows)]
        {
            use std::os::windows::io::AsRawSocket;
            self.socket.as_raw_socket() as Fd
        }
    }

    fn fresh_id(&self) -> u16 {
        let mut rng = rand::thread_rng();
        loop {
            let id: u16 = rng.gen();
            if !self.txns.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn add(&mut self, query: usize, gen: u32, kind: &QueryKind) {
        let questions: Vec<(String, u16)> = match kind {
            QueryKind::Forward { host, records } => {
                let mut questions = Vec::new();
                if records.contains_a() {
                    questions.push((host.clone(), wire::QTYPE_A));
                }
                if records.contains_aaaa() {
                    questions.push((host.clone(), wire::QTYPE_AAAA));
                }
                questions
            }
            QueryKind::Reverse { addr } => {
                vec![(wire::reverse_name(addr), wire::QTYPE_PTR)]
            }
        };

        self.pending.insert(
            query,
            Pending {
                gen,
                parts_left: questions.len() as u8,
                records: Vec::new(),
                error: None,
            },
        );

        let now = Instant::now();
        for (name, qtype) in questions {
            let id = self.fresh_id();
            match wire::encode_query(id, &name, qtype) {
                Ok(packet) => {
                    let txn = Txn {
                        query,
                        attempt: 0,
                        server: 0,
                        deadline: now + self.timeout,
                        packet,
                        qtype,
                    };
                    self.transmit(&txn);
                    self.txns.insert(id, txn);
                }
                Err(err) => self.finish_part(query, Err(err)),
            }
        }
    }

    pub(crate) fn remove(&mut self, query: usize) {
        self.pending.remove(&query);
        self.txns.retain(|_, txn| txn.query != query);
    }

    fn transmit(&self, txn: &Txn) {
        let server = self.servers[txn.server % self.servers.len()];
        if let Err(err) = self.socket.send_to(&txn.packet, server) {
            // The retransmission schedule recovers from a failed send.
            debug!("dns send to {} failed: {}", server, err);
        }
    }

    pub(crate) fn poll(&mut self, now: Instant) -> Vec<Completion> {
        let max_attempts = self.attempts * self.servers.len() as u32;
        let mut expired: Vec<u16> = Vec::new();
        let mut resend: Vec<u16> = Vec::new();
        for (&id, txn) in &mut self.txns {
            if txn.deadline <= now {
                txn.attempt += 1;
                if txn.attempt >= max_attempts {
                    expired.push(id);
                } else {
                    txn.server += 1;
                    txn.deadline = now + self.timeout;
                    resend.push(id);
                }
            }
        }
        for id in expired {
            let txn = self.txns.remove(&id).unwrap();
            self.finish_part(txn.query, Err("query timed out".into()));
        }
        for id in resend {
            if let Some(txn) = self.txns.get(&id) {
                self.transmit(txn);
            }
        }
        std::mem::take(&mut self.ready)
    }

    pub(crate) fn socket_ready(&mut self) -> Vec<Completion> {
        let mut buf = [0u8; MAX_PACKET];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(res) => res,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("dns transport read failed: {}", err);
                    break;
                }
            };
            if !self.servers.iter().any(|server| *server == from) {
                debug!("dropping dns response from unexpected source {}", from);
                continue;
            }
            let response = match wire::parse_response(&buf[..len]) {
                Ok(response) => response,
                Err(err) => {
                    debug!("dropping malformed dns response: {}", err);
                    continue;
                }
            };
            let txn = match self.txns.remove(&response.id) {
                Some(txn) => txn,
                None => continue,
            };
            let outcome = if response.rcode != 0 {
                Err(format!("server returned rcode {}", response.rcode))
            } else {
                let mut records = Vec::new();
                for answer in response.answers {
                    match (txn.qtype, answer.rdata) {
                        (wire::QTYPE_A, RData::A(ip)) => records.push(DnsRecord::V4(ip)),
                        (wire::QTYPE_AAAA, RData::Aaaa(ip)) => records.push(DnsRecord::V6(ip)),
                        (wire::QTYPE_PTR, RData::Name(name)) => {
                            records.push(DnsRecord::Name(name))
                        }
                        _ => {}
                    }
                }
                Ok(records)
            };
            self.finish_part(txn.query, outcome);
        }
        std::mem::take(&mut self.ready)
    }

    fn finish_part(&mut self, query: usize, outcome: Result<Vec<DnsRecord>, String>) {
        let pending = match self.pending.get_mut(&query) {
            Some(pending) => pending,
            None => return,
        };
        match outcome {
            Ok(records) => pending.records.extend(records),
            Err(err) => {
                if pending.error.is_none() {
                    pending.error = Some(err);
                }
            }
        }
        pending.parts_left = pending.parts_left.saturating_sub(1);
        if pending.parts_left > 0 {
            return;
        }
        let pending = self.pending.remove(&query).unwrap();
        let outcome = if !pending.records.is_empty() {
            Ok(pending.records)
        } else {
            Err(pending
                .error
                .unwrap_or_else(|| "no records found".into()))
        };
        self.ready.push(Completion {
            query,
            gen: pending.gen,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_conf(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "muxio-resolv-{}-{:x}",
            std::process::id(),
            rand::thread_rng().gen::<u32>()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_nameservers_and_options() {
        let path = temp_conf(
            "# local config\n\
             nameserver 127.0.0.53\n\
             nameserver 10.0.0.1 # secondary\n\
             search example.net\n\
             options timeout:2 attempts:3\n",
        );
        let conf = parse_resolv_conf(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(conf.servers.len(), 2);
        assert_eq!(conf.servers[0], "127.0.0.53:53".parse().unwrap());
        assert_eq!(conf.timeout, Duration::from_secs(2));
        assert_eq!(conf.attempts, 3);
    }

    #[test]
    fn empty_config_fails_engine_probe() {
        let conf = ResolvConf {
            servers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
        };
        assert!(ResolverEngine::with_conf(conf).is_err());
    }

    #[test]
    fn local_server_round_trip() {
        // Stand up a fake nameserver on loopback and answer one A query.
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let conf = ResolvConf {
            servers: vec![server.local_addr().unwrap()],
            timeout: Duration::from_secs(2),
            attempts: 1,
        };
        let mut engine = ResolverEngine::with_conf(conf).unwrap();
        engine.add(
            9,
            2,
            &QueryKind::Forward {
                host: "echo.test".into(),
                records: crate::dns::RecordSet::A,
            },
        );

        let mut buf = [0u8; 512];
        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let (len, from) = server.recv_from(&mut buf).unwrap();
        let mut reply = buf[..len].to_vec();
        reply[2] = 0x81; // response, RD
        reply[3] = 0x80; // RA, rcode 0
        reply[7] = 1; // ANCOUNT
        reply.extend_from_slice(&[0xc0, 0x0c]);
        reply.extend_from_slice(&wire::QTYPE_A.to_be_bytes());
        reply.extend_from_slice(&1u16.to_be_bytes());
        reply.extend_from_slice(&30u32.to_be_bytes());
        reply.extend_from_slice(&4u16.to_be_bytes());
        reply.extend_from_slice(&[192, 0, 2, 7]);
        server.send_to(&reply, from).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let completions = loop {
            let completions = engine.socket_ready();
            if !completions.is_empty() {
                break completions;
            }
            assert!(Instant::now() < deadline, "no response processed");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(completions[0].query, 9);
        assert_eq!(
            completions[0].outcome.as_ref().unwrap(),
            &vec![DnsRecord::V4(std::net::Ipv4Addr::new(192, 0, 2, 7))]
        );
    }

    #[test]
    fn timeouts_surface_as_errors() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let conf = ResolvConf {
            servers: vec![server.local_addr().unwrap()],
            timeout: Duration::from_millis(10),
            attempts: 1,
        };
        let mut engine = ResolverEngine::with_conf(conf).unwrap();
        engine.add(
            1,
            1,
            &QueryKind::Forward {
                host: "never.answers.test".into(),
                records: crate::dns::RecordSet::A,
            },
        );
        let completions = engine.poll(Instant::now() + Duration::from_secs(1));
        assert_eq!(completions.len(), 1);
        assert!(completions[0].outcome.is_err());
    }
}
