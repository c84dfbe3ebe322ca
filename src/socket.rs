//! Internal socket state.
//!
//! The C-style packed flag word this design started from collapses into a
//! lifecycle [`Stage`] plus a handful of orthogonal booleans; address
//! selection, the line scanner and the poll-interest computation live here,
//! the reactor drives the transitions.

use std::cell::RefCell;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::rc::Rc;

use rand::Rng;

use crate::buffer::Buffer;
use crate::event::Status;
use crate::interest::Interest;
use crate::reactor::BoxedSocketCallback;
use crate::sys::Fd;
use crate::tls;

/// Line framing supports up to this many delimiter bytes.
pub const MAX_DELIMITERS: usize = 5;

/// Hard cap on a parsed line; longer runs are emitted truncated and the
/// rest of the line is discarded up to the next delimiter.
pub(crate) const LINE_LIMIT: usize = 1024;

/// Address families a connect or listen may use.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Family {
    V4,
    V6,
    #[default]
    Both,
}

impl Family {
    pub(crate) fn allows_v4(self) -> bool {
        matches!(self, Family::V4 | Family::Both)
    }

    pub(crate) fn allows_v6(self) -> bool {
        matches!(self, Family::V6 | Family::Both)
    }
}

/// Options for an outgoing connection.
#[derive(Default)]
pub struct Connect {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) bind: Option<String>,
    pub(crate) family: Family,
    pub(crate) tls: Option<tls::TlsClientOptions>,
}

impl Connect {
    pub fn new(host: impl Into<String>, port: u16) -> Connect {
        Connect {
            host: host.into(),
            port,
            ..Connect::default()
        }
    }

    /// Local address (literal or hostname) to bind before connecting.
    pub fn bind(mut self, host: impl Into<String>) -> Connect {
        self.bind = Some(host.into());
        self
    }

    /// Restricts the connect to one address family.
    pub fn families(mut self, family: Family) -> Connect {
        self.family = family;
        self
    }

    /// Starts a TLS handshake once the TCP connect completes.
    pub fn tls(mut self, options: tls::TlsClientOptions) -> Connect {
        self.tls = Some(options);
        self
    }
}

/// Options for a listening socket.
#[derive(Default)]
pub struct Listen {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) family: Family,
    pub(crate) tls: Option<(PathBuf, PathBuf)>,
}

impl Listen {
    pub fn new(host: impl Into<String>, port: u16) -> Listen {
        Listen {
            host: host.into(),
            port,
            ..Listen::default()
        }
    }

    pub fn families(mut self, family: Family) -> Listen {
        self.family = family;
        self
    }

    /// Serves TLS with the given PEM certificate chain and private key;
    /// accepted connections handshake before they are announced.
    pub fn tls(mut self, certfile: impl Into<PathBuf>, keyfile: impl Into<PathBuf>) -> Listen {
        self.tls = Some((certfile.into(), keyfile.into()));
        self
    }
}

/// Receive-side framing of a socket.
#[derive(Clone, Debug)]
pub(crate) enum Framing {
    Raw,
    Lines {
        delimiters: [u8; MAX_DELIMITERS],
        count: u8,
        parse_empty: bool,
    },
}

impl Framing {
    pub(crate) fn lines(delimiters: &[u8], parse_empty: bool) -> Option<Framing> {
        if delimiters.is_empty() || delimiters.len() > MAX_DELIMITERS {
            return None;
        }
        let mut bytes = [0u8; MAX_DELIMITERS];
        bytes[..delimiters.len()].copy_from_slice(delimiters);
        Some(Framing::Lines {
            delimiters: bytes,
            count: delimiters.len() as u8,
            parse_empty,
        })
    }
}

/// Lifecycle stage of an internal socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Waiting for bind/destination resolution; there is no descriptor yet.
    Lookup,
    /// `connect` issued, waiting for writable readiness.
    Connecting,
    /// TCP established, TLS handshake in flight.
    TlsHandshake,
    Listening,
    Connected,
    /// Torn down; the slot is a tombstone until collected.
    Closed,
}

/// One side (bind or destination) of address resolution.
#[derive(Debug, Default)]
pub(crate) struct LookupSide {
    /// Participates in selection at all (a connect without a bind host has
    /// an absent bind side).
    pub(crate) present: bool,
    /// Hostname when resolution went through DNS, for error messages.
    pub(crate) host: Option<String>,
    /// Outstanding query in the registry.
    pub(crate) pending: Option<usize>,
    pub(crate) results: Vec<IpAddr>,
}

impl LookupSide {
    pub(crate) fn absent() -> LookupSide {
        LookupSide::default()
    }

    pub(crate) fn literal(addr: IpAddr) -> LookupSide {
        LookupSide {
            present: true,
            host: None,
            pending: None,
            results: vec![addr],
        }
    }

    pub(crate) fn resolving(host: String, query: usize) -> LookupSide {
        LookupSide {
            present: true,
            host: Some(host),
            pending: Some(query),
            results: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LookupState {
    pub(crate) bind: LookupSide,
    pub(crate) dest: LookupSide,
    pub(crate) family: Family,
}

impl LookupState {
    pub(crate) fn finished(&self) -> bool {
        self.bind.pending.is_none() && self.dest.pending.is_none()
    }
}

/// The outcome of address selection.
#[derive(Debug, PartialEq)]
pub(crate) struct Selection {
    pub(crate) bind: Option<IpAddr>,
    pub(crate) dest: Option<IpAddr>,
    pub(crate) ipv6: bool,
    /// Both families were jointly available; a failed v6 connect retries
    /// over v4 once.
    pub(crate) fallback_v4: bool,
}

fn count_family(side: &LookupSide, family: Family) -> (usize, usize) {
    let v4 = side
        .results
        .iter()
        .filter(|ip| ip.is_ipv4() && family.allows_v4())
        .count();
    let v6 = side
        .results
        .iter()
        .filter(|ip| ip.is_ipv6() && family.allows_v6())
        .count();
    (v4, v6)
}

fn pick(side: &LookupSide, want_v6: bool) -> Option<IpAddr> {
    let candidates: Vec<IpAddr> = side
        .results
        .iter()
        .filter(|ip| ip.is_ipv6() == want_v6)
        .copied()
        .collect();
    if candidates.is_empty() {
        None
    } else {
        // One address, uniformly at random, out of the usable family.
        Some(candidates[rand::thread_rng().gen_range(0..candidates.len())])
    }
}

/// Picks the IP family usable by both sides (IPv6 preferred, arming the v4
/// fallback when both are jointly available) and one address per side.
pub(crate) fn select_addresses(lookup: &LookupState, no_v6: bool) -> Result<Selection, String> {
    let (bind_v4, bind_v6) = count_family(&lookup.bind, lookup.family);
    let (dest_v4, dest_v6) = count_family(&lookup.dest, lookup.family);

    if lookup.bind.present && bind_v4 == 0 && bind_v6 == 0 {
        let host = lookup.bind.host.as_deref().unwrap_or("?");
        return Err(format!("could not resolve bind address ({})", host));
    }
    if lookup.dest.present && dest_v4 == 0 && dest_v6 == 0 {
        let host = lookup.dest.host.as_deref().unwrap_or("?");
        return Err(format!("could not resolve destination address ({})", host));
    }

    let (use_v4, use_v6) = if lookup.bind.present && lookup.dest.present {
        (bind_v4 > 0 && dest_v4 > 0, bind_v6 > 0 && dest_v6 > 0)
    } else if lookup.bind.present {
        (bind_v4 > 0, bind_v6 > 0)
    } else {
        (dest_v4 > 0, dest_v6 > 0)
    };

    let (ipv6, fallback_v4) = if use_v6 && !no_v6 {
        (true, use_v4)
    } else if use_v4 {
        (false, false)
    } else {
        return Err(format!(
            "no jointly usable address family (bind: {} v4, {} v6 | dest: {} v4, {} v6)",
            bind_v4, bind_v6, dest_v4, dest_v6
        ));
    };

    Ok(Selection {
        bind: if lookup.bind.present {
            pick(&lookup.bind, ipv6)
        } else {
            None
        },
        dest: if lookup.dest.present {
            pick(&lookup.dest, ipv6)
        } else {
            None
        },
        ipv6,
        fallback_v4,
    })
}

pub(crate) struct SocketEntry {
    pub(crate) gen: u32,
    pub(crate) fd: Option<Fd>,
    pub(crate) stage: Stage,
    /// Transport descriptor owned by the DNS engine; readiness bypasses the
    /// state machine and the interest mask is forced to reads.
    pub(crate) dns_owned: bool,
    pub(crate) incoming: bool,
    pub(crate) ipv6: bool,
    pub(crate) reconnect_v4: bool,
    /// Close requested, draining writes.
    pub(crate) shutdown: bool,
    /// Irrecoverable; torn down after the current dispatch.
    pub(crate) dead: bool,
    /// Registered with the poll backend.
    pub(crate) active: bool,
    pub(crate) port: u16,
    pub(crate) lookup: Option<Box<LookupState>>,
    pub(crate) local: Option<SocketAddr>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) readbuf: Buffer,
    pub(crate) writebuf: Buffer,
    pub(crate) tls: Option<tls::TlsIo>,
    pub(crate) tls_client: Option<tls::ClientSetup>,
    pub(crate) tls_creds: Option<tls::ServerCreds>,
    pub(crate) status: Status,
    pub(crate) framing: Framing,
    /// Line scanner is discarding an oversized line up to the next
    /// delimiter.
    pub(crate) skipping: bool,
    pub(crate) callback: Option<Rc<RefCell<BoxedSocketCallback>>>,
    /// Bytes the callback asked to keep unconsumed from the current raw
    /// dispatch.
    pub(crate) retain: Option<usize>,
    /// For accepted sockets: the listener whose callback announces them.
    pub(crate) accept_parent: Option<crate::Socket>,
}

impl SocketEntry {
    pub(crate) fn new(gen: u32) -> SocketEntry {
        SocketEntry {
            gen,
            fd: None,
            stage: Stage::Lookup,
            dns_owned: false,
            incoming: false,
            ipv6: false,
            reconnect_v4: false,
            shutdown: false,
            dead: false,
            active: false,
            port: 0,
            lookup: None,
            local: None,
            peer: None,
            readbuf: Buffer::new(),
            writebuf: Buffer::new(),
            tls: None,
            tls_client: None,
            tls_creds: None,
            status: Status::Connecting,
            framing: Framing::Raw,
            skipping: false,
            callback: None,
            retain: None,
            accept_parent: None,
        }
    }

    /// The poll-interest mask for the current state.
    pub(crate) fn interest(&self) -> Interest {
        if self.dns_owned {
            return Interest::READABLE;
        }
        match self.stage {
            Stage::Listening => Interest::READABLE,
            // Writable readiness signals connect completion; readable
            // readiness signals failure.
            Stage::Connecting => Interest::READABLE | Interest::WRITABLE,
            Stage::TlsHandshake => match &self.tls {
                Some(tls) if tls.wants_write() => Interest::WRITABLE,
                _ => Interest::READABLE,
            },
            _ => {
                if let Some(tls) = &self.tls {
                    // Post-handshake traffic wants exactly one direction.
                    if tls.mid_handshake() {
                        return if tls.wants_write() {
                            Interest::WRITABLE
                        } else {
                            Interest::READABLE
                        };
                    }
                }
                let mut interest = Interest::READABLE;
                let tls_write = self.tls.as_ref().map_or(false, |tls| tls.wants_write());
                if !self.writebuf.is_empty() || tls_write {
                    interest = interest | Interest::WRITABLE;
                }
                interest
            }
        }
    }

    pub(crate) fn delimiters(&self) -> Option<(&[u8], bool)> {
        match &self.framing {
            Framing::Raw => None,
            Framing::Lines {
                delimiters,
                count,
                parse_empty,
            } => Some((&delimiters[..*count as usize], *parse_empty)),
        }
    }
}

/// Incremental delimiter scan over the read buffer.
///
/// Matches any configured delimiter byte, emits the segment before it and
/// skips the delimiter itself. Oversized segments are emitted truncated at
/// [`LINE_LIMIT`] and the remainder of that line is discarded (`skipping`
/// persists across reads). Returns segment bounds; `consumed()` reports how
/// far the buffer can be compacted afterwards.
pub(crate) struct LineScanner<'a> {
    buf: &'a [u8],
    delimiters: &'a [u8],
    parse_empty: bool,
    pos: usize,
    skipping: bool,
}

impl<'a> LineScanner<'a> {
    pub(crate) fn new(
        buf: &'a [u8],
        delimiters: &'a [u8],
        parse_empty: bool,
        skipping: bool,
    ) -> LineScanner<'a> {
        LineScanner {
            buf,
            delimiters,
            parse_empty,
            pos: 0,
            skipping,
        }
    }

    pub(crate) fn next_segment(&mut self) -> Option<(usize, usize)> {
        loop {
            if self.skipping {
                match self.find_delimiter(self.pos) {
                    Some(at) => {
                        self.pos = at + 1;
                        self.skipping = false;
                    }
                    None => {
                        self.pos = self.buf.len();
                        return None;
                    }
                }
            }
            let start = self.pos;
            let mut i = start;
            while i < self.buf.len() {
                if self.delimiters.contains(&self.buf[i]) {
                    self.pos = i + 1;
                    if i > start || self.parse_empty {
                        return Some((start, i));
                    }
                    break;
                }
                if i - start + 1 >= LINE_LIMIT {
                    self.pos = start + LINE_LIMIT;
                    self.skipping = true;
                    return Some((start, start + LINE_LIMIT));
                }
                i += 1;
            }
            if i >= self.buf.len() {
                return None;
            }
        }
    }

    fn find_delimiter(&self, from: usize) -> Option<usize> {
        self.buf[from..]
            .iter()
            .position(|byte| self.delimiters.contains(byte))
            .map(|at| from + at)
    }

    /// How many leading bytes the scan used up.
    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }

    pub(crate) fn still_skipping(&self) -> bool {
        self.skipping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(buf: &[u8], delims: &[u8], parse_empty: bool) -> (Vec<Vec<u8>>, usize, bool) {
        let mut scanner = LineScanner::new(buf, delims, parse_empty, false);
        let mut segments = Vec::new();
        while let Some((start, end)) = scanner.next_segment() {
            segments.push(buf[start..end].to_vec());
        }
        (segments, scanner.consumed(), scanner.still_skipping())
    }

    #[test]
    fn splits_on_any_delimiter() {
        let (segments, consumed, _) = scan_all(b"one\ntwo\rthree\n", b"\r\n", false);
        assert_eq!(segments, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(consumed, 14);
    }

    #[test]
    fn keeps_partial_tail() {
        let (segments, consumed, _) = scan_all(b"done\npart", b"\n", false);
        assert_eq!(segments, vec![b"done".to_vec()]);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn empty_segments_suppressed_by_default() {
        let (segments, consumed, _) = scan_all(b"a\n\n\nb\n", b"\n", false);
        assert_eq!(segments, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(consumed, 6);
    }

    #[test]
    fn empty_segments_delivered_on_request() {
        let (segments, _, _) = scan_all(b"a\n\nb\n", b"\n", true);
        assert_eq!(segments, vec![b"a".to_vec(), b"".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn crlf_counts_as_empty_segment() {
        // "\r\n" with both delimiters configured: the empty segment between
        // them is suppressed unless asked for.
        let (segments, _, _) = scan_all(b"line\r\nnext\r\n", b"\r\n", false);
        assert_eq!(segments, vec![b"line".to_vec(), b"next".to_vec()]);
    }

    #[test]
    fn oversized_line_is_truncated_and_skipped() {
        let mut buf = vec![b'x'; LINE_LIMIT + 100];
        buf.extend_from_slice(b"\nrest\n");
        let (segments, consumed, skipping) = scan_all(&buf, b"\n", false);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), LINE_LIMIT);
        assert_eq!(segments[1], b"rest".to_vec());
        assert_eq!(consumed, buf.len());
        assert!(!skipping);
    }

    #[test]
    fn skip_state_persists_across_reads() {
        let buf = vec![b'x'; LINE_LIMIT + 10];
        let (segments, consumed, skipping) = scan_all(&buf, b"\n", false);
        assert_eq!(segments.len(), 1);
        assert_eq!(consumed, buf.len());
        assert!(skipping);

        // Next read starts mid-discard; everything to the delimiter goes.
        let mut scanner = LineScanner::new(b"tail\nok\n", b"\n", false, true);
        let (start, end) = scanner.next_segment().unwrap();
        assert_eq!(&b"tail\nok\n"[start..end], b"ok");
        assert!(scanner.next_segment().is_none());
    }

    #[test]
    fn family_selection_prefers_v6_and_arms_fallback() {
        let lookup = LookupState {
            bind: LookupSide::absent(),
            dest: LookupSide {
                present: true,
                host: Some("dual.example".into()),
                pending: None,
                results: vec!["2001:db8::1".parse().unwrap(), "192.0.2.1".parse().unwrap()],
            },
            family: Family::Both,
        };
        let selection = select_addresses(&lookup, false).unwrap();
        assert!(selection.ipv6);
        assert!(selection.fallback_v4);
        assert_eq!(selection.dest, Some("2001:db8::1".parse().unwrap()));

        // The fallback pass is forced onto v4.
        let retry = select_addresses(&lookup, true).unwrap();
        assert!(!retry.ipv6);
        assert!(!retry.fallback_v4);
        assert_eq!(retry.dest, Some("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn family_mask_restricts_selection() {
        let lookup = LookupState {
            bind: LookupSide::absent(),
            dest: LookupSide {
                present: true,
                host: None,
                pending: None,
                results: vec!["2001:db8::1".parse().unwrap(), "192.0.2.1".parse().unwrap()],
            },
            family: Family::V4,
        };
        let selection = select_addresses(&lookup, false).unwrap();
        assert!(!selection.ipv6);
        assert!(!selection.fallback_v4);
    }

    #[test]
    fn mismatched_families_report_counts() {
        let lookup = LookupState {
            bind: LookupSide {
                present: true,
                host: Some("bind.example".into()),
                pending: None,
                results: vec!["192.0.2.1".parse().unwrap(), "192.0.2.2".parse().unwrap()],
            },
            dest: LookupSide {
                present: true,
                host: Some("dest.example".into()),
                pending: None,
                results: vec![
                    "2001:db8::1".parse().unwrap(),
                    "2001:db8::2".parse().unwrap(),
                    "2001:db8::3".parse().unwrap(),
                ],
            },
            family: Family::Both,
        };
        let err = select_addresses(&lookup, false).unwrap_err();
        assert_eq!(
            err,
            "no jointly usable address family (bind: 2 v4, 0 v6 | dest: 0 v4, 3 v6)"
        );
    }

    #[test]
    fn empty_side_reports_its_hostname() {
        let lookup = LookupState {
            bind: LookupSide::absent(),
            dest: LookupSide {
                present: true,
                host: Some("gone.example".into()),
                pending: None,
                results: Vec::new(),
            },
            family: Family::Both,
        };
        let err = select_addresses(&lookup, false).unwrap_err();
        assert_eq!(err, "could not resolve destination address (gone.example)");
    }
}
