use std::io::{self, Read, Write};
use std::mem::{size_of, MaybeUninit};
use std::net::SocketAddr;

use super::Fd;

/// A `sockaddr_in` / `sockaddr_in6` big enough for either family, passed to
/// the kernel by pointer.
#[repr(C)]
pub(crate) union SocketAddrCRepr {
    v4: libc::sockaddr_in,
    v6: libc::sockaddr_in6,
}

impl SocketAddrCRepr {
    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
        self as *const SocketAddrCRepr as *const libc::sockaddr
    }
}

/// Converts a standard address into its C representation.
pub(crate) fn socket_addr(addr: &SocketAddr) -> (SocketAddrCRepr, libc::socklen_t) {
    match addr {
        SocketAddr::V4(addr) => {
            let sin_addr = libc::in_addr {
                s_addr: u32::from_ne_bytes(addr.ip().octets()),
            };
            let sockaddr_in = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: addr.port().to_be(),
                sin_addr,
                sin_zero: [0; 8],
                #[cfg(any(
                    target_os = "dragonfly",
                    target_os = "freebsd",
                    target_os = "ios",
                    target_os = "macos",
                    target_os = "netbsd",
                    target_os = "openbsd"
                ))]
                sin_len: 0,
            };
            (
                SocketAddrCRepr { v4: sockaddr_in },
                size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        }
        SocketAddr::V6(addr) => {
            let sockaddr_in6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: addr.port().to_be(),
                sin6_addr: libc::in6_addr {
                    s6_addr: addr.ip().octets(),
                },
                sin6_flowinfo: addr.flowinfo(),
                sin6_scope_id: addr.scope_id(),
                #[cfg(any(
                    target_os = "dragonfly",
                    target_os = "freebsd",
                    target_os = "ios",
                    target_os = "macos",
                    target_os = "netbsd",
                    target_os = "openbsd"
                ))]
                sin6_len: 0,
            };
            (
                SocketAddrCRepr { v6: sockaddr_in6 },
                size_of::<libc::sockaddr_in6>() as libc::socklen_t,
            )
        }
    }
}

/// Converts a kernel-filled `sockaddr_storage` back into a standard address.
pub(crate) fn to_socket_addr(storage: &libc::sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let addr: &libc::sockaddr_in =
                unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            let ip = std::net::Ipv4Addr::from(addr.sin_addr.s_addr.to_ne_bytes());
            Ok(SocketAddr::V4(std::net::SocketAddrV4::new(
                ip,
                u16::from_be(addr.sin_port),
            )))
        }
        libc::AF_INET6 => {
            let addr: &libc::sockaddr_in6 =
                unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = std::net::Ipv6Addr::from(addr.sin6_addr.s6_addr);
            Ok(SocketAddr::V6(std::net::SocketAddrV6::new(
                ip,
                u16::from_be(addr.sin6_port),
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }
        _ => Err(io::ErrorKind::InvalidInput.into()),
    }
}

/// Creates a new non-blocking, close-on-exec stream or datagram socket.
pub(crate) fn new_socket(domain: libc::c_int, socket_type: libc::c_int) -> io::Result<Fd> {
    #[cfg(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    let socket_type = socket_type | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;

    let socket = syscall!(socket(domain, socket_type, 0))?;

    // Mimicking `libstd` (and the original fcntl path) on platforms without
    // creation-time flags; also arrange to not get SIGPIPE on writes there.
    #[cfg(any(target_os = "ios", target_os = "macos"))]
    if let Err(err) = prepare_fd(socket).and_then(|()| set_nosigpipe(socket)) {
        let _ = close(socket);
        return Err(err);
    }

    Ok(socket)
}

pub(crate) fn new_tcp_socket(ipv6: bool) -> io::Result<Fd> {
    let domain = if ipv6 { libc::AF_INET6 } else { libc::AF_INET };
    new_socket(domain, libc::SOCK_STREAM)
}

/// Puts an inherited descriptor (e.g. from `accept`) into non-blocking,
/// close-on-exec mode, on platforms without creation-time flags.
#[cfg(any(target_os = "ios", target_os = "macos"))]
fn prepare_fd(fd: Fd) -> io::Result<()> {
    let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
    syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
    let flags = syscall!(fcntl(fd, libc::F_GETFD))?;
    syscall!(fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC))?;
    Ok(())
}

#[cfg(any(target_os = "ios", target_os = "macos"))]
fn set_nosigpipe(fd: Fd) -> io::Result<()> {
    let set: libc::c_int = 1;
    syscall!(setsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_NOSIGPIPE,
        &set as *const _ as *const libc::c_void,
        size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

/// Flips blocking mode; the close path uses this for its final flush.
pub(crate) fn set_nonblocking(fd: Fd, nonblocking: bool) -> io::Result<()> {
    let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    syscall!(fcntl(fd, libc::F_SETFL, flags)).map(|_| ())
}

/// Whether a `connect` error just means "completion pending".
pub(crate) fn connect_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
}

pub(crate) fn connect(fd: Fd, addr: &SocketAddr) -> io::Result<()> {
    let (raw, len) = socket_addr(addr);
    syscall!(connect(fd, raw.as_ptr(), len)).map(|_| ())
}

pub(crate) fn bind(fd: Fd, addr: &SocketAddr) -> io::Result<()> {
    let (raw, len) = socket_addr(addr);
    syscall!(bind(fd, raw.as_ptr(), len)).map(|_| ())
}

pub(crate) fn listen(fd: Fd, backlog: libc::c_int) -> io::Result<()> {
    syscall!(listen(fd, backlog)).map(|_| ())
}

pub(crate) fn set_reuseaddr(fd: Fd) -> io::Result<()> {
    let opt: libc::c_int = 1;
    syscall!(setsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_REUSEADDR,
        &opt as *const _ as *const libc::c_void,
        size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

pub(crate) fn accept(fd: Fd) -> io::Result<(Fd, SocketAddr)> {
    let mut storage: MaybeUninit<libc::sockaddr_storage> = MaybeUninit::zeroed();
    let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    #[cfg(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    let stream = syscall!(accept4(
        fd,
        storage.as_mut_ptr() as *mut libc::sockaddr,
        &mut len,
        libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
    ))?;

    #[cfg(any(target_os = "ios", target_os = "macos"))]
    let stream = {
        let stream = syscall!(accept(
            fd,
            storage.as_mut_ptr() as *mut libc::sockaddr,
            &mut len,
        ))?;
        if let Err(err) = prepare_fd(stream).and_then(|()| set_nosigpipe(stream)) {
            let _ = close(stream);
            return Err(err);
        }
        stream
    };

    let storage = unsafe { storage.assume_init() };
    let addr = to_socket_addr(&storage)?;
    Ok((stream, addr))
}

/// The pending socket error, consumed; `None` when the socket is healthy.
pub(crate) fn take_error(fd: Fd) -> io::Result<Option<io::Error>> {
    let mut err: libc::c_int = 0;
    let mut len = size_of::<libc::c_int>() as libc::socklen_t;
    syscall!(getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_ERROR,
        &mut err as *mut _ as *mut libc::c_void,
        &mut len,
    ))?;
    if err == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(err)))
    }
}

pub(crate) fn local_addr(fd: Fd) -> io::Result<SocketAddr> {
    let mut storage: MaybeUninit<libc::sockaddr_storage> = MaybeUninit::zeroed();
    let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    syscall!(getsockname(
        fd,
        storage.as_mut_ptr() as *mut libc::sockaddr,
        &mut len
    ))?;
    let storage = unsafe { storage.assume_init() };
    to_socket_addr(&storage)
}

pub(crate) fn send(fd: Fd, buf: &[u8]) -> io::Result<usize> {
    #[cfg(any(target_os = "ios", target_os = "macos"))]
    let flags = 0;
    #[cfg(not(any(target_os = "ios", target_os = "macos")))]
    let flags = libc::MSG_NOSIGNAL;

    syscall!(send(
        fd,
        buf.as_ptr() as *const libc::c_void,
        buf.len(),
        flags
    ))
    .map(|n| n as usize)
}

pub(crate) fn recv(fd: Fd, buf: &mut [u8]) -> io::Result<usize> {
    syscall!(recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)).map(|n| n as usize)
}

pub(crate) fn close(fd: Fd) -> io::Result<()> {
    syscall!(close(fd)).map(|_| ())
}

/// Raw-descriptor `Read`/`Write` shim; the TLS session pumps its records
/// through this.
pub(crate) struct FdIo(pub(crate) Fd);

impl Read for FdIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        recv(self.0, buf)
    }
}

impl Write for FdIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        send(self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
