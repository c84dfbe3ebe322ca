//! Windows backend: a hidden native window fed by `WSAAsyncSelect`.
//!
//! The only performant readiness mechanism with usable semantics that does
//! not require a completion-port redesign is `WSAAsyncSelect`, which posts
//! readiness as window messages. Init creates a hidden window; the wait arms
//! two native timers (a one second cap and one for the requested timeout),
//! blocks in `GetMessageW`, then drains the queue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::mem::{size_of, zeroed, MaybeUninit};
use std::net::SocketAddr;
use std::ptr;
use std::sync::Once;
use std::time::Duration;

use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::Networking::WinSock::{
    self, ADDRESS_FAMILY, AF_INET, AF_INET6, FIONBIO, INVALID_SOCKET, SOCKADDR,
    SOCKADDR_STORAGE, SOCKET, SOCKET_ERROR, SOCK_STREAM, SOL_SOCKET, SO_ERROR, SO_REUSEADDR,
    WSADATA,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, KillTimer,
    PeekMessageW, RegisterClassExW, SetTimer, TranslateMessage, MSG, PM_REMOVE, WM_TIMER, WM_USER,
    WNDCLASSEXW, WS_OVERLAPPEDWINDOW,
};

use crate::interest::Interest;
use crate::sys::{EventData, Events};
use crate::token::Token;

pub(crate) type Fd = SOCKET;

const MSG_SOCKET: u32 = WM_USER + 1;
const TIMER_CAP: usize = 1000;
const TIMER_DEADLINE: usize = 1001;

thread_local! {
    // The wndproc has no instance pointer; readiness lands here and the
    // selector that pumped the message drains it.
    static PENDING: RefCell<Vec<(SOCKET, u32)>> = RefCell::new(Vec::new());
}

fn wsa_startup() -> io::Result<()> {
    static START: Once = Once::new();
    let mut result = 0;
    START.call_once(|| {
        let mut data: WSADATA = unsafe { zeroed() };
        result = unsafe { WinSock::WSAStartup(0x202, &mut data) };
    });
    if result != 0 {
        return Err(io::Error::from_raw_os_error(result));
    }
    Ok(())
}

fn last_socket_error() -> io::Error {
    io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() })
}

unsafe extern "system" fn wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        MSG_SOCKET => {
            PENDING.with(|pending| {
                pending.borrow_mut().push((wparam as SOCKET, lparam as u32));
            });
            0
        }
        WM_TIMER => 0,
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

#[derive(Debug)]
pub(crate) struct Selector {
    window: HWND,
    registrations: HashMap<SOCKET, (Token, Interest)>,
}

impl Selector {
    pub(crate) fn new(_size_hint: usize, _force: Option<crate::sys::Backend>) -> io::Result<Selector> {
        wsa_startup()?;

        let class_name: Vec<u16> = "muxio-message-window\0".encode_utf16().collect();
        let hinstance = unsafe { GetModuleHandleW(ptr::null()) };
        let mut class: WNDCLASSEXW = unsafe { zeroed() };
        class.cbSize = size_of::<WNDCLASSEXW>() as u32;
        class.lpfnWndProc = Some(wndproc);
        class.hInstance = hinstance;
        class.lpszClassName = class_name.as_ptr();
        // Re-registering the class in the same process reports an error we
        // can ignore.
        unsafe { RegisterClassExW(&class) };

        let window = unsafe {
            CreateWindowExW(
                0,
                class_name.as_ptr(),
                class_name.as_ptr(),
                WS_OVERLAPPEDWINDOW,
                0,
                0,
                0,
                0,
                0,
                0,
                hinstance,
                ptr::null(),
            )
        };
        if window == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Selector {
            window,
            registrations: HashMap::new(),
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        "win32"
    }

    fn async_select(&self, fd: SOCKET, interest: Interest) -> io::Result<()> {
        let mut mask = 0;
        if interest.is_readable() {
            mask |= WinSock::FD_READ | WinSock::FD_ACCEPT | WinSock::FD_CLOSE;
        }
        if interest.is_writable() {
            mask |= WinSock::FD_WRITE | WinSock::FD_CONNECT;
        }
        let res = unsafe { WinSock::WSAAsyncSelect(fd, self.window, MSG_SOCKET, mask as i32) };
        if res == SOCKET_ERROR {
            return Err(last_socket_error());
        }
        Ok(())
    }

    pub(crate) fn add(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        self.async_select(fd, interest)?;
        self.registrations.insert(fd, (token, interest));
        Ok(())
    }

    pub(crate) fn update(&mut self, fd: Fd, token: Token, interest: Interest) -> io::Result<()> {
        self.async_select(fd, interest)?;
        self.registrations.insert(fd, (token, interest));
        Ok(())
    }

    pub(crate) fn remove(&mut self, fd: Fd) -> io::Result<()> {
        let res = unsafe { WinSock::WSAAsyncSelect(fd, self.window, 0, 0) };
        self.registrations.remove(&fd);
        if res == SOCKET_ERROR {
            return Err(last_socket_error());
        }
        Ok(())
    }

    pub(crate) fn select(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        unsafe { SetTimer(self.window, TIMER_CAP, 1000, None) };
        if let Some(to) = timeout {
            let ms = to.as_millis().min(u32::MAX as u128).max(1) as u32;
            unsafe { SetTimer(self.window, TIMER_DEADLINE, ms, None) };
        }

        let mut msg: MaybeUninit<MSG> = MaybeUninit::uninit();
        let res = unsafe { GetMessageW(msg.as_mut_ptr(), 0, 0, 0) };
        if res > 0 {
            unsafe {
                TranslateMessage(msg.as_ptr());
                DispatchMessageW(msg.as_ptr());
            }
            // Drain whatever else is queued without blocking again.
            loop {
                let got = unsafe { PeekMessageW(msg.as_mut_ptr(), 0, 0, 0, PM_REMOVE) };
                if got == 0 {
                    break;
                }
                unsafe {
                    TranslateMessage(msg.as_ptr());
                    DispatchMessageW(msg.as_ptr());
                }
            }
        }

        unsafe {
            KillTimer(self.window, TIMER_CAP);
            if timeout.is_some() {
                KillTimer(self.window, TIMER_DEADLINE);
            }
        }

        PENDING.with(|pending| {
            for (fd, select_event) in pending.borrow_mut().drain(..) {
                let (token, _) = match self.registrations.get(&fd) {
                    Some(reg) => *reg,
                    None => continue,
                };
                let event = select_event & 0xffff;
                let error = (select_event >> 16) & 0xffff;
                let readable = event
                    & (WinSock::FD_READ | WinSock::FD_ACCEPT | WinSock::FD_CLOSE) as u32
                    != 0
                    // A failed connect reports through the readable path,
                    // matching the unix backends.
                    || (event & WinSock::FD_CONNECT as u32 != 0 && error != 0);
                let writable =
                    event & (WinSock::FD_WRITE | WinSock::FD_CONNECT) as u32 != 0 && error == 0;
                if readable || writable {
                    events.push(EventData {
                        token,
                        readable,
                        writable,
                    });
                }
            }
        });
        Ok(())
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        unsafe { DestroyWindow(self.window) };
    }
}

// Address conversions.

#[repr(C)]
pub(crate) union SocketAddrCRepr {
    v4: WinSock::SOCKADDR_IN,
    v6: WinSock::SOCKADDR_IN6,
}

impl SocketAddrCRepr {
    pub(crate) fn as_ptr(&self) -> *const SOCKADDR {
        self as *const SocketAddrCRepr as *const SOCKADDR
    }
}

pub(crate) fn socket_addr(addr: &SocketAddr) -> (SocketAddrCRepr, i32) {
    match addr {
        SocketAddr::V4(addr) => {
            let mut sockaddr_in: WinSock::SOCKADDR_IN = unsafe { zeroed() };
            sockaddr_in.sin_family = AF_INET as ADDRESS_FAMILY;
            sockaddr_in.sin_port = addr.port().to_be();
            sockaddr_in.sin_addr.S_un.S_addr = u32::from_ne_bytes(addr.ip().octets());
            (
                SocketAddrCRepr { v4: sockaddr_in },
                size_of::<WinSock::SOCKADDR_IN>() as i32,
            )
        }
        SocketAddr::V6(addr) => {
            let mut sockaddr_in6: WinSock::SOCKADDR_IN6 = unsafe { zeroed() };
            sockaddr_in6.sin6_family = AF_INET6 as ADDRESS_FAMILY;
            sockaddr_in6.sin6_port = addr.port().to_be();
            sockaddr_in6.sin6_addr.u.Byte = addr.ip().octets();
            sockaddr_in6.sin6_flowinfo = addr.flowinfo();
            sockaddr_in6.Anonymous.sin6_scope_id = addr.scope_id();
            (
                SocketAddrCRepr { v6: sockaddr_in6 },
                size_of::<WinSock::SOCKADDR_IN6>() as i32,
            )
        }
    }
}

pub(crate) fn to_socket_addr(storage: &SOCKADDR_STORAGE) -> io::Result<SocketAddr> {
    match storage.ss_family {
        AF_INET => {
            let addr: &WinSock::SOCKADDR_IN =
                unsafe { &*(storage as *const _ as *const WinSock::SOCKADDR_IN) };
            let ip = std::net::Ipv4Addr::from(unsafe { addr.sin_addr.S_un.S_addr }.to_ne_bytes());
            Ok(SocketAddr::V4(std::net::SocketAddrV4::new(
                ip,
                u16::from_be(addr.sin_port),
            )))
        }
        AF_INET6 => {
            let addr: &WinSock::SOCKADDR_IN6 =
                unsafe { &*(storage as *const _ as *const WinSock::SOCKADDR_IN6) };
            let ip = std::net::Ipv6Addr::from(unsafe { addr.sin6_addr.u.Byte });
            Ok(SocketAddr::V6(std::net::SocketAddrV6::new(
                ip,
                u16::from_be(addr.sin6_port),
                addr.sin6_flowinfo,
                unsafe { addr.Anonymous.sin6_scope_id },
            )))
        }
        _ => Err(io::ErrorKind::InvalidInput.into()),
    }
}

// Socket operations mirroring the unix helpers.

pub(crate) fn new_socket(domain: i32, socket_type: i32) -> io::Result<Fd> {
    wsa_startup()?;
    let socket = unsafe { WinSock::socket(domain, socket_type, 0) };
    if socket == INVALID_SOCKET {
        return Err(last_socket_error());
    }
    if let Err(err) = prepare_fd(socket) {
        let _ = close(socket);
        return Err(err);
    }
    Ok(socket)
}

pub(crate) fn new_tcp_socket(ipv6: bool) -> io::Result<Fd> {
    let domain = if ipv6 { AF_INET6 } else { AF_INET };
    new_socket(domain as i32, SOCK_STREAM as i32)
}

fn prepare_fd(fd: Fd) -> io::Result<()> {
    set_nonblocking(fd, true)
}

pub(crate) fn set_nonblocking(fd: Fd, nonblocking: bool) -> io::Result<()> {
    let mut arg: u32 = u32::from(nonblocking);
    let res = unsafe { WinSock::ioctlsocket(fd, FIONBIO, &mut arg) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(())
}

/// Whether a `connect` error just means "completion pending".
pub(crate) fn connect_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(WinSock::WSAEWOULDBLOCK)
}

pub(crate) fn connect(fd: Fd, addr: &SocketAddr) -> io::Result<()> {
    let (raw, len) = socket_addr(addr);
    let res = unsafe { WinSock::connect(fd, raw.as_ptr(), len) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(())
}

pub(crate) fn bind(fd: Fd, addr: &SocketAddr) -> io::Result<()> {
    let (raw, len) = socket_addr(addr);
    let res = unsafe { WinSock::bind(fd, raw.as_ptr(), len) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(())
}

pub(crate) fn listen(fd: Fd, backlog: i32) -> io::Result<()> {
    let res = unsafe { WinSock::listen(fd, backlog) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(())
}

pub(crate) fn set_reuseaddr(fd: Fd) -> io::Result<()> {
    let opt: i32 = 1;
    let res = unsafe {
        WinSock::setsockopt(
            fd,
            SOL_SOCKET as i32,
            SO_REUSEADDR as i32,
            &opt as *const _ as *const u8,
            size_of::<i32>() as i32,
        )
    };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(())
}

pub(crate) fn accept(fd: Fd) -> io::Result<(Fd, SocketAddr)> {
    let mut storage: SOCKADDR_STORAGE = unsafe { zeroed() };
    let mut len = size_of::<SOCKADDR_STORAGE>() as i32;
    let stream =
        unsafe { WinSock::accept(fd, &mut storage as *mut _ as *mut SOCKADDR, &mut len) };
    if stream == INVALID_SOCKET {
        return Err(last_socket_error());
    }
    if let Err(err) = prepare_fd(stream) {
        let _ = close(stream);
        return Err(err);
    }
    let addr = to_socket_addr(&storage)?;
    Ok((stream, addr))
}

pub(crate) fn take_error(fd: Fd) -> io::Result<Option<io::Error>> {
    let mut err: i32 = 0;
    let mut len = size_of::<i32>() as i32;
    let res = unsafe {
        WinSock::getsockopt(
            fd,
            SOL_SOCKET as i32,
            SO_ERROR as i32,
            &mut err as *mut _ as *mut u8,
            &mut len,
        )
    };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    if err == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(err)))
    }
}

pub(crate) fn local_addr(fd: Fd) -> io::Result<SocketAddr> {
    let mut storage: SOCKADDR_STORAGE = unsafe { zeroed() };
    let mut len = size_of::<SOCKADDR_STORAGE>() as i32;
    let res =
        unsafe { WinSock::getsockname(fd, &mut storage as *mut _ as *mut SOCKADDR, &mut len) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    to_socket_addr(&storage)
}

pub(crate) fn send(fd: Fd, buf: &[u8]) -> io::Result<usize> {
    let res = unsafe { WinSock::send(fd, buf.as_ptr(), buf.len().min(i32::MAX as usize) as i32, 0) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(res as usize)
}

pub(crate) fn recv(fd: Fd, buf: &mut [u8]) -> io::Result<usize> {
    let res = unsafe {
        WinSock::recv(
            fd,
            buf.as_mut_ptr(),
            buf.len().min(i32::MAX as usize) as i32,
            0,
        )
    };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(res as usize)
}

pub(crate) fn close(fd: Fd) -> io::Result<()> {
    let res = unsafe { WinSock::closesocket(fd) };
    if res == SOCKET_ERROR {
        return Err(last_socket_error());
    }
    Ok(())
}

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
