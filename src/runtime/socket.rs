//! Non-blocking socket construction and host resolution.

use crate::error::EchoError;
use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

fn new_stream_socket() -> Result<Socket, EchoError> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(EchoError::ResourceExhausted)?;
    socket
        .set_nonblocking(true)
        .map_err(|e| EchoError::setup("set_nonblocking", e))?;
    Ok(socket)
}

/// Bind a non-blocking listener on `addr` and start listening.
pub fn bind_listener(addr: SocketAddrV4, backlog: i32) -> Result<TcpListener, EchoError> {
    let socket = new_stream_socket()?;
    socket
        .set_reuse_address(true)
        .map_err(|e| EchoError::setup("set_reuse_address", e))?;
    socket
        .bind(&SocketAddr::V4(addr).into())
        .map_err(|e| EchoError::setup("bind", e))?;
    socket
        .listen(backlog)
        .map_err(|e| EchoError::setup("listen", e))?;

    let listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(listener))
}

/// Start a non-blocking connect to `addr`.
///
/// The connect normally reports in-progress; that counts as success and the
/// socket becomes writable once the handshake completes.
pub fn connect_stream(addr: SocketAddrV4) -> Result<TcpStream, EchoError> {
    let socket = new_stream_socket()?;
    match socket.connect(&SocketAddr::V4(addr).into()) {
        Ok(()) => {}
        Err(ref e) if connect_in_progress(e) => {}
        Err(e) => return Err(EchoError::setup("connect", e)),
    }

    let stream: std::net::TcpStream = socket.into();
    Ok(TcpStream::from_std(stream))
}

fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

/// Resolve `host` to its first IPv4 address.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, EchoError> {
    let addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| EchoError::InvalidConfiguration(format!("cannot resolve '{host}': {e}")))?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| EchoError::InvalidConfiguration(format!("no IPv4 address for '{host}'")))
}

/// Name of the machine this process runs on.
pub fn local_hostname() -> Result<String, EchoError> {
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is valid for `buf.len()` bytes and gethostname writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(EchoError::InvalidConfiguration(format!(
            "gethostname failed: {}",
            io::Error::last_os_error()
        )));
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec())
        .map_err(|_| EchoError::InvalidConfiguration("hostname is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_localhost() {
        assert_eq!(resolve_ipv4("localhost").unwrap(), Ipv4Addr::LOCALHOST);
        assert_eq!(resolve_ipv4("127.0.0.1").unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_resolve_garbage_is_invalid_configuration() {
        let err = resolve_ipv4("no such host.invalid").unwrap_err();
        assert!(matches!(err, EchoError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_local_hostname_is_nonempty() {
        assert!(!local_hostname().unwrap().is_empty());
    }

    #[test]
    fn test_bind_and_connect_loopback() {
        let listener = bind_listener(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), 16).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_ne!(port, 0);

        let stream = connect_stream(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        assert!(stream.is_ok());
    }

    #[test]
    fn test_bind_in_use_port_is_setup_error() {
        let first = bind_listener(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), 16).unwrap();
        let port = first.local_addr().unwrap().port();

        let err = bind_listener(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port), 16).unwrap_err();
        assert!(matches!(err, EchoError::ConnectionSetup { stage: "bind", .. }));
    }
}
