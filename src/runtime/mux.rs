//! Readiness multiplexer for one role.
//!
//! Thin wrapper over a `mio::Poll` that remembers which tokens it has
//! registered, so callers can express "watch this socket with this
//! interest" without tracking register-vs-reregister themselves.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! mio readiness is edge-triggered. Handlers drain until `WouldBlock`,
//! and changing interest re-arms the registration, which reports the
//! socket again if it is still ready.

use crate::error::EchoError;
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashSet;
use std::io;
use std::time::Duration;

/// A socket that became ready, as reported by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

/// One readiness set: a poll instance, its event storage, and the
/// tokens currently registered with it.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    watched: HashSet<Token>,
}

impl Multiplexer {
    /// Create an empty readiness set with room for `max_events` per poll.
    pub fn new(max_events: usize) -> Result<Self, EchoError> {
        let poll = Poll::new().map_err(EchoError::ResourceExhausted)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(max_events.max(1)),
            watched: HashSet::new(),
        })
    }

    /// Register `source` under `token`, or update its interest if it is
    /// already registered.
    pub fn watch<S>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), EchoError>
    where
        S: Source + ?Sized,
    {
        let registry = self.poll.registry();
        if self.watched.contains(&token) {
            registry
                .reregister(source, token, interest)
                .map_err(EchoError::Registration)?;
        } else {
            registry
                .register(source, token, interest)
                .map_err(EchoError::Registration)?;
            self.watched.insert(token);
        }
        Ok(())
    }

    /// Stop watching `source`. Unknown tokens and OS failures are ignored.
    pub fn unwatch<S>(&mut self, source: &mut S, token: Token)
    where
        S: Source + ?Sized,
    {
        if self.watched.remove(&token) {
            let _ = self.poll.registry().deregister(source);
        }
    }

    /// Number of registered sockets.
    pub fn watched(&self) -> usize {
        self.watched.len()
    }

    /// Collect every ready socket without blocking.
    ///
    /// An empty result is the normal outcome when nothing happened since
    /// the last poll.
    pub fn poll(&mut self) -> io::Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self
            .events
            .iter()
            .filter(|event| self.watched.contains(&event.token()))
            .map(|event| Readiness {
                token: event.token(),
                readable: event.is_readable() || event.is_read_closed(),
                writable: event.is_writable(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};
    use std::io::Write;
    use std::thread;

    const LISTENER: Token = Token(0);

    fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_poll_empty_set_reports_nothing() {
        let mut mux = Multiplexer::new(8).unwrap();
        assert!(mux.poll().unwrap().is_empty());
        assert_eq!(mux.watched(), 0);
    }

    #[test]
    fn test_idle_listener_is_idempotent() {
        let mut mux = Multiplexer::new(8).unwrap();
        let mut l = listener();
        mux.watch(&mut l, LISTENER, Interest::READABLE).unwrap();

        for _ in 0..3 {
            assert!(mux.poll().unwrap().is_empty());
        }
        assert_eq!(mux.watched(), 1);
    }

    #[test]
    fn test_pending_connection_reports_readable() {
        let mut mux = Multiplexer::new(8).unwrap();
        let mut l = listener();
        let addr = l.local_addr().unwrap();
        mux.watch(&mut l, LISTENER, Interest::READABLE).unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();

        let mut ready = Vec::new();
        for _ in 0..100 {
            ready = mux.poll().unwrap();
            if !ready.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].token, LISTENER);
        assert!(ready[0].readable);
        assert!(!ready[0].writable);
    }

    #[test]
    fn test_watch_twice_updates_interest() {
        let mut mux = Multiplexer::new(8).unwrap();
        let l = listener();
        let mut stream = TcpStream::connect(l.local_addr().unwrap()).unwrap();
        let token = Token(7);

        mux.watch(&mut stream, token, Interest::READABLE).unwrap();
        mux.watch(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
            .unwrap();
        assert_eq!(mux.watched(), 1);

        let mut writable = false;
        for _ in 0..100 {
            if mux.poll().unwrap().iter().any(|r| r.token == token && r.writable) {
                writable = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(writable);
    }

    #[test]
    fn test_unwatch_is_safe_to_repeat() {
        let mut mux = Multiplexer::new(8).unwrap();
        let mut l = listener();
        let addr = l.local_addr().unwrap();
        mux.watch(&mut l, LISTENER, Interest::READABLE).unwrap();

        mux.unwatch(&mut l, LISTENER);
        mux.unwatch(&mut l, LISTENER);
        assert_eq!(mux.watched(), 0);

        let mut c = std::net::TcpStream::connect(addr).unwrap();
        c.write_all(b"x").unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(mux.poll().unwrap().is_empty());
    }
}
