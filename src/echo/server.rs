//! Echo server: a listening socket plus the accept/read/echo-back logic.
//!
//! Peers cycle between reading request bytes and echoing them back. Which
//! buffer a peer uses depends on `ServerOptions::shared_buffer`: by default
//! every peer gets its own, and with the flag set all peers share one
//! buffer and one pair of offsets, so interleaved traffic gets mixed.

use crate::error::EchoError;
use crate::logging::{emit, SharedSink};
use crate::runtime::{socket, EchoBuffer, Multiplexer, Peer, PeerRegistry, PeerState};
use mio::net::TcpListener;
use mio::{Interest, Token};
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use tracing::Level;

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Server tuning and compatibility switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    pub buffer_size: usize,
    pub max_events: usize,
    pub backlog: i32,
    /// One echo buffer for every peer instead of one per peer.
    pub shared_buffer: bool,
    /// Close the listening socket when any peer reaches end-of-stream.
    pub close_listener_on_peer_eof: bool,
}

/// The server role.
pub struct EchoServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddrV4,
    mux: Multiplexer,
    peers: PeerRegistry,
    shared: Option<EchoBuffer>,
    /// Peers whose readable edge arrived while their buffer was full.
    deferred: Vec<Token>,
    options: ServerOptions,
    sink: SharedSink,
}

impl EchoServer {
    /// Bind to `addr`, listen, and watch the listener for readability.
    pub fn bind(
        addr: SocketAddrV4,
        options: ServerOptions,
        sink: SharedSink,
    ) -> Result<Self, EchoError> {
        let mut listener = socket::bind_listener(addr, options.backlog)?;
        let local_addr = match listener.local_addr() {
            Ok(SocketAddr::V4(v4)) => v4,
            Ok(SocketAddr::V6(_)) => addr,
            Err(e) => return Err(EchoError::setup("local_addr", e)),
        };

        let mut mux = Multiplexer::new(options.max_events)?;
        mux.watch(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        emit!(sink, Level::DEBUG, "server_new", "listening on {}", local_addr);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            mux,
            peers: PeerRegistry::new(),
            shared: options
                .shared_buffer
                .then(|| EchoBuffer::new(options.buffer_size)),
            deferred: Vec::new(),
            options,
            sink,
        })
    }

    /// Address the listener is bound to, with the actual port.
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// `(read_offset, write_offset)` of every live echo buffer.
    pub fn offsets(&self) -> Vec<(usize, usize)> {
        let mut offsets: Vec<_> = self.shared.iter().map(EchoBuffer::offsets).collect();
        offsets.extend(
            self.peers
                .iter()
                .filter_map(|(_, peer)| peer.buffer.as_ref().map(EchoBuffer::offsets)),
        );
        offsets
    }

    /// Poll once, dispatch every reported event, then recycle any buffer
    /// whose bytes have all been echoed and re-arm peers that were left
    /// unread because their buffer was full.
    pub fn tick(&mut self) {
        let ready = match self.mux.poll() {
            Ok(ready) => ready,
            Err(e) => {
                emit!(self.sink, Level::WARN, "server_tick", "error in poll: {}", e);
                return;
            }
        };

        for event in ready {
            if event.token == LISTENER_TOKEN {
                if event.readable {
                    self.accept();
                }
                continue;
            }

            if event.readable {
                if let Err(e) = self.handle_readable(event.token) {
                    self.abandon(event.token, e);
                }
            }
            if event.writable {
                if let Err(e) = self.handle_writable(event.token) {
                    self.abandon(event.token, e);
                }
            }
        }

        if let Some(shared) = self.shared.as_mut() {
            shared.recycle();
        }
        for (_, peer) in self.peers.iter_mut() {
            if let Some(buffer) = peer.buffer.as_mut() {
                buffer.recycle();
            }
        }

        self.rearm_deferred();
    }

    /// Readiness is edge-triggered, so a peer skipped on a full buffer is
    /// not reported again until its registration is refreshed.
    fn rearm_deferred(&mut self) {
        for token in std::mem::take(&mut self.deferred) {
            let Some(peer) = self.peers.get_mut(token) else {
                continue;
            };
            if let Err(e) = self.mux.watch(&mut peer.stream, token, peer.state.interest()) {
                emit!(self.sink, Level::WARN, "server_tick", "{}", e);
            }
        }
    }

    fn accept(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        emit!(self.sink, Level::DEBUG, "server_readable", "trying to accept on listener");

        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    let buffer = (!self.options.shared_buffer)
                        .then(|| EchoBuffer::new(self.options.buffer_size));
                    let token = self.peers.insert(Peer::new(stream, buffer));
                    let Some(peer) = self.peers.get_mut(token) else {
                        continue;
                    };
                    if let Err(e) = self.mux.watch(&mut peer.stream, token, Interest::READABLE) {
                        emit!(self.sink, Level::WARN, "server_readable", "{}", e);
                        self.peers.remove(token);
                        continue;
                    }
                    emit!(
                        self.sink,
                        Level::DEBUG,
                        "server_readable",
                        "accepted peer {} ({} sockets watched)",
                        token.0,
                        self.mux.watched()
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    emit!(
                        self.sink,
                        Level::WARN,
                        "server_readable",
                        "error accepting socket: {}",
                        e
                    );
                    break;
                }
            }
        }
    }

    fn handle_readable(&mut self, token: Token) -> io::Result<()> {
        let Some(peer) = self.peers.get_mut(token) else {
            return Ok(());
        };
        let Some(buffer) = peer.buffer.as_mut().or(self.shared.as_mut()) else {
            return Ok(());
        };
        emit!(self.sink, Level::DEBUG, "server_readable", "trying to read peer {}", token.0);

        // A full buffer waits for the echo to drain; the peer is re-armed
        // at the end of the tick.
        if buffer.remaining() == 0 {
            if !self.deferred.contains(&token) {
                self.deferred.push(token);
            }
            return Ok(());
        }

        let filled = buffer.fill_from(&mut peer.stream)?;
        if filled.bytes > 0 {
            emit!(
                self.sink,
                Level::INFO,
                "server_readable",
                "server socket {} read {} bytes",
                token.0,
                filled.bytes
            );
            peer.state = PeerState::Echoing;
            if let Err(e) = self.mux.watch(&mut peer.stream, token, peer.state.interest()) {
                emit!(self.sink, Level::WARN, "server_readable", "{}", e);
            }
        }

        if filled.eof {
            emit!(
                self.sink,
                Level::DEBUG,
                "server_readable",
                "peer {} closed its side",
                token.0
            );
            self.close_peer(token);
            if self.options.close_listener_on_peer_eof {
                self.close_listener();
            }
        }
        Ok(())
    }

    fn handle_writable(&mut self, token: Token) -> io::Result<()> {
        let Some(peer) = self.peers.get_mut(token) else {
            return Ok(());
        };
        let Some(buffer) = peer.buffer.as_mut().or(self.shared.as_mut()) else {
            return Ok(());
        };
        emit!(self.sink, Level::DEBUG, "server_writable", "trying to write peer {}", token.0);

        let drained = buffer.drain_into(&mut peer.stream)?;
        if drained.bytes > 0 {
            emit!(
                self.sink,
                Level::INFO,
                "server_writable",
                "server socket {} wrote {} bytes",
                token.0,
                drained.bytes
            );
        }

        if drained.closed {
            emit!(
                self.sink,
                Level::DEBUG,
                "server_writable",
                "peer {} accepted no bytes, dropping it",
                token.0
            );
            self.close_peer(token);
            return Ok(());
        }

        if buffer.pending() == 0 {
            peer.state = PeerState::Reading;
            if let Err(e) = self.mux.watch(&mut peer.stream, token, peer.state.interest()) {
                emit!(self.sink, Level::WARN, "server_writable", "{}", e);
            }
        }
        Ok(())
    }

    fn abandon(&mut self, token: Token, err: io::Error) {
        emit!(
            self.sink,
            Level::WARN,
            "server_tick",
            "peer {} error, closing connection: {}",
            token.0,
            err
        );
        self.close_peer(token);
    }

    fn close_peer(&mut self, token: Token) {
        if let Some(mut peer) = self.peers.remove(token) {
            self.mux.unwatch(&mut peer.stream, token);
        }
    }

    fn close_listener(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            self.mux.unwatch(&mut listener, LISTENER_TOKEN);
            emit!(self.sink, Level::INFO, "server_readable", "listener closed");
        }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.close_listener();
        let tokens: Vec<Token> = self.peers.iter_mut().map(|(token, _)| token).collect();
        for token in tokens {
            self.close_peer(token);
        }
    }
}
