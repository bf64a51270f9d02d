//! Accepted peer connections on the echo server.
//!
//! Each peer tracks whether it is waiting for request bytes or echoing
//! them back, plus its own echo buffer unless the server runs with a
//! single shared buffer.

use crate::runtime::EchoBuffer;
use mio::net::TcpStream;
use mio::{Interest, Token};
use slab::Slab;

/// Where a peer is in its request/echo cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Watching for readability only; no bytes pending.
    Reading,
    /// Bytes pending; watching for writability as well.
    Echoing,
}

impl PeerState {
    pub fn interest(self) -> Interest {
        match self {
            PeerState::Reading => Interest::READABLE,
            PeerState::Echoing => Interest::READABLE | Interest::WRITABLE,
        }
    }
}

/// A single accepted connection.
pub struct Peer {
    pub stream: TcpStream,
    pub state: PeerState,
    /// Private buffer, or `None` when the server's shared buffer is used.
    pub buffer: Option<EchoBuffer>,
}

impl Peer {
    pub fn new(stream: TcpStream, buffer: Option<EchoBuffer>) -> Self {
        Self {
            stream,
            state: PeerState::Reading,
            buffer,
        }
    }
}

/// Registry of accepted peers using slab allocation.
///
/// Slab keys double as the peers' poll tokens.
pub struct PeerRegistry {
    peers: Slab<Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self { peers: Slab::new() }
    }

    /// Insert a peer and return the token it should be registered under.
    pub fn insert(&mut self, peer: Peer) -> Token {
        Token(self.peers.insert(peer))
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Peer> {
        self.peers.get_mut(token.0)
    }

    pub fn remove(&mut self, token: Token) -> Option<Peer> {
        self.peers.try_remove(token.0)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Token, &Peer)> {
        self.peers.iter().map(|(id, peer)| (Token(id), peer))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Token, &mut Peer)> {
        self.peers.iter_mut().map(|(id, peer)| (Token(id), peer))
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
