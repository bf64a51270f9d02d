//! Echo client: one outbound connection, one payload, one verification.
//!
//! The client sends its payload with exactly one write call. A short write
//! freezes `amount_sent` at whatever was accepted; the client then waits
//! for that many bytes to come back and compares them with what it sent.

use crate::error::EchoError;
use crate::logging::{emit, SharedSink};
use crate::runtime::{socket, Multiplexer};
use mio::net::TcpStream;
use mio::{Interest, Token};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read, Write};
use std::net::SocketAddrV4;
use tracing::Level;

const CLIENT_TOKEN: Token = Token(0);

/// Result of comparing the echoed bytes with the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    Inconsistent,
}

/// Client progress. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// Connected (or connecting); the single send has not happened yet.
    AwaitingFirstWritable,
    /// The send happened; nothing has come back yet.
    Sent,
    /// Some of the echo has arrived.
    Receiving,
    /// The full echo arrived and was compared.
    Done(Verdict),
    /// An I/O error ended the exchange.
    Abandoned,
}

/// What a writable event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The send already happened; nothing to do.
    Ignored,
    /// The write would block. The send attempt is still available.
    Blocked,
    /// The whole payload was accepted.
    Complete(usize),
    /// Only part of the payload was accepted. No retry follows.
    Short(usize),
}

/// What a readable event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// Not waiting for echo bytes.
    Ignored,
    /// Some bytes (possibly none) arrived; more are expected.
    Progress(usize),
    Finished(Verdict),
}

/// Fill `buf` with lowercase ASCII letters chosen uniformly at random.
pub fn fill_lowercase<R: Rng + ?Sized>(buf: &mut [u8], rng: &mut R) {
    for byte in buf.iter_mut() {
        *byte = b'a' + rng.gen_range(0..26u8);
    }
}

/// Send/receive/verify state, independent of any socket.
pub struct ClientState {
    send_buf: Box<[u8]>,
    recv_buf: Box<[u8]>,
    amount_sent: usize,
    recv_offset: usize,
    phase: ClientPhase,
}

impl ClientState {
    pub fn new(capacity: usize) -> Self {
        Self {
            send_buf: vec![0u8; capacity].into_boxed_slice(),
            recv_buf: vec![0u8; capacity].into_boxed_slice(),
            amount_sent: 0,
            recv_offset: 0,
            phase: ClientPhase::AwaitingFirstWritable,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn capacity(&self) -> usize {
        self.send_buf.len()
    }

    pub fn amount_sent(&self) -> usize {
        self.amount_sent
    }

    pub fn recv_offset(&self) -> usize {
        self.recv_offset
    }

    #[cfg(test)]
    pub fn is_sent(&self) -> bool {
        !matches!(self.phase, ClientPhase::AwaitingFirstWritable)
    }

    #[cfg(test)]
    pub fn is_done(&self) -> bool {
        matches!(self.phase, ClientPhase::Done(_))
    }

    /// Done or abandoned: no further event changes anything.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, ClientPhase::Done(_) | ClientPhase::Abandoned)
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self.phase {
            ClientPhase::Done(verdict) => Some(verdict),
            _ => None,
        }
    }

    #[cfg(test)]
    /// Bytes actually handed to the network.
    pub fn payload(&self) -> &[u8] {
        &self.send_buf[..self.amount_sent]
    }

    pub fn abandon(&mut self) {
        if !self.is_finished() {
            self.phase = ClientPhase::Abandoned;
        }
    }

    /// Generate the payload and make the one send attempt.
    pub fn on_writable<W, R>(&mut self, writer: &mut W, rng: &mut R) -> io::Result<SendOutcome>
    where
        W: Write + ?Sized,
        R: Rng + ?Sized,
    {
        if self.phase != ClientPhase::AwaitingFirstWritable {
            return Ok(SendOutcome::Ignored);
        }

        fill_lowercase(&mut self.send_buf, rng);
        let n = match writer.write(&self.send_buf) {
            Ok(n) => n,
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(SendOutcome::Blocked)
            }
            Err(e) => return Err(e),
        };

        self.amount_sent += n;
        self.phase = ClientPhase::Sent;

        if self.amount_sent >= self.capacity() {
            Ok(SendOutcome::Complete(n))
        } else {
            Ok(SendOutcome::Short(n))
        }
    }

    /// Drain available echo bytes and verify once everything is back.
    pub fn on_readable<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<RecvOutcome> {
        if !matches!(self.phase, ClientPhase::Sent | ClientPhase::Receiving) {
            return Ok(RecvOutcome::Ignored);
        }

        let before = self.recv_offset;
        while self.amount_sent > self.recv_offset {
            match reader.read(&mut self.recv_buf[self.recv_offset..self.amount_sent]) {
                Ok(0) => break,
                Ok(n) => self.recv_offset += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if self.recv_offset >= self.amount_sent {
            let sent = &self.send_buf[..self.amount_sent];
            let received = &self.recv_buf[..self.amount_sent];
            let verdict = if sent == received {
                Verdict::Consistent
            } else {
                Verdict::Inconsistent
            };
            self.phase = ClientPhase::Done(verdict);
            Ok(RecvOutcome::Finished(verdict))
        } else {
            if self.recv_offset > before {
                self.phase = ClientPhase::Receiving;
            }
            Ok(RecvOutcome::Progress(self.recv_offset - before))
        }
    }
}

/// The client role: a connected socket, its private multiplexer, and the
/// exchange state.
pub struct EchoClient {
    stream: Option<TcpStream>,
    mux: Multiplexer,
    server: SocketAddrV4,
    state: ClientState,
    rng: StdRng,
    sink: SharedSink,
}

impl EchoClient {
    /// Start a non-blocking connect to `server` and watch the socket for
    /// both readability and writability.
    pub fn connect(
        server: SocketAddrV4,
        buffer_size: usize,
        max_events: usize,
        sink: SharedSink,
    ) -> Result<Self, EchoError> {
        let mut stream = socket::connect_stream(server)?;
        let mut mux = Multiplexer::new(max_events)?;
        mux.watch(&mut stream, CLIENT_TOKEN, Interest::READABLE | Interest::WRITABLE)?;

        emit!(sink, Level::DEBUG, "client_new", "connecting to {}", server);

        Ok(Self {
            stream: Some(stream),
            mux,
            server,
            state: ClientState::new(buffer_size),
            rng: StdRng::from_entropy(),
            sink,
        })
    }

    pub fn server(&self) -> SocketAddrV4 {
        self.server
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    #[cfg(test)]
    /// Whether the socket is still open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Poll once and dispatch every reported event.
    pub fn tick(&mut self) {
        let ready = match self.mux.poll() {
            Ok(ready) => ready,
            Err(e) => {
                emit!(self.sink, Level::WARN, "client_tick", "error in poll: {}", e);
                return;
            }
        };

        for event in ready {
            if event.readable {
                if let Err(e) = self.handle_readable() {
                    self.abandon(e);
                }
            }
            if event.writable {
                if let Err(e) = self.handle_writable() {
                    self.abandon(e);
                }
            }
        }
    }

    fn handle_readable(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        emit!(self.sink, Level::DEBUG, "client_readable", "trying to read client socket");

        match self.state.on_readable(stream)? {
            RecvOutcome::Ignored => {}
            RecvOutcome::Progress(n) => {
                emit!(
                    self.sink,
                    Level::DEBUG,
                    "client_readable",
                    "client socket read {} bytes",
                    n
                );
                emit!(
                    self.sink,
                    Level::INFO,
                    "client_readable",
                    "echo progress: {} of {} bytes",
                    self.state.recv_offset(),
                    self.state.amount_sent()
                );
            }
            RecvOutcome::Finished(verdict) => {
                let message = match verdict {
                    Verdict::Consistent => "consistent echo received!",
                    Verdict::Inconsistent => "inconsistent echo received!",
                };
                emit!(self.sink, Level::INFO, "client_readable", "{}", message);
                self.close();
            }
        }
        Ok(())
    }

    fn handle_writable(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        match self.state.on_writable(&mut *stream, &mut self.rng)? {
            SendOutcome::Ignored | SendOutcome::Blocked => {}
            SendOutcome::Complete(n) => {
                emit!(
                    self.sink,
                    Level::DEBUG,
                    "client_writable",
                    "client socket wrote {} bytes",
                    n
                );
                // Everything is out; stop watching for writability.
                if let Err(e) = self.mux.watch(stream, CLIENT_TOKEN, Interest::READABLE) {
                    emit!(self.sink, Level::WARN, "client_writable", "{}", e);
                }
            }
            SendOutcome::Short(n) => {
                emit!(
                    self.sink,
                    Level::WARN,
                    "client_writable",
                    "short send: {} of {} bytes accepted, remainder is never sent",
                    n,
                    self.state.capacity()
                );
            }
        }
        Ok(())
    }

    fn abandon(&mut self, err: io::Error) {
        emit!(
            self.sink,
            Level::WARN,
            "client_tick",
            "client socket error, abandoning connection: {}",
            err
        );
        self.state.abandon();
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            self.mux.unwatch(&mut stream, CLIENT_TOKEN);
        }
    }
}

impl Drop for EchoClient {
    fn drop(&mut self) {
        self.close();
    }
}
