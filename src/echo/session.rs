//! Session controller: builds the roles a mode asks for and ticks them.

use crate::echo::client::EchoClient;
use crate::echo::server::{EchoServer, ServerOptions};
use crate::echo::{BUFFERSIZE, ECHO_SERVER_PORT, LISTEN_BACKLOG, MAX_EVENTS};
use crate::error::EchoError;
use crate::logging::{emit, SharedSink};
use crate::runtime::socket;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use tracing::Level;

/// Which roles a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Client only, talking to a named host.
    Client,
    /// Server only, bound to this machine's own address.
    Server,
    /// Client and server over the loopback interface.
    Loopback,
    /// Recognized but not implemented; always rejected.
    Socketpair,
}

impl FromStr for Mode {
    type Err = EchoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Mode::Client),
            "server" => Ok(Mode::Server),
            "loopback" => Ok(Mode::Loopback),
            "socketpair" => Ok(Mode::Socketpair),
            other => Err(EchoError::InvalidConfiguration(format!(
                "unknown mode '{other}'"
            ))),
        }
    }
}

/// Knobs shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Port the server listens on and the client connects to. `0` binds an
    /// ephemeral port; only meaningful for server and loopback sessions.
    pub port: u16,
    pub buffer_size: usize,
    pub max_events: usize,
    pub backlog: i32,
    pub shared_server_buffer: bool,
    pub close_listener_on_peer_eof: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: ECHO_SERVER_PORT,
            buffer_size: BUFFERSIZE,
            max_events: MAX_EVENTS,
            backlog: LISTEN_BACKLOG,
            shared_server_buffer: false,
            close_listener_on_peer_eof: false,
        }
    }
}

impl SessionOptions {
    fn server_options(&self) -> ServerOptions {
        ServerOptions {
            buffer_size: self.buffer_size,
            max_events: self.max_events,
            backlog: self.backlog,
            shared_buffer: self.shared_server_buffer,
            close_listener_on_peer_eof: self.close_listener_on_peer_eof,
        }
    }
}

/// An optional client and an optional server, ticked together.
pub struct EchoSession {
    client: Option<EchoClient>,
    server: Option<EchoServer>,
    sink: SharedSink,
}

impl EchoSession {
    /// Build a session from a construction vector: `args[0]` is the mode,
    /// `args[1]` the server host (client mode only).
    ///
    /// Failures are logged through `sink` before being returned.
    pub fn new<S: AsRef<str>>(
        args: &[S],
        options: &SessionOptions,
        sink: SharedSink,
    ) -> Result<Self, EchoError> {
        match Self::build(args, options, &sink) {
            Ok(session) => Ok(session),
            Err(e) => {
                emit!(sink, Level::WARN, "session_new", "unable to create session: {}", e);
                Err(e)
            }
        }
    }

    fn build<S: AsRef<str>>(
        args: &[S],
        options: &SessionOptions,
        sink: &SharedSink,
    ) -> Result<Self, EchoError> {
        let mode: Mode = args
            .first()
            .ok_or_else(|| EchoError::InvalidConfiguration("missing mode argument".into()))?
            .as_ref()
            .parse()?;

        let (client, server) = match mode {
            Mode::Client => {
                let host = args.get(1).ok_or_else(|| {
                    EchoError::InvalidConfiguration("client mode needs a server host".into())
                })?;
                let ip = socket::resolve_ipv4(host.as_ref())?;
                let client = EchoClient::connect(
                    SocketAddrV4::new(ip, options.port),
                    options.buffer_size,
                    options.max_events,
                    sink.clone(),
                )?;
                (Some(client), None)
            }
            Mode::Server => {
                let ip = socket::resolve_ipv4(&socket::local_hostname()?)?;
                let server = EchoServer::bind(
                    SocketAddrV4::new(ip, options.port),
                    options.server_options(),
                    sink.clone(),
                )?;
                (None, Some(server))
            }
            Mode::Loopback => {
                let server = EchoServer::bind(
                    SocketAddrV4::new(Ipv4Addr::LOCALHOST, options.port),
                    options.server_options(),
                    sink.clone(),
                )?;
                // The server's port, not the configured one: port 0 binds ephemerally.
                let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, server.local_addr().port());
                let client = match EchoClient::connect(
                    target,
                    options.buffer_size,
                    options.max_events,
                    sink.clone(),
                ) {
                    Ok(client) => Some(client),
                    Err(e) => {
                        emit!(
                            sink,
                            Level::WARN,
                            "session_new",
                            "unable to create loopback client: {}",
                            e
                        );
                        None
                    }
                };
                (client, Some(server))
            }
            Mode::Socketpair => {
                return Err(EchoError::InvalidConfiguration(
                    "socketpair mode is not implemented".into(),
                ))
            }
        };

        emit!(sink, Level::INFO, "session_new", "session ready in {:?} mode", mode);

        Ok(Self {
            client,
            server,
            sink: sink.clone(),
        })
    }

    /// Give each role one non-blocking poll and dispatch pass.
    pub fn tick(&mut self) {
        emit!(self.sink, Level::TRACE, "session_tick", "tick");
        if let Some(client) = self.client.as_mut() {
            client.tick();
        }
        if let Some(server) = self.server.as_mut() {
            server.tick();
        }
    }

    pub fn client(&self) -> Option<&EchoClient> {
        self.client.as_ref()
    }

    pub fn server(&self) -> Option<&EchoServer> {
        self.server.as_ref()
    }

    /// True once the client has finished its exchange. Server-only
    /// sessions never finish on their own.
    pub fn is_finished(&self) -> bool {
        match &self.client {
            Some(client) => client.state().is_finished(),
            None => self.server.is_none(),
        }
    }
}
