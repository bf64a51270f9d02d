//! The echo workload: client and server roles plus the session that owns
//! them.
//!
//! The client connects to the server's well-known port, sends one buffer
//! of random lowercase letters, and checks that the same bytes come back
//! in order. The server accepts peers and echoes whatever they send.

pub mod client;
mod scheduler;
pub mod server;
mod session;

pub use scheduler::Scheduler;
pub use session::{EchoSession, SessionOptions};

/// TCP port both roles agree on.
pub const ECHO_SERVER_PORT: u16 = 9999;

/// Size of the client payload and of every echo buffer.
pub const BUFFERSIZE: usize = 20000;

/// Readiness events collected per poll.
pub const MAX_EVENTS: usize = 10;

/// Pending connections the listener queues before accepting.
pub const LISTEN_BACKLOG: i32 = 100;
