//! echo-workload: synthetic TCP traffic for exercising a network simulator
//!
//! Roles:
//! - client: connects, sends one random payload, verifies the echo
//! - server: accepts peers and echoes their bytes back
//! - loopback: both roles over 127.0.0.1
//!
//! Every socket is non-blocking and every poll has a zero timeout, so a
//! tick always returns promptly. Configuration via CLI arguments or TOML file.

mod config;
mod echo;
mod error;
mod logging;
mod runtime;

use config::Config;
use echo::{EchoSession, Scheduler};
use logging::{SharedSink, TracingSink};
use std::rc::Rc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        args = ?config.args,
        port = config.session.port,
        buffer_size = config.session.buffer_size,
        shared_server_buffer = config.session.shared_server_buffer,
        close_listener_on_peer_eof = config.session.close_listener_on_peer_eof,
        "Starting echo workload"
    );

    let sink: SharedSink = Rc::new(TracingSink);
    let mut session = EchoSession::new(&config.args, &config.session, sink)?;

    let ticks = Scheduler::new(config.tick_interval, config.max_ticks).run(&mut session);

    match session.client() {
        Some(client) => match client.state().verdict() {
            Some(verdict) => info!(
                ticks,
                server = %client.server(),
                ?verdict,
                "Echo exchange finished"
            ),
            None => warn!(
                ticks,
                server = %client.server(),
                phase = ?client.state().phase(),
                sent = client.state().amount_sent(),
                received = client.state().recv_offset(),
                "Echo exchange did not complete"
            ),
        },
        None => info!(ticks, "Server stopped"),
    }

    if let Some(server) = session.server() {
        info!(
            addr = %server.local_addr(),
            listening = server.is_listening(),
            peers = server.peer_count(),
            offsets = ?server.offsets(),
            "Server state at shutdown"
        );
    }

    Ok(())
}
