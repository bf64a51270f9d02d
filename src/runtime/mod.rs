//! Readiness-based networking runtime for the echo roles.
//!
//! Everything here is role-agnostic:
//! - `Multiplexer`: one mio poll instance per role
//! - `EchoBuffer`: offset bookkeeping for bytes read and echoed back
//! - `PeerRegistry`: accepted server connections keyed by poll token
//! - `socket`: non-blocking socket construction and host resolution

mod buffer;
mod connection;
mod mux;
pub mod socket;

pub(crate) use buffer::EchoBuffer;
pub(crate) use connection::{Peer, PeerRegistry, PeerState};
pub(crate) use mux::Multiplexer;

#[cfg(test)]
pub(crate) use buffer::testing;
