//! Error taxonomy for session, client and server construction.
//!
//! Would-block results never become an `EchoError`: the handlers treat
//! them as "nothing more to do this tick" and return early.

use std::io;
use thiserror::Error;

/// Errors raised while building the echo roles or their multiplexers.
#[derive(Error, Debug)]
pub enum EchoError {
    /// The OS could not allocate a socket or a readiness set.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[source] io::Error),

    /// Registering or updating interest for a socket failed.
    #[error("interest registration failed: {0}")]
    Registration(#[source] io::Error),

    /// A connect, bind or listen step failed during construction.
    #[error("connection setup failed in {stage}: {source}")]
    ConnectionSetup {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// Bad mode token, missing argument or unresolvable host.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl EchoError {
    pub(crate) fn setup(stage: &'static str, source: io::Error) -> Self {
        EchoError::ConnectionSetup { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_names_stage() {
        let err = EchoError::setup(
            "bind",
            io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        );
        assert_eq!(
            err.to_string(),
            "connection setup failed in bind: address in use"
        );
    }

    #[test]
    fn test_invalid_configuration_message() {
        let err = EchoError::InvalidConfiguration("unknown mode 'bogus'".into());
        assert_eq!(err.to_string(), "invalid configuration: unknown mode 'bogus'");
    }
}
