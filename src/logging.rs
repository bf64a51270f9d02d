//! Leveled logging capability handed to the echo roles.
//!
//! The session and its children never talk to a subscriber directly.
//! They call whatever `LogSink` they were built with, so a host can route
//! messages wherever it likes and tests can capture them.

use std::fmt;
use std::rc::Rc;
use tracing::Level;

/// Receives leveled log messages tagged with the handler that produced them.
pub trait LogSink {
    fn log(&self, level: Level, origin: &'static str, message: fmt::Arguments<'_>);
}

/// Shared handle to a sink. The session and both roles hold clones.
pub type SharedSink = Rc<dyn LogSink>;

/// Forwards every message to a `tracing` event at the same level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, origin: &'static str, message: fmt::Arguments<'_>) {
        match level {
            Level::ERROR => tracing::error!(origin, "{}", message),
            Level::WARN => tracing::warn!(origin, "{}", message),
            Level::INFO => tracing::info!(origin, "{}", message),
            Level::DEBUG => tracing::debug!(origin, "{}", message),
            Level::TRACE => tracing::trace!(origin, "{}", message),
        }
    }
}

/// Log through a sink with `format!`-style arguments.
macro_rules! emit {
    ($sink:expr, $level:expr, $origin:expr, $($arg:tt)+) => {
        $sink.log($level, $origin, format_args!($($arg)+))
    };
}

pub(crate) use emit;


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn test_emit_formats_arguments() {
        let sink = RecordingSink::shared();
        emit!(sink, Level::INFO, "unit", "echo progress: {} of {} bytes", 10, 20);

        assert!(sink.contains("echo progress: 10 of 20 bytes"));
        assert_eq!(sink.count_at(Level::INFO), 1);
        assert_eq!(sink.origins(), vec!["unit"]);
    }

    #[test]
    fn test_tracing_sink_accepts_every_level() {
        // No subscriber installed: events are dropped, but every arm must be callable.
        let sink = TracingSink;
        for level in [
            Level::ERROR,
            Level::WARN,
            Level::INFO,
            Level::DEBUG,
            Level::TRACE,
        ] {
            emit!(sink, level, "unit", "level {}", level);
        }
    }
}
