//! Fixed-interval tick driver standing in for the host scheduler.

use crate::echo::EchoSession;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Calls `EchoSession::tick` at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
    max_ticks: Option<u64>,
}

impl Scheduler {
    pub fn new(interval: Duration, max_ticks: Option<u64>) -> Self {
        Self {
            interval,
            max_ticks,
        }
    }

    /// Tick until the session finishes or the tick cap is reached.
    ///
    /// Returns the number of ticks run.
    pub fn run(&self, session: &mut EchoSession) -> u64 {
        let mut ticks = 0u64;
        while !session.is_finished() {
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                info!(ticks, "tick limit reached");
                break;
            }
            session.tick();
            ticks += 1;
            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }
        debug!(ticks, finished = session.is_finished(), "scheduler stopped");
        ticks
    }
}
