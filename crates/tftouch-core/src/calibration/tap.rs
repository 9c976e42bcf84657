//! Wait for a tap with a deadline.

use embassy_time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    Pending,
    Tapped,
    TimedOut,
}

/// Detects a fresh tap before a deadline.
///
/// A press that is already held when the wait starts does not count; the
/// panel has to be released first.
#[derive(Debug, Clone, Copy)]
pub struct TapOrTimeout {
    deadline: Instant,
    armed: bool,
}

impl TapOrTimeout {
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            deadline: now + window,
            armed: false,
        }
    }

    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn step(&mut self, now: Instant, pressed: bool) -> TapOutcome {
        if pressed && self.armed {
            return TapOutcome::Tapped;
        }
        if !pressed {
            self.armed = true;
        }
        if now >= self.deadline {
            TapOutcome::TimedOut
        } else {
            TapOutcome::Pending
        }
    }
}
