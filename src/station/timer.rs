// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Driver interface timer
//!
//! Each driver owns exactly one interface timer. Arming it again replaces
//! the previous deadline; the daemon sleeps until [`InterfaceTimer::deadline`]
//! and then calls the driver's `if_timer_expiry`.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default, Clone)]
pub struct InterfaceTimer {
    deadline: Option<Instant>,
}

impl InterfaceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, superseding any outstanding deadline.
    pub fn start(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and report whether the deadline had been reached.
    pub fn fire(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_deadline() {
        let mut timer = InterfaceTimer::new();
        assert!(!timer.is_armed());

        timer.start(Duration::from_secs(10));
        let first = timer.deadline().unwrap();
        timer.start(Duration::from_secs(1));
        assert!(timer.deadline().unwrap() < first);

        assert!(!timer.fire());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(timer.fire());
        assert!(!timer.is_armed());
    }
}
