// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sliding time-window accumulator
//!
//! Keeps the `(timestamp, value)` samples that fall inside a trailing
//! window and answers running totals and averages over them. Drivers use it
//! for quantities such as "rain over the last 15 minutes" or "average
//! outdoor temperature over the last 12 hours".
//!
//! The window trails the newest timestamp seen so far. A sample is aged out
//! once `newest - window >= timestamp`; a sample that is already outside the
//! window when it arrives is ignored. Samples arriving out of order but
//! inside the window are inserted at their chronological position.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    timestamp: i64,
    value: f32,
}

/// Time-windowed sum and average over samples
#[derive(Debug, Clone)]
pub struct SlidingWindowAccumulator {
    window: i64,
    samples: VecDeque<Sample>,
    newest: Option<i64>,
}

impl SlidingWindowAccumulator {
    /// Create an accumulator covering the last `window_seconds` seconds.
    pub fn new(window_seconds: i64) -> Self {
        Self {
            window: window_seconds.max(1),
            samples: VecDeque::new(),
            newest: None,
        }
    }

    pub fn window_seconds(&self) -> i64 {
        self.window
    }

    /// Add a sample, age out samples the window has left behind.
    pub fn add_sample(&mut self, timestamp: i64, value: f32) {
        let newest = self.newest.map_or(timestamp, |n| n.max(timestamp));
        if newest - self.window >= timestamp {
            // Already older than the window: nothing to keep
            return;
        }
        self.newest = Some(newest);

        let position = self
            .samples
            .iter()
            .rposition(|s| s.timestamp <= timestamp)
            .map_or(0, |i| i + 1);
        self.samples.insert(position, Sample { timestamp, value });

        self.age_out(newest);
    }

    fn age_out(&mut self, reference: i64) {
        while let Some(front) = self.samples.front() {
            if reference - self.window >= front.timestamp {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Sum of the samples inside the window of the newest sample.
    pub fn total(&self) -> f32 {
        match self.newest {
            Some(newest) => self.total_at(newest),
            None => 0.0,
        }
    }

    /// Average of the samples inside the window of the newest sample, `0`
    /// when there are none.
    pub fn average(&self) -> f32 {
        match self.newest {
            Some(newest) => self.average_at(newest),
            None => 0.0,
        }
    }

    /// Sum of the samples inside the window ending at `now`.
    pub fn total_at(&self, now: i64) -> f32 {
        self.in_window(now).map(|s| s.value).sum()
    }

    /// Average of the samples inside the window ending at `now`.
    pub fn average_at(&self, now: i64) -> f32 {
        let (count, sum) = self
            .in_window(now)
            .fold((0usize, 0.0f32), |(count, sum), s| (count + 1, sum + s.value));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    fn in_window(&self, now: i64) -> impl Iterator<Item = &Sample> {
        let oldest_excluded = now - self.window;
        self.samples
            .iter()
            .filter(move |s| s.timestamp > oldest_excluded && s.timestamp <= now)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.newest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rain_window_drops_expired_sample() {
        let mut acc = SlidingWindowAccumulator::new(60);
        acc.add_sample(0, 0.01);
        acc.add_sample(30, 0.02);
        acc.add_sample(65, 0.00);

        assert_abs_diff_eq!(acc.total(), 0.02);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_empty_average_is_zero() {
        let acc = SlidingWindowAccumulator::new(600);
        assert_eq!(acc.average(), 0.0);
        assert_eq!(acc.total(), 0.0);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_expired_sample_is_never_resurrected() {
        let mut acc = SlidingWindowAccumulator::new(60);
        acc.add_sample(100, 1.0);
        acc.add_sample(200, 2.0);
        // Out of the window of the newest sample: ignored
        acc.add_sample(120, 5.0);
        assert_abs_diff_eq!(acc.total(), 2.0);

        // Late but still inside: inserted in order
        acc.add_sample(150, 3.0);
        assert_abs_diff_eq!(acc.total(), 5.0);
        assert_abs_diff_eq!(acc.average(), 2.5);
    }

    #[test]
    fn test_boundary_sample_is_aged_out() {
        let mut acc = SlidingWindowAccumulator::new(60);
        acc.add_sample(0, 1.0);
        acc.add_sample(60, 2.0);
        assert_eq!(acc.len(), 1);
        assert_abs_diff_eq!(acc.total(), 2.0);
    }

    #[test]
    fn test_total_at_later_time() {
        let mut acc = SlidingWindowAccumulator::new(60);
        acc.add_sample(10, 1.0);
        acc.add_sample(50, 2.0);
        assert_abs_diff_eq!(acc.total_at(100), 2.0);
        assert_abs_diff_eq!(acc.average_at(200), 0.0);

        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.total(), 0.0);
    }
}
