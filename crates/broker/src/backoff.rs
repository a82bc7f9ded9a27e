// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff with jitter, for reconnect loops.

use rand::Rng;
use std::time::Duration;

/// Fraction of the base delay randomized in each direction.
const JITTER: f64 = 0.2;

/// Exponential backoff: doubles from `min` up to `max`, each delay
/// jittered ±20% so a herd of reconnecting clients spreads out.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, current: min }
    }

    /// The next delay to sleep. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        jittered(base)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// The un-jittered delay the next call will be based on.
    pub fn current_base(&self) -> Duration {
        self.current
    }
}

fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
    base.mul_f64(factor)
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
