// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retry and interval timing primitives
//!
//! Both are pure bookkeeping over a monotonic clock: nothing here sleeps,
//! and readiness checks have no side effects.

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETRY_COOLDOWN_MS};
use std::time::{Duration, Instant};

// ============================================================================
// RETRY TIMER
// ============================================================================

/// Paces retransmissions of at-most-one in-flight request per owner.
///
/// `trigger()` arms the timer so the very next `ready()` succeeds (fresh
/// local write, bus reset). `reset()` records "just sent" and establishes a
/// cooldown before the next attempt.
#[derive(Debug, Clone)]
pub struct RetryTimer {
    next_ready: Instant,
    cooldown: Duration,
}

impl RetryTimer {
    /// Create a timer with the default cooldown.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cooldown(Duration::from_millis(DEFAULT_RETRY_COOLDOWN_MS))
    }

    /// Create a timer with a custom cooldown.
    #[must_use]
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            next_ready: Instant::now(),
            cooldown,
        }
    }

    /// Arm the timer: the next `ready()` check succeeds immediately.
    pub fn trigger(&mut self) {
        self.next_ready = Instant::now();
    }

    /// Record "just sent" and start the cooldown.
    pub fn reset(&mut self) {
        self.next_ready = Instant::now() + self.cooldown;
    }

    /// True iff the cooldown has elapsed or a `trigger()` is pending.
    #[must_use]
    pub fn ready(&self) -> bool {
        Instant::now() >= self.next_ready
    }

    /// Configured cooldown between attempts.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for RetryTimer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// INTERVAL
// ============================================================================

/// Fixed-cadence companion to [`RetryTimer`], used for periodic duties such
/// as the controller's discovery poll.
#[derive(Debug, Clone)]
pub struct Interval {
    next_fire: Instant,
    period: Duration,
}

impl Interval {
    /// Create an interval with the default discovery-poll period.
    #[must_use]
    pub fn new() -> Self {
        Self::with_period(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Create an interval with a custom period. The first firing is due
    /// immediately.
    #[must_use]
    pub fn with_period(period: Duration) -> Self {
        Self {
            next_fire: Instant::now(),
            period,
        }
    }

    /// True iff the interval is due.
    #[must_use]
    pub fn ready(&self) -> bool {
        Instant::now() >= self.next_fire
    }

    /// Check-and-advance: returns true once per elapsed period.
    pub fn tick(&mut self) -> bool {
        if self.ready() {
            self.next_fire = Instant::now() + self.period;
            true
        } else {
            false
        }
    }

    /// Force the next `tick()` to fire.
    pub fn trigger(&mut self) {
        self.next_fire = Instant::now();
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
