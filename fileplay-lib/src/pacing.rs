//! Wall-clock pacing
//!
//! Target emission time of a unit is
//!
//! ```text
//! run start + total time paused + lag[kind] + pts
//! ```
//!
//! Each media kind has its own lag, grown only when the worker falls further
//! behind than the catch-up tolerance; that rebases the kind instead of
//! bursting out everything that is overdue. Targets never move backwards
//! within a kind.
//!
//! The clock takes `Instant`s from the caller so the arithmetic can be tested
//! without sleeping.

use std::time::{Duration, Instant};

use crate::types::MediaKind;

/// When a unit should go out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Now,
    At(Instant),
}

#[derive(Debug)]
pub struct PlaybackClock {
    start: Instant,
    tolerance: Duration,
    paused_total: Duration,
    pause_started: Option<Instant>,
    lag: [Duration; 2],
    last_target: [Option<Instant>; 2],
    rebases: u64,
}

impl PlaybackClock {
    pub fn new(start: Instant, tolerance: Duration) -> Self {
        Self {
            start,
            tolerance,
            paused_total: Duration::ZERO,
            pause_started: None,
            lag: [Duration::ZERO; 2],
            last_target: [None; 2],
            rebases: 0,
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.pause_started.is_none() {
            self.pause_started = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(since) = self.pause_started.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }

    /// Time spent paused so far, including a pause still in progress.
    pub fn paused_total(&self, now: Instant) -> Duration {
        let running = self
            .pause_started
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.paused_total + running
    }

    /// Number of times a kind's clock was rebased after a stall
    pub fn rebases(&self) -> u64 {
        self.rebases
    }

    /// Unclamped target for `pts`.
    pub fn target(&self, kind: MediaKind, pts: Duration) -> Instant {
        self.start + self.paused_total + self.lag[kind.slot()] + pts
    }

    /// Decide when a unit with `pts` is due, as seen at `now`.
    ///
    /// Units without a timestamp go out immediately.
    pub fn schedule(&mut self, kind: MediaKind, pts: Option<Duration>, now: Instant) -> Due {
        let Some(pts) = pts else {
            return Due::Now;
        };
        let slot = kind.slot();

        let mut target = self.target(kind, pts);
        if let Some(last) = self.last_target[slot] {
            target = target.max(last);
        }

        let late = now.saturating_duration_since(target);
        if late > self.tolerance {
            self.lag[slot] += late;
            self.rebases += 1;
            tracing::debug!(
                %kind,
                late_ms = late.as_millis() as u64,
                lag_ms = self.lag[slot].as_millis() as u64,
                "pacing clock rebased"
            );
            target = now;
        }
        self.last_target[slot] = Some(target);

        if target > now {
            Due::At(target)
        } else {
            Due::Now
        }
    }
}

/// Sleep until `deadline` in slices of at most `poll`.
///
/// `interrupted` is checked before every slice; returns `false` as soon as it
/// reports true, `true` once the deadline has passed.
pub fn wait_until(
    deadline: Instant,
    poll: Duration,
    mut interrupted: impl FnMut() -> bool,
) -> bool {
    loop {
        if interrupted() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(poll));
    }
}
