//! Time sources and session-relative time bookkeeping.

use rustc_hash::FxHashMap;
use std::cell::Cell;
use std::time::Instant;
use thiserror::Error;

use crate::schema::instruction::ArcId;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimeError {
    #[error("invalid time value: {0} (must be finite and non-negative)")]
    InvalidTimeValue(f64),
}

/// Reject negative and non-finite millisecond values.
pub fn check_time(ms: f64) -> Result<f64, TimeError> {
    if ms.is_finite() && ms >= 0.0 {
        Ok(ms)
    } else {
        Err(TimeError::InvalidTimeValue(ms))
    }
}

/// A monotonic source of elapsed milliseconds since session start.
pub trait Clock {
    fn elapsed_ms(&self) -> f64;
}

/// Wall-clock backed source, anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn elapsed_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven source for tests and offline simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: f64) {
        self.now_ms.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Clock for ManualClock {
    fn elapsed_ms(&self) -> f64 {
        self.now_ms.get()
    }
}

#[derive(Debug, Clone, Copy)]
struct ArcTimer {
    started_at_ms: u64,
    duration_ms: u64,
}

/// Elapsed session time plus one elapsed counter per in-flight arc.
///
/// Session time never moves backwards; an earlier reading is ignored.
/// Arc counters saturate at the arc's declared duration.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    elapsed_ms: u64,
    arcs: FxHashMap<ArcId, ArcTimer>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Move session time forward to `now_ms`. Returns how far it moved.
    pub fn advance_to(&mut self, now_ms: f64) -> Result<u64, TimeError> {
        let now = check_time(now_ms)? as u64;
        let delta = now.saturating_sub(self.elapsed_ms);
        self.elapsed_ms = self.elapsed_ms.max(now);
        Ok(delta)
    }

    /// Back to zero with no arcs. Only valid at session start.
    pub fn reset(&mut self) {
        self.elapsed_ms = 0;
        self.arcs.clear();
    }

    /// Start counting for `id` from the current session time.
    pub fn start_arc(&mut self, id: ArcId, duration_ms: u64) {
        self.arcs.insert(
            id,
            ArcTimer {
                started_at_ms: self.elapsed_ms,
                duration_ms,
            },
        );
    }

    pub fn arc_elapsed_ms(&self, id: ArcId) -> Option<u64> {
        self.arcs.get(&id).map(|timer| {
            self.elapsed_ms
                .saturating_sub(timer.started_at_ms)
                .min(timer.duration_ms)
        })
    }

    /// Drop the counter for `id`. Returns false if it was not running.
    pub fn end_arc(&mut self, id: ArcId) -> bool {
        self.arcs.remove(&id).is_some()
    }

    pub fn active_arcs(&self) -> usize {
        self.arcs.len()
    }
}
