//! Pointer acceleration curve for relative-axis remaps
//!
//! Emulates an analog stick: the first tick after a pause moves at
//! [`MIN_SPEED`], then after [`ACCEL_DELAY`] the speed ramps linearly to
//! [`MAX_SPEED`] over the rest of [`ACCEL_TIME`].

use crate::event::EventCode;
use crate::mapping::ValueSpec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Units per second
pub const MIN_SPEED: f64 = 200.0;
/// Units per second
pub const MAX_SPEED: f64 = 1000.0;
pub const ACCEL_DELAY: Duration = Duration::from_millis(50);
/// Total ramp time, including [`ACCEL_DELAY`]
pub const ACCEL_TIME: Duration = Duration::from_millis(300);
/// Interval between ticks the curve is tuned for
pub const POINTER_RATE: Duration = Duration::from_millis(10);
/// A gap this long between calls restarts the ramp
pub const RETENTION: Duration = Duration::from_millis(20);

/// Acceleration state for one output axis
#[derive(Debug, Clone, Default)]
pub struct PointerAccel {
    last_access: Option<Instant>,
    ramp_start: Option<Instant>,
    speed: f64,
}

impl PointerAccel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the curve to `now` and return the per-tick displacement
    pub fn tick(&mut self, now: Instant) -> i32 {
        let stale = self
            .last_access
            .is_none_or(|last| now.saturating_duration_since(last) >= RETENTION);
        if stale {
            self.speed = MIN_SPEED;
            self.ramp_start = Some(now);
        }

        let elapsed = self
            .ramp_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        if elapsed > ACCEL_DELAY {
            let ramp = (ACCEL_TIME - ACCEL_DELAY).as_secs_f64();
            let ramped = (elapsed - ACCEL_DELAY).as_secs_f64() * (MAX_SPEED - MIN_SPEED) / ramp;
            self.speed = (MIN_SPEED + ramped).min(MAX_SPEED);
        }

        self.last_access = Some(now);
        (self.speed / 1000.0 * POINTER_RATE.as_millis() as f64).floor() as i32
    }
}

/// Per-axis acceleration state for a session.
///
/// The positive and negative generators of an axis share one
/// [`PointerAccel`], so both directions speed up and slow down together.
#[derive(Debug, Clone, Default)]
pub struct AccelBank {
    axes: Arc<Mutex<HashMap<EventCode, PointerAccel>>>,
}

impl AccelBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `spec` for output axis `axis` at the current time
    pub fn resolve(&self, axis: EventCode, spec: ValueSpec) -> i32 {
        match spec {
            ValueSpec::Literal(value) => value,
            ValueSpec::PointerAccelPositive => self.tick(axis),
            ValueSpec::PointerAccelNegative => -self.tick(axis),
        }
    }

    fn tick(&self, axis: EventCode) -> i32 {
        let mut axes = self.axes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        axes.entry(axis).or_default().tick(Instant::now())
    }
}
