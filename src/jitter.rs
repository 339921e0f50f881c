//! Anti-idle pointer jitter
//!
//! After [`IDLE_THRESHOLD`] without physical input, nudges the pointer one
//! unit right and back once per [`JITTER_INTERVAL`].

use crate::event::{EventCode, RawEvent};
use crate::sink::OutputHandle;
use crate::timer::TimerHandle;
use evdev::RelativeAxisType;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub const IDLE_THRESHOLD: Duration = Duration::from_secs(5);
pub const JITTER_INTERVAL: Duration = Duration::from_secs(1);

/// Time of the last physical event on a device, shared between the
/// dispatcher (which refreshes it) and the jitter task (which reads it)
#[derive(Debug, Clone)]
pub struct IdleClock {
    last: Arc<Mutex<Instant>>,
}

impl IdleClock {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .elapsed()
    }
}

impl Default for IdleClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the jitter task for one output device
pub fn spawn(output: OutputHandle, idle: IdleClock) -> TimerHandle {
    TimerHandle::spawn(move |stop| run(output, idle, stop))
}

async fn run(output: OutputHandle, idle: IdleClock, stop: Arc<AtomicBool>) {
    let rel_x = EventCode::rel(RelativeAxisType::REL_X.0);
    let pulse = [RawEvent::new(rel_x, 1), RawEvent::new(rel_x, -1)];

    let mut ticker = tokio::time::interval(JITTER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if idle.idle_for() <= IDLE_THRESHOLD {
            continue;
        }
        debug!("Idle for {:?}, emitting jitter", idle.idle_for());
        match output.emit_all_unless(&stop, &pulse) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("Idle jitter stopped: {e}");
                return;
            }
        }
    }
}
