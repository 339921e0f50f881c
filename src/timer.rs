//! Cancellable repeat tasks and delay dividers
//!
//! A repeat task re-emits a value sequence on a fixed interval, either until
//! the key is released (`count == 0`) or for a fixed number of cycles. At most
//! one task runs per source code; starting a new one cancels the old one.

use crate::accel::AccelBank;
use crate::event::{EventCode, RawEvent};
use crate::mapping::ValueSpec;
use crate::sink::OutputHandle;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owned handle to a spawned background task
pub struct TimerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn `task`, handing it the stop flag it must honor
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let join = tokio::spawn(task(stop.clone()));
        Self { stop, join }
    }

    /// Stop the task. Once this returns the task performs no further writes.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to wind down after [`cancel`](Self::cancel)
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            if !e.is_cancelled() {
                warn!("background task failed: {e}");
            }
        }
    }
}

/// What one repeat task emits, each cycle
#[derive(Debug, Clone)]
pub struct RepeatJob {
    pub target: EventCode,
    pub values: Vec<ValueSpec>,
    pub rate: Duration,
    /// Number of cycles; 0 repeats until cancelled
    pub count: u32,
}

/// Live repeat tasks keyed by physical source code
#[derive(Default)]
pub struct RepeatRegistry {
    tasks: HashMap<EventCode, TimerHandle>,
}

impl RepeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever runs for `source` and start `job` in its place
    pub fn start(&mut self, source: EventCode, job: RepeatJob, output: OutputHandle, accel: AccelBank) {
        self.cancel(source);
        debug!("Starting repeat for {:?}: {:?}", source, job);
        let handle = TimerHandle::spawn(move |stop| run_repeat(job, output, accel, stop));
        self.tasks.insert(source, handle);
    }

    /// Cancel the task for `source`, if any. Returns whether one was live.
    pub fn cancel(&mut self, source: EventCode) -> bool {
        self.prune();
        match self.tasks.remove(&source) {
            Some(handle) => {
                handle.cancel();
                debug!("Cancelled repeat for {:?}", source);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&mut self, source: EventCode) -> bool {
        self.prune();
        self.tasks.contains_key(&source)
    }

    pub fn active_count(&mut self) -> usize {
        self.prune();
        self.tasks.len()
    }

    /// Cancel every task and wait for them to exit
    pub async fn shutdown(&mut self) {
        let tasks: Vec<TimerHandle> = self.tasks.drain().map(|(_, handle)| handle).collect();
        for handle in &tasks {
            handle.cancel();
        }
        for handle in tasks {
            handle.join().await;
        }
    }

    /// Drop entries for tasks that ran out their count
    fn prune(&mut self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }
}

async fn run_repeat(job: RepeatJob, output: OutputHandle, accel: AccelBank, stop: Arc<AtomicBool>) {
    let mut remaining = job.count;
    loop {
        let events: Vec<RawEvent> = job
            .values
            .iter()
            .map(|spec| RawEvent::new(job.target, accel.resolve(job.target, *spec)))
            .collect();
        match output.emit_all_unless(&stop, &events) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("Repeat for {:?} stopped: {e}", job.target);
                return;
            }
        }

        if job.count > 0 {
            remaining -= 1;
            if remaining == 0 {
                return;
            }
        }
        tokio::time::sleep(job.rate).await;
    }
}

/// Per-code countdown that forwards only every `count + 1`-th press
#[derive(Debug, Default)]
pub struct DelayDivider {
    countdown: HashMap<EventCode, u32>,
}

impl DelayDivider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a press of `source`; returns whether it should be forwarded
    pub fn press(&mut self, source: EventCode, count: u32) -> bool {
        let left = self.countdown.entry(source).or_insert(count);
        if *left == 0 {
            *left = count;
            true
        } else {
            *left -= 1;
            false
        }
    }

    /// A release is forwarded only right after a forwarded press
    pub fn release(&self, source: EventCode, count: u32) -> bool {
        self.countdown.get(&source) == Some(&count)
    }
}
