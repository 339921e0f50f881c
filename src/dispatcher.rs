//! Per-device event dispatcher and modifier-group state machine
//!
//! Holding a group trigger activates that group's overlay on top of the base
//! table. A trigger that is released quickly without any mapped key being
//! pressed in between acts as an ordinary keypress of its own code, in the
//! same way a dual-role key does.

use crate::error::Result;
use crate::event::{EventCode, KEY_DOWN, KEY_UP, RawEvent};
use crate::executor::Executor;
use crate::jitter::IdleClock;
use crate::mapping::{DeviceRemaps, MappingEntry, group_trigger};
use crate::sink::OutputHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A lone trigger released sooner than this is replayed as a tap
pub const GROUP_TAP_WINDOW: Duration = Duration::from_millis(300);

/// The modifier group currently held down
#[derive(Debug, Clone)]
pub struct ActiveGroup {
    pub name: String,
    pub trigger: EventCode,
    pub entered_at: Instant,
    /// Whether a mapped key was pressed while the group was active
    pub used: bool,
}

pub struct Dispatcher {
    remaps: Arc<DeviceRemaps>,
    executor: Executor,
    idle: IdleClock,
    group: Option<ActiveGroup>,
    /// Entries applied at press time, replayed on release
    pressed: HashMap<EventCode, Vec<MappingEntry>>,
}

impl Dispatcher {
    pub fn new(remaps: Arc<DeviceRemaps>, output: OutputHandle, idle: IdleClock) -> Self {
        Self {
            remaps,
            executor: Executor::new(output),
            idle,
            group: None,
            pressed: HashMap::new(),
        }
    }

    pub fn active_group(&self) -> Option<&ActiveGroup> {
        self.group.as_ref()
    }

    pub fn executor_mut(&mut self) -> &mut Executor {
        &mut self.executor
    }

    /// Process one physical event
    pub fn handle(&mut self, event: RawEvent) -> Result<()> {
        self.idle.touch();

        // The output side synchronizes after every event it writes
        if event.is_syn() {
            return Ok(());
        }
        if event.code.is_key() {
            self.handle_key(event)
        } else {
            self.handle_other(event)
        }
    }

    fn lookup(&self, code: EventCode) -> Option<Vec<MappingEntry>> {
        let group = self.group.as_ref().map(|g| g.name.as_str());
        self.remaps.lookup(group, code).map(<[MappingEntry]>::to_vec)
    }

    fn handle_key(&mut self, event: RawEvent) -> Result<()> {
        let code = event.code;

        if self.group.as_ref().is_some_and(|g| g.trigger == code) {
            if event.value == KEY_UP {
                self.leave_group()?;
            }
            // Autorepeat of a held trigger is swallowed
            return Ok(());
        }

        match event.value {
            KEY_DOWN => {
                let Some(entries) = self.lookup(code) else {
                    return self.forward_unmapped(event);
                };
                if let Some(group) = group_trigger(&entries) {
                    if self.group.is_none() {
                        self.enter_group(group.to_string(), code);
                        return Ok(());
                    }
                }
                if let Some(active) = self.group.as_mut() {
                    active.used = true;
                }
                self.pressed.insert(code, entries.clone());
                self.executor.apply(event, &entries)
            }
            KEY_UP => {
                let entries = match self.pressed.remove(&code) {
                    Some(entries) => entries,
                    None => match self.lookup(code) {
                        // Released trigger whose press never entered the group
                        Some(entries) if group_trigger(&entries).is_some() => {
                            return self.executor.forward(event);
                        }
                        Some(entries) => entries,
                        None => return self.forward_unmapped(event),
                    },
                };
                self.executor.apply(event, &entries)
            }
            _ => match self.pressed.get(&code).cloned().or_else(|| self.lookup(code)) {
                Some(entries) => self.executor.apply(event, &entries),
                None => self.forward_unmapped(event),
            },
        }
    }

    fn handle_other(&mut self, event: RawEvent) -> Result<()> {
        match self.lookup(event.code) {
            Some(entries) => self.executor.apply(event, &entries),
            None => self.forward_unmapped(event),
        }
    }

    fn forward_unmapped(&self, event: RawEvent) -> Result<()> {
        self.executor.forward(event)
    }

    fn enter_group(&mut self, name: String, trigger: EventCode) {
        debug!("Entering modifier group '{}' via {:?}", name, trigger);
        self.group = Some(ActiveGroup {
            name,
            trigger,
            entered_at: Instant::now(),
            used: false,
        });
    }

    fn leave_group(&mut self) -> Result<()> {
        let Some(group) = self.group.take() else {
            return Ok(());
        };
        let held = group.entered_at.elapsed();
        debug!(
            "Leaving modifier group '{}' after {:?} (used={})",
            group.name, held, group.used
        );
        if !group.used && held < GROUP_TAP_WINDOW {
            self.executor.output().tap(group.trigger)?;
        }
        Ok(())
    }

    /// Cancel every outstanding timer task and wait for them
    pub async fn shutdown(&mut self) {
        self.executor.shutdown().await;
        self.pressed.clear();
        self.group = None;
    }
}
