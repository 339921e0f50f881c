//! Normalized remapping tables
//!
//! These are the resolved, code-level tables the engine consumes. Parsing
//! names and validating combinations happens in [`crate::config`].

use crate::event::EventCode;
use evdev::EventType;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Repeat interval used when a repeat mapping does not set `rate`
pub const DEFAULT_RATE: Duration = Duration::from_millis(100);

/// One value in a Substitute's output sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSpec {
    Literal(i32),
    /// Per-tick displacement from the pointer acceleration curve
    PointerAccelPositive,
    /// Negated displacement from the same curve
    PointerAccelNegative,
}

/// How a Substitute is paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Emit the value sequence once per physical transition
    Immediate,
    /// Re-emit every `rate`; `count == 0` means until key-up
    Repeat { rate: Duration, count: u32 },
    /// Forward only every `count + 1`-th press
    Delay { count: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitute {
    pub code: u16,
    /// Output class; `None` keeps the class of the physical event
    pub kind: Option<EventType>,
    /// Empty means "the physical event's own value"
    pub values: Vec<ValueSpec>,
    pub timing: Timing,
}

impl Substitute {
    /// Resolve the output code for an event of class `source`
    pub fn target(&self, source: EventType) -> EventCode {
        EventCode::new(self.kind.unwrap_or(source), self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingEntry {
    Substitute(Substitute),
    /// Dual-role key: `hold` while held, plus a `tap` when released quickly
    TapHold { tap: u16, hold: u16 },
    Shell { command: String },
    /// Activates the named modifier group while held
    GroupTrigger { group: String },
    PassThrough,
}

impl MappingEntry {
    /// Plain code substitution, keeping the event class and value
    pub fn substitute(code: u16) -> Self {
        MappingEntry::Substitute(Substitute {
            code,
            kind: None,
            values: Vec::new(),
            timing: Timing::Immediate,
        })
    }
}

/// Source code → entries, applied in declaration order
pub type RemapTable = HashMap<EventCode, Vec<MappingEntry>>;

/// The group a sequence triggers, if its first entry is a group trigger
pub fn group_trigger(entries: &[MappingEntry]) -> Option<&str> {
    match entries.first() {
        Some(MappingEntry::GroupTrigger { group }) => Some(group),
        _ => None,
    }
}

/// Base table plus named modifier-group overlays for one device
#[derive(Debug, Clone, Default)]
pub struct DeviceRemaps {
    pub base: RemapTable,
    pub groups: HashMap<String, RemapTable>,
}

impl DeviceRemaps {
    pub fn new(base: RemapTable) -> Self {
        Self {
            base,
            groups: HashMap::new(),
        }
    }

    pub fn with_group(mut self, name: impl Into<String>, table: RemapTable) -> Self {
        self.groups.insert(name.into(), table);
        self
    }

    /// Look `code` up in the overlay formed by `group` over the base table
    pub fn lookup(&self, group: Option<&str>, code: EventCode) -> Option<&[MappingEntry]> {
        group
            .and_then(|name| self.groups.get(name))
            .and_then(|table| table.get(&code))
            .or_else(|| self.base.get(&code))
            .map(Vec::as_slice)
    }

    fn tables(&self) -> impl Iterator<Item = &RemapTable> {
        std::iter::once(&self.base).chain(self.groups.values())
    }

    /// Every code any entry can write to the output device
    pub fn emitted_codes(&self) -> BTreeSet<EventCode> {
        let mut codes = BTreeSet::new();
        for table in self.tables() {
            for (source, entries) in table {
                for entry in entries {
                    match entry {
                        MappingEntry::Substitute(sub) => {
                            codes.insert(sub.target(source.kind));
                        }
                        MappingEntry::TapHold { tap, hold } => {
                            codes.insert(EventCode::key(*tap));
                            codes.insert(EventCode::key(*hold));
                        }
                        MappingEntry::PassThrough => {
                            codes.insert(*source);
                        }
                        MappingEntry::Shell { .. } | MappingEntry::GroupTrigger { .. } => {}
                    }
                }
            }
        }
        codes
    }
}
