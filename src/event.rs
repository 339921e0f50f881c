//! Event codes and raw events as seen by the remapping engine

use evdev::{EventType, InputEvent, Key, RelativeAxisType};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

/// Key value for a press
pub const KEY_DOWN: i32 = 1;
/// Key value for a release
pub const KEY_UP: i32 = 0;
/// Key value the kernel uses for autorepeat
pub const KEY_REPEAT: i32 = 2;

/// An (event class, code) pair, e.g. `(KEY, KEY_A)` or `(RELATIVE, REL_WHEEL)`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EventCode {
    pub kind: EventType,
    pub code: u16,
}

impl EventCode {
    pub const fn new(kind: EventType, code: u16) -> Self {
        Self { kind, code }
    }

    pub const fn key(code: u16) -> Self {
        Self::new(EventType::KEY, code)
    }

    pub const fn rel(code: u16) -> Self {
        Self::new(EventType::RELATIVE, code)
    }

    pub fn is_key(&self) -> bool {
        self.kind == EventType::KEY
    }
}

// evdev's EventType is only comparable for equality, so order and hash on
// the raw class number
impl Hash for EventCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.kind.0, self.code).hash(state);
    }
}

impl Ord for EventCode {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.kind.0, self.code).cmp(&(other.kind.0, other.code))
    }
}

impl PartialOrd for EventCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventType::KEY => write!(f, "{:?}", Key::new(self.code)),
            EventType::RELATIVE => write!(f, "{:?}", RelativeAxisType(self.code)),
            kind => write!(f, "{:?}:{}", kind, self.code),
        }
    }
}

/// One input event, detached from the evdev wire struct so the engine can be
/// driven without a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub code: EventCode,
    pub value: i32,
    pub time: SystemTime,
}

impl RawEvent {
    pub fn new(code: EventCode, value: i32) -> Self {
        Self {
            code,
            value,
            time: SystemTime::now(),
        }
    }

    /// Same event with a different value
    pub fn with_value(self, value: i32) -> Self {
        Self { value, ..self }
    }

    /// Same event with a different code
    pub fn with_code(self, code: EventCode) -> Self {
        Self { code, ..self }
    }

    pub fn is_syn(&self) -> bool {
        self.code.kind == EventType::SYNCHRONIZATION
    }

    pub fn to_input_event(&self) -> InputEvent {
        InputEvent::new(self.code.kind, self.code.code, self.value)
    }
}

impl From<InputEvent> for RawEvent {
    fn from(ev: InputEvent) -> Self {
        Self {
            code: EventCode::new(ev.event_type(), ev.code()),
            value: ev.value(),
            time: ev.timestamp(),
        }
    }
}
