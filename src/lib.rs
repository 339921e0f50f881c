//! remapd - input event remapping daemon for Linux
//!
//! Grabs physical input devices through evdev and replays a transformed
//! event stream through uinput virtual devices.

pub mod accel;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod executor;
pub mod jitter;
pub mod mapping;
pub mod session;
pub mod sink;
pub mod tap_hold;
pub mod timer;

pub use config::{Config, ConfigError, DeviceConfig};
pub use dispatcher::Dispatcher;
pub use error::RemapError;
pub use event::{EventCode, RawEvent};
pub use mapping::{DeviceRemaps, MappingEntry, RemapTable, Substitute, Timing, ValueSpec};
pub use session::SessionHandle;
pub use sink::{Capabilities, EventSink, OutputHandle};
