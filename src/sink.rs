//! Output side: the virtual uinput device and the shared handle every task
//! writes through.

use crate::error::{RemapError, Result};
use crate::event::{EventCode, KEY_DOWN, KEY_UP, RawEvent};
use crate::mapping::DeviceRemaps;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AttributeSet, Device, EventType, InputEvent, Key, MiscType, RelativeAxisType, UinputAbsSetup};
use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// A destination for remapped events.
///
/// Events written with [`EventSink::write_event`] become visible to readers
/// only once [`EventSink::syn`] is called.
pub trait EventSink: Send {
    fn write_event(&mut self, event: RawEvent) -> io::Result<()>;

    /// Terminate the current frame with a synchronization marker
    fn syn(&mut self) -> io::Result<()>;
}

/// uinput-backed sink; buffers a frame and flushes it on `syn`
pub struct UinputSink {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
}

impl UinputSink {
    pub fn new(device: VirtualDevice) -> Self {
        Self {
            device,
            pending: Vec::with_capacity(8),
        }
    }

    /// Build a virtual device whose capabilities are the union of the input
    /// device's and everything `remaps` can emit.
    pub fn create(name: &str, input: &Device, remaps: &DeviceRemaps) -> Result<Self> {
        let native = Capabilities {
            keys: input
                .supported_keys()
                .map(|k| k.iter().map(|key| key.code()).collect())
                .unwrap_or_default(),
            rel: input
                .supported_relative_axes()
                .map(|r| r.iter().map(|axis| axis.0).collect())
                .unwrap_or_default(),
            misc: input
                .misc_properties()
                .map(|m| m.iter().map(|msc| msc.0).collect())
                .unwrap_or_default(),
        };
        let caps = Capabilities::union(native, remaps);

        let mut keys: AttributeSet<Key> = AttributeSet::new();
        for code in &caps.keys {
            keys.insert(Key::new(*code));
        }
        let mut rel: AttributeSet<RelativeAxisType> = AttributeSet::new();
        for code in &caps.rel {
            rel.insert(RelativeAxisType(*code));
        }
        let mut misc: AttributeSet<MiscType> = AttributeSet::new();
        for code in &caps.misc {
            misc.insert(MiscType(*code));
        }

        info!(
            "Creating virtual device '{}' with {} keys, {} relative axes and {} misc codes",
            name,
            caps.keys.len(),
            caps.rel.len(),
            caps.misc.len()
        );

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(RemapError::VirtualDevice)?
            .name(name)
            .with_keys(&keys)
            .map_err(RemapError::VirtualDevice)?
            .with_relative_axes(&rel)
            .map_err(RemapError::VirtualDevice)?;
        if !caps.misc.is_empty() {
            builder = builder.with_msc(&misc).map_err(RemapError::VirtualDevice)?;
        }

        // Absolute axes are never remap targets, so they are copied from the
        // input with its ranges
        if let Some(axes) = input.supported_absolute_axes() {
            let state = input.get_abs_state().map_err(RemapError::VirtualDevice)?;
            for axis in axes.iter() {
                let info = &state[axis.0 as usize];
                let setup = UinputAbsSetup::new(
                    axis,
                    AbsInfo::new(info.value, info.minimum, info.maximum, info.fuzz, info.flat, info.resolution),
                );
                debug!("Copying absolute axis {:?}", axis);
                builder = builder.with_absolute_axis(&setup).map_err(RemapError::VirtualDevice)?;
            }
        }

        let device = builder.build().map_err(RemapError::VirtualDevice)?;
        Ok(Self::new(device))
    }
}

impl EventSink for UinputSink {
    fn write_event(&mut self, event: RawEvent) -> io::Result<()> {
        self.pending.push(event.to_input_event());
        Ok(())
    }

    fn syn(&mut self) -> io::Result<()> {
        // emit() appends the SYN_REPORT itself
        let result = self.device.emit(&self.pending);
        self.pending.clear();
        result
    }
}

/// Key, relative-axis and misc codes the virtual device must declare
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub keys: BTreeSet<u16>,
    pub rel: BTreeSet<u16>,
    pub misc: BTreeSet<u16>,
}

impl Capabilities {
    /// Axes every output device gets, so pointer remaps and the idle jitter
    /// always have somewhere to go
    pub const BASE_REL_AXES: [RelativeAxisType; 4] = [
        RelativeAxisType::REL_X,
        RelativeAxisType::REL_Y,
        RelativeAxisType::REL_WHEEL,
        RelativeAxisType::REL_HWHEEL,
    ];

    /// `native` plus the base axes plus every code `remaps` can emit
    pub fn union(native: Capabilities, remaps: &DeviceRemaps) -> Self {
        let mut caps = native;
        caps.rel.extend(Self::BASE_REL_AXES.iter().map(|axis| axis.0));
        for code in remaps.emitted_codes() {
            match code.kind {
                EventType::KEY => {
                    caps.keys.insert(code.code);
                }
                EventType::RELATIVE => {
                    caps.rel.insert(code.code);
                }
                EventType::MISC => {
                    caps.misc.insert(code.code);
                }
                _ => {}
            }
        }
        caps
    }
}

/// Cloneable, serialized access to one session's output sink.
///
/// Every write takes the lock for the whole frame, so an event and its
/// synchronization marker are never split by another task's write.
#[derive(Clone)]
pub struct OutputHandle {
    sink: Arc<Mutex<dyn EventSink>>,
}

impl OutputHandle {
    pub fn new<S: EventSink + 'static>(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, dyn EventSink + 'static> {
        // Frames are only flushed on syn, so a poisoned sink holds no partial frame
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write one event followed by a sync marker
    pub fn emit(&self, event: RawEvent) -> Result<()> {
        self.emit_all(&[event])
    }

    /// Write each event followed by its own sync marker, all under one lock
    pub fn emit_all(&self, events: &[RawEvent]) -> Result<()> {
        let mut sink = self.lock();
        write_frames(&mut *sink, events)
    }

    /// Like [`emit_all`](Self::emit_all), but skip the write entirely if
    /// `stop` is set by the time the lock is held.
    ///
    /// Returns `Ok(false)` when skipped.
    pub fn emit_all_unless(&self, stop: &AtomicBool, events: &[RawEvent]) -> Result<bool> {
        let mut sink = self.lock();
        if stop.load(Ordering::SeqCst) {
            return Ok(false);
        }
        write_frames(&mut *sink, events)?;
        Ok(true)
    }

    /// Press and release `code`, each in its own frame
    pub fn tap(&self, code: EventCode) -> Result<()> {
        let press = RawEvent::new(code, KEY_DOWN);
        self.emit_all(&[press, press.with_value(KEY_UP)])
    }
}

fn write_frames(sink: &mut dyn EventSink, events: &[RawEvent]) -> Result<()> {
    for event in events {
        debug!("OUT {:?} value={}", event.code, event.value);
        sink.write_event(*event).map_err(RemapError::OutputWrite)?;
        sink.syn().map_err(RemapError::OutputWrite)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sink for driving the engine in tests

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Written {
        Event(EventCode, i32),
        Syn,
    }

    #[derive(Clone, Default)]
    pub struct RecordingSink {
        log: Arc<Mutex<Vec<Written>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn written(&self) -> Vec<Written> {
            self.log.lock().unwrap().clone()
        }

        /// Written events with the sync markers stripped
        pub fn events(&self) -> Vec<(EventCode, i32)> {
            self.written()
                .into_iter()
                .filter_map(|w| match w {
                    Written::Event(code, value) => Some((code, value)),
                    Written::Syn => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.log.lock().unwrap().clear();
        }

        /// Make every later write fail, as if the uinput device vanished
        pub fn fail_writes(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> io::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
            } else {
                Ok(())
            }
        }
    }

    impl EventSink for RecordingSink {
        fn write_event(&mut self, event: RawEvent) -> io::Result<()> {
            self.check()?;
            self.log.lock().unwrap().push(Written::Event(event.code, event.value));
            Ok(())
        }

        fn syn(&mut self) -> io::Result<()> {
            self.check()?;
            self.log.lock().unwrap().push(Written::Syn);
            Ok(())
        }
    }

    pub fn recording_output() -> (OutputHandle, RecordingSink) {
        let sink = RecordingSink::new();
        (OutputHandle::new(sink.clone()), sink)
    }
}
