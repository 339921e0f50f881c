//! Applies mapping entries to physical events
//!
//! The [`Executor`] owns every per-session registry the entries need
//! (repeat tasks, delay countdowns, dual-role press times, acceleration
//! state), so one instance per device session is the whole of its mutable
//! remapping state outside the dispatcher.

use crate::accel::AccelBank;
use crate::error::Result;
use crate::event::{KEY_DOWN, KEY_UP, RawEvent};
use crate::mapping::{MappingEntry, Substitute, Timing, ValueSpec};
use crate::sink::OutputHandle;
use crate::tap_hold::TapHoldResolver;
use crate::timer::{DelayDivider, RepeatJob, RepeatRegistry};
use std::process::Command;
use tracing::debug;

pub struct Executor {
    output: OutputHandle,
    accel: AccelBank,
    repeats: RepeatRegistry,
    delays: DelayDivider,
    tap_hold: TapHoldResolver,
}

impl Executor {
    pub fn new(output: OutputHandle) -> Self {
        Self {
            output,
            accel: AccelBank::new(),
            repeats: RepeatRegistry::new(),
            delays: DelayDivider::new(),
            tap_hold: TapHoldResolver::new(),
        }
    }

    pub fn output(&self) -> &OutputHandle {
        &self.output
    }

    /// Forward `event` untouched
    pub fn forward(&self, event: RawEvent) -> Result<()> {
        self.output.emit(event)
    }

    /// Apply every entry of a mapping sequence to `event`, in order
    pub fn apply(&mut self, event: RawEvent, entries: &[MappingEntry]) -> Result<()> {
        for entry in entries {
            self.apply_entry(event, entry)?;
        }
        Ok(())
    }

    fn apply_entry(&mut self, event: RawEvent, entry: &MappingEntry) -> Result<()> {
        match entry {
            MappingEntry::Substitute(sub) => self.substitute(event, sub),
            MappingEntry::TapHold { tap, hold } => self.tap_hold.apply(&self.output, event, *tap, *hold),
            MappingEntry::Shell { command } => {
                if !event.code.is_key() || event.value == KEY_DOWN {
                    run_shell(command);
                }
                Ok(())
            }
            MappingEntry::PassThrough => self.forward(event),
            // Nested trigger while another group is active
            MappingEntry::GroupTrigger { .. } => Ok(()),
        }
    }

    fn substitute(&mut self, event: RawEvent, sub: &Substitute) -> Result<()> {
        let target = sub.target(event.code.kind);
        let out = event.with_code(target);

        match sub.timing {
            Timing::Immediate => {
                if sub.values.is_empty() {
                    return self.output.emit(out);
                }
                let events: Vec<RawEvent> = sub
                    .values
                    .iter()
                    .map(|spec| out.with_value(self.accel.resolve(target, *spec)))
                    .collect();
                self.output.emit_all(&events)
            }
            Timing::Repeat { rate, count } => {
                match event.value {
                    KEY_DOWN => {
                        let values = if sub.values.is_empty() {
                            vec![ValueSpec::Literal(event.value)]
                        } else {
                            sub.values.clone()
                        };
                        let job = RepeatJob {
                            target,
                            values,
                            rate,
                            count,
                        };
                        self.repeats
                            .start(event.code, job, self.output.clone(), self.accel.clone());
                    }
                    // Counted repeats run to completion regardless of release
                    KEY_UP if count == 0 => {
                        self.repeats.cancel(event.code);
                    }
                    _ => {}
                }
                Ok(())
            }
            Timing::Delay { count } => {
                let forward = match event.value {
                    KEY_DOWN => self.delays.press(event.code, count),
                    KEY_UP => self.delays.release(event.code, count),
                    _ => false,
                };
                if forward {
                    self.output.emit(out)?;
                }
                Ok(())
            }
        }
    }

    pub fn repeats_mut(&mut self) -> &mut RepeatRegistry {
        &mut self.repeats
    }

    /// Cancel all repeat tasks and wait for them to exit
    pub async fn shutdown(&mut self) {
        self.repeats.shutdown().await;
    }
}

/// Run `command` through `sh -c`, blocking until it exits. The outcome is
/// only logged.
fn run_shell(command: &str) {
    debug!("Running shell command: {command}");
    match Command::new("sh").arg("-c").arg(command).status() {
        Ok(status) if !status.success() => debug!("Shell command exited with {status}: {command}"),
        Ok(_) => {}
        Err(e) => debug!("Failed to run shell command '{command}': {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventCode;
    use crate::sink::testing::{Written, recording_output};
    use evdev::{EventType, Key, RelativeAxisType};
    use std::time::Duration;

    fn key(k: Key) -> EventCode {
        EventCode::key(k.code())
    }

    fn press(k: Key) -> RawEvent {
        RawEvent::new(key(k), KEY_DOWN)
    }

    fn release(k: Key) -> RawEvent {
        RawEvent::new(key(k), KEY_UP)
    }

    fn wheel_up() -> MappingEntry {
        MappingEntry::Substitute(Substitute {
            code: RelativeAxisType::REL_WHEEL.0,
            kind: Some(EventType::RELATIVE),
            values: vec![ValueSpec::Literal(1)],
            timing: Timing::Immediate,
        })
    }

    #[test]
    fn test_plain_substitute_keeps_value() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [MappingEntry::substitute(Key::KEY_ESC.code())];

        exec.apply(press(Key::KEY_CAPSLOCK), &entries).unwrap();
        exec.apply(release(Key::KEY_CAPSLOCK), &entries).unwrap();
        assert_eq!(sink.events(), vec![(key(Key::KEY_ESC), 1), (key(Key::KEY_ESC), 0)]);
    }

    #[test]
    fn test_value_sequence_each_synced() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let click = MappingEntry::Substitute(Substitute {
            code: Key::BTN_LEFT.code(),
            kind: None,
            values: vec![ValueSpec::Literal(1), ValueSpec::Literal(0)],
            timing: Timing::Immediate,
        });

        exec.apply(press(Key::KEY_F1), &[click]).unwrap();
        let btn = key(Key::BTN_LEFT);
        assert_eq!(
            sink.written(),
            vec![Written::Event(btn, 1), Written::Syn, Written::Event(btn, 0), Written::Syn]
        );
    }

    #[test]
    fn test_type_override_and_fan_out_order() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [MappingEntry::substitute(Key::KEY_LEFTSHIFT.code()), wheel_up()];

        exec.apply(press(Key::BTN_EXTRA), &entries).unwrap();
        assert_eq!(
            sink.events(),
            vec![
                (key(Key::KEY_LEFTSHIFT), 1),
                (EventCode::rel(RelativeAxisType::REL_WHEEL.0), 1)
            ]
        );
    }

    #[test]
    fn test_pass_through_and_nested_trigger() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);

        exec.apply(press(Key::KEY_A), &[MappingEntry::PassThrough]).unwrap();
        exec.apply(
            press(Key::KEY_B),
            &[MappingEntry::GroupTrigger { group: "nav".into() }],
        )
        .unwrap();
        assert_eq!(sink.events(), vec![(key(Key::KEY_A), 1)]);
    }

    #[test]
    fn test_shell_emits_nothing_and_ignores_failure() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [MappingEntry::Shell {
            command: "exit 3".into(),
        }];

        exec.apply(press(Key::KEY_F12), &entries).unwrap();
        exec.apply(release(Key::KEY_F12), &entries).unwrap();
        assert!(sink.written().is_empty());
    }

    #[test]
    fn test_shell_runs_on_press_only() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("runs");
        let (output, _sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [MappingEntry::Shell {
            command: format!("echo x >> '{}'", marker.display()),
        }];

        exec.apply(press(Key::KEY_F12), &entries).unwrap();
        exec.apply(release(Key::KEY_F12), &entries).unwrap();
        let runs = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(runs.lines().count(), 1);
    }

    fn repeat(count: u32) -> MappingEntry {
        MappingEntry::Substitute(Substitute {
            code: Key::BTN_LEFT.code(),
            kind: None,
            values: vec![ValueSpec::Literal(1), ValueSpec::Literal(0)],
            timing: Timing::Repeat {
                rate: Duration::from_millis(100),
                count,
            },
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_runs_until_release() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [repeat(0)];

        exec.apply(press(Key::KEY_F1), &entries).unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;
        exec.apply(release(Key::KEY_F1), &entries).unwrap();
        let cycles = sink.events().len() / 2;
        assert_eq!(cycles, 5);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.events().len() / 2, cycles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counted_repeat_ignores_release() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [repeat(4)];

        exec.apply(press(Key::KEY_F1), &entries).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        exec.apply(release(Key::KEY_F1), &entries).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(sink.events().len(), 8);
        assert!(!exec.repeats_mut().is_active(key(Key::KEY_F1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_press_replaces_running_task() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [repeat(0)];

        exec.apply(press(Key::KEY_F1), &entries).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        exec.apply(press(Key::KEY_F1), &entries).unwrap();
        assert_eq!(exec.repeats_mut().active_count(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        // One cycle from each task, nothing doubled
        assert_eq!(sink.events().len(), 4);
        exec.shutdown().await;
    }

    #[test]
    fn test_delay_forwards_third_press_and_its_release() {
        let (output, sink) = recording_output();
        let mut exec = Executor::new(output);
        let entries = [MappingEntry::Substitute(Substitute {
            code: Key::KEY_F2.code(),
            kind: None,
            values: Vec::new(),
            timing: Timing::Delay { count: 2 },
        })];

        for _ in 0..3 {
            exec.apply(press(Key::KEY_F3), &entries).unwrap();
            exec.apply(release(Key::KEY_F3), &entries).unwrap();
        }
        assert_eq!(sink.events(), vec![(key(Key::KEY_F2), 1), (key(Key::KEY_F2), 0)]);
    }
}
