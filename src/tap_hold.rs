//! Dual-role keys: one code while held, another when tapped

use crate::error::Result;
use crate::event::{EventCode, KEY_DOWN, KEY_UP, RawEvent};
use crate::sink::OutputHandle;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Releases sooner than this after the press also emit the tap code
pub const TAP_WINDOW: Duration = Duration::from_millis(100);

/// Press times of hold codes currently down
#[derive(Debug, Default)]
pub struct TapHoldResolver {
    pressed: HashMap<u16, Instant>,
}

impl TapHoldResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a dual-role mapping to `event`
    pub fn apply(&mut self, output: &OutputHandle, event: RawEvent, tap: u16, hold: u16) -> Result<()> {
        let hold_code = EventCode::key(hold);
        output.emit(event.with_code(hold_code))?;

        match event.value {
            KEY_DOWN => {
                self.pressed.insert(hold, Instant::now());
            }
            KEY_UP => {
                let tapped = self
                    .pressed
                    .remove(&hold)
                    .is_some_and(|pressed_at| pressed_at.elapsed() < TAP_WINDOW);
                if tapped {
                    debug!("Tap on {:?} -> {:?}", event.code, EventCode::key(tap));
                    output.tap(EventCode::key(tap))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::recording_output;
    use evdev::Key;

    const TAP: Key = Key::KEY_ESC;
    const HOLD: Key = Key::KEY_LEFTCTRL;

    fn caps_event(value: i32) -> RawEvent {
        RawEvent::new(EventCode::key(Key::KEY_CAPSLOCK.code()), value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_release_taps() {
        let (output, sink) = recording_output();
        let mut resolver = TapHoldResolver::new();

        resolver.apply(&output, caps_event(1), TAP.code(), HOLD.code()).unwrap();
        tokio::time::advance(Duration::from_millis(99)).await;
        resolver.apply(&output, caps_event(0), TAP.code(), HOLD.code()).unwrap();

        assert_eq!(
            sink.events(),
            vec![
                (EventCode::key(HOLD.code()), 1),
                (EventCode::key(HOLD.code()), 0),
                (EventCode::key(TAP.code()), 1),
                (EventCode::key(TAP.code()), 0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_hold_does_not_tap() {
        let (output, sink) = recording_output();
        let mut resolver = TapHoldResolver::new();

        resolver.apply(&output, caps_event(1), TAP.code(), HOLD.code()).unwrap();
        tokio::time::advance(TAP_WINDOW).await;
        resolver.apply(&output, caps_event(0), TAP.code(), HOLD.code()).unwrap();

        assert_eq!(
            sink.events(),
            vec![(EventCode::key(HOLD.code()), 1), (EventCode::key(HOLD.code()), 0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_without_press_does_not_tap() {
        let (output, sink) = recording_output();
        let mut resolver = TapHoldResolver::new();

        resolver.apply(&output, caps_event(0), TAP.code(), HOLD.code()).unwrap();
        assert_eq!(sink.events(), vec![(EventCode::key(HOLD.code()), 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autorepeat_keeps_press_time() {
        let (output, sink) = recording_output();
        let mut resolver = TapHoldResolver::new();

        resolver.apply(&output, caps_event(1), TAP.code(), HOLD.code()).unwrap();
        resolver.apply(&output, caps_event(2), TAP.code(), HOLD.code()).unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        resolver.apply(&output, caps_event(0), TAP.code(), HOLD.code()).unwrap();

        assert_eq!(sink.events().len(), 5);
        assert_eq!(sink.events()[1], (EventCode::key(HOLD.code()), 2));
    }
}
