//! Input polling loop running on the session's background thread.
//!
//! Each iteration polls the keyboard, reads the current control snapshot and
//! derives semantic input events in a fixed order, dispatching every one of
//! them synchronously to the registered handler before sleeping for the poll
//! interval. The loop exits only when the session clears its running flag.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use statum::{machine, state, transition};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::ControlSnapshot;

/// Semantic input events dispatched to the consumer.
///
/// `Move` and `None` are mutually exclusive within one iteration;
/// `CameraDirection` fires every iteration; everything else depends on the
/// last keystroke or the control snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputEvent {
    Exit,
    Emergency,
    Takeoff,
    Land,
    CameraShot,
    Move,
    None,
    CameraDirection,
}

/// A keystroke as seen by the input loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Esc,
    Char(char),
}

/// Opaque consumer data handed back on every event dispatch.
pub type SharedContext = Arc<dyn Any + Send + Sync>;

/// Consumer-side sink for input events.
///
/// Invoked from the session's background thread; a slow handler stalls the
/// polling loop and delays shutdown.
pub trait InputEventHandler: Send + Sync {
    fn on_input_event(&self, event: InputEvent, context: Option<&SharedContext>);
}

impl<F> InputEventHandler for F
where
    F: Fn(InputEvent, Option<&SharedContext>) + Send + Sync,
{
    fn on_input_event(&self, event: InputEvent, context: Option<&SharedContext>) {
        self(event, context)
    }
}

/// Non-blocking keystroke source for the polling loop.
pub trait KeySource: Send {
    /// Return the next pending keystroke, or `None` if nothing is buffered.
    fn poll_key(&mut self) -> Option<KeyPress>;
}

/// Keystroke source reading terminal input through crossterm.
pub struct CrosstermKeys;

impl KeySource for CrosstermKeys {
    fn poll_key(&mut self) -> Option<KeyPress> {
        match crossterm::event::poll(Duration::ZERO) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("Key poll failed: {}", e);
                return None;
            }
        }
        match crossterm::event::read() {
            Ok(crossterm::event::Event::Key(key))
                if key.kind == crossterm::event::KeyEventKind::Press =>
            {
                match key.code {
                    crossterm::event::KeyCode::Esc => Some(KeyPress::Esc),
                    crossterm::event::KeyCode::Char(c) => Some(KeyPress::Char(c)),
                    _ => None,
                }
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Key read failed: {}", e);
                None
            }
        }
    }
}

// Loop lifecycle states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum LoopPhase {
    Initializing,
    Running,
}

#[machine]
pub struct InputLoop<LoopPhase> {
    // Stop flag shared with the owning session
    running: Arc<AtomicBool>,

    // Consumer event sink
    handler: Arc<dyn InputEventHandler>,

    // Opaque consumer context, replaceable through the session
    context: Arc<Mutex<Option<SharedContext>>>,

    // Control snapshot feed
    control_rx: watch::Receiver<ControlSnapshot>,

    // Keystroke source
    keys: Box<dyn KeySource>,

    // Sleep quantum between iterations
    poll_interval: Duration,

    // Last keystroke seen; deliberately kept across iterations when no key
    // is pending, so a key-derived event repeats until another key arrives
    last_key: Option<KeyPress>,
}

impl InputLoop<Initializing> {
    pub fn create(
        running: Arc<AtomicBool>,
        handler: Arc<dyn InputEventHandler>,
        context: Arc<Mutex<Option<SharedContext>>>,
        control_rx: watch::Receiver<ControlSnapshot>,
        keys: Box<dyn KeySource>,
        poll_interval: Duration,
    ) -> Self {
        debug!("Creating input loop with poll interval {:?}", poll_interval);
        Self::builder()
            .running(running)
            .handler(handler)
            .context(context)
            .control_rx(control_rx)
            .keys(keys)
            .poll_interval(poll_interval)
            .maybe_last_key(None)
            .build()
    }
}

#[transition]
impl InputLoop<Initializing> {
    // Transition to the Running state; the flag is already set by the session.
    pub fn start(self) -> InputLoop<Running> {
        info!("Input loop armed, transitioning to Running state");
        self.transition()
    }
}

impl InputLoop<Running> {
    /// Poll until the running flag is cleared. This is the whole body of the
    /// background thread.
    pub fn run_poll_loop(&mut self) {
        info!("Input loop started");

        while self.running.load(Ordering::SeqCst) {
            if let Some(key) = self.keys.poll_key() {
                debug!("Keystroke: {:?}", key);
                self.last_key = Some(key);
            }

            let control = self.control_rx.borrow().clone();
            for event in derive_events(self.last_key, &control) {
                self.dispatch(event);
            }

            std::thread::sleep(self.poll_interval);
        }

        info!("Input loop observed stop flag, exiting");
    }

    // Hand one event to the handler with the current context. The context is
    // re-read per event so a concurrent replacement shows up mid-iteration.
    fn dispatch(&self, event: InputEvent) {
        let context = match self.context.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        self.handler.on_input_event(event, context.as_ref());
    }
}

/// Derive the events for one iteration, in dispatch order.
///
/// The gates are independent; several events per iteration are normal. Only
/// `Move`/`None` are exclusive: the `None` arm belongs to the movement check
/// alone, not to the button-derived events above it.
pub fn derive_events(last_key: Option<KeyPress>, control: &ControlSnapshot) -> Vec<InputEvent> {
    let mut events = Vec::with_capacity(4);

    if matches!(last_key, Some(KeyPress::Esc) | Some(KeyPress::Char('q'))) {
        events.push(InputEvent::Exit);
    }
    if last_key == Some(KeyPress::Char('e')) {
        events.push(InputEvent::Emergency);
    }
    if control.takeoff {
        events.push(InputEvent::Takeoff);
    }
    if control.landing {
        events.push(InputEvent::Land);
    }
    if control.shot {
        events.push(InputEvent::CameraShot);
    }
    // trig gates pitch/roll; yaw and gaz move on their own
    if (control.trig && (control.pitch != 0 || control.roll != 0))
        || control.yaw != 0
        || control.gaz != 0
    {
        events.push(InputEvent::Move);
    } else {
        events.push(InputEvent::None);
    }
    events.push(InputEvent::CameraDirection);

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_control() -> ControlSnapshot {
        ControlSnapshot::default()
    }

    #[test]
    fn camera_direction_fires_every_iteration() {
        let cases = [
            (Option::<KeyPress>::None, idle_control()),
            (Some(KeyPress::Char('q')), idle_control()),
            (
                Some(KeyPress::Char('e')),
                ControlSnapshot {
                    takeoff: true,
                    landing: true,
                    shot: true,
                    yaw: 42,
                    ..Default::default()
                },
            ),
        ];
        for (key, control) in cases {
            let events = derive_events(key, &control);
            let count = events
                .iter()
                .filter(|e| **e == InputEvent::CameraDirection)
                .count();
            assert_eq!(count, 1, "events: {:?}", events);
            assert_eq!(events.last(), Some(&InputEvent::CameraDirection));
        }
    }

    #[test]
    fn exactly_one_of_move_or_none() {
        let cases = [
            idle_control(),
            ControlSnapshot {
                trig: true,
                pitch: 5,
                ..Default::default()
            },
            ControlSnapshot {
                takeoff: true,
                shot: true,
                ..Default::default()
            },
            ControlSnapshot {
                gaz: -30,
                ..Default::default()
            },
        ];
        for control in cases {
            let events = derive_events(None, &control);
            let moves = events.iter().filter(|e| **e == InputEvent::Move).count();
            let nones = events.iter().filter(|e| **e == InputEvent::None).count();
            assert_eq!(moves + nones, 1, "events: {:?}", events);
        }
    }

    #[test]
    fn takeoff_only_snapshot_yields_takeoff_none_camera() {
        let control = ControlSnapshot {
            takeoff: true,
            ..Default::default()
        };
        let events = derive_events(None, &control);
        assert_eq!(
            events,
            vec![
                InputEvent::Takeoff,
                InputEvent::None,
                InputEvent::CameraDirection
            ]
        );
    }

    #[test]
    fn quit_key_emits_exit_before_snapshot_events() {
        let control = ControlSnapshot {
            takeoff: true,
            ..Default::default()
        };
        let events = derive_events(Some(KeyPress::Char('q')), &control);
        assert_eq!(events.first(), Some(&InputEvent::Exit));
        assert!(events.contains(&InputEvent::Takeoff));
    }

    #[test]
    fn escape_key_emits_exit() {
        let events = derive_events(Some(KeyPress::Esc), &idle_control());
        assert_eq!(events.first(), Some(&InputEvent::Exit));
    }

    #[test]
    fn emergency_key_emits_emergency() {
        let events = derive_events(Some(KeyPress::Char('e')), &idle_control());
        assert_eq!(
            events,
            vec![
                InputEvent::Emergency,
                InputEvent::None,
                InputEvent::CameraDirection
            ]
        );
    }

    #[test]
    fn triggered_pitch_moves() {
        let control = ControlSnapshot {
            trig: true,
            pitch: 5,
            ..Default::default()
        };
        let events = derive_events(None, &control);
        assert!(events.contains(&InputEvent::Move));
        assert!(!events.contains(&InputEvent::None));
    }

    #[test]
    fn untriggered_pitch_does_not_move() {
        let control = ControlSnapshot {
            pitch: 5,
            ..Default::default()
        };
        let events = derive_events(None, &control);
        assert!(events.contains(&InputEvent::None));
        assert!(!events.contains(&InputEvent::Move));
    }

    #[test]
    fn yaw_moves_without_trigger() {
        let control = ControlSnapshot {
            yaw: -7,
            ..Default::default()
        };
        let events = derive_events(None, &control);
        assert!(events.contains(&InputEvent::Move));
    }
}
