//! Demo application: drives the terminal HMI with a gamepad feed and
//! simulated telemetry, standing in for the full device sample app.

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use color_eyre::{eyre::eyre, Result};
use gilrs::{Axis, Button, Event, EventType, Gilrs};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use droneterm::{
    control_channel, telemetry_channel, ControlSnapshot, HmiSession, HmiSettings, InputEvent,
    InputEventHandler, SharedContext, TelemetrySnapshot,
};

const CONFIG_FILE: &str = "droneterm.toml";
const LOG_FILE: &str = "droneterm.log";
const JOYSTICK_DEADZONE: f32 = 0.05;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DemoConfig {
    #[serde(default)]
    hmi: Option<HmiSettings>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config();
    info!("Demo starting with config: {:?}", config);

    let (control_tx, control_rx) = control_channel();
    let (telemetry_tx, telemetry_rx) = telemetry_channel();

    // Feeds stop either on this flag or when the HMI side drops its receivers.
    let feeds_running = Arc::new(AtomicBool::new(true));

    let gamepad_running = feeds_running.clone();
    let gamepad_feed = std::thread::spawn(move || run_gamepad_feed(control_tx, gamepad_running));

    let telemetry_running = feeds_running.clone();
    let telemetry_feed =
        std::thread::spawn(move || run_telemetry_feed(telemetry_tx, telemetry_running));

    let exit_requested = Arc::new(AtomicBool::new(false));
    let last_event: Arc<Mutex<Option<InputEvent>>> = Arc::new(Mutex::new(None));

    let exit_flag = exit_requested.clone();
    let event_slot = last_event.clone();
    let handler: Arc<dyn InputEventHandler> = Arc::new(
        move |event: InputEvent, _context: Option<&SharedContext>| match event {
            InputEvent::None | InputEvent::CameraDirection => {}
            InputEvent::Exit => {
                exit_flag.store(true, Ordering::SeqCst);
            }
            other => {
                *event_slot.lock().unwrap() = Some(other);
            }
        },
    );

    let mut session = HmiSession::spawn(Some(handler), config.hmi, control_rx, telemetry_rx)
        .map_err(|e| eyre!("Failed to start HMI session: {}", e))?;

    session.print_header(&format!(
        "droneterm demo - started {}",
        Local::now().format("%H:%M:%S")
    ));
    session.print_info("Press q or Esc to quit, e for emergency");

    let mut battery: u8 = 100;
    let mut ticks: u32 = 0;
    while !exit_requested.load(Ordering::SeqCst) {
        ticks += 1;
        // Drain the battery by one percent every two seconds of demo time.
        if ticks % 20 == 0 && battery > 0 {
            battery -= 1;
        }

        if let Some(event) = last_event.lock().unwrap().take() {
            session.print_info(&format!("Last event: {:?}", event));
        }
        session.print_battery(battery);
        session.print_telemetry();

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("Exit requested, shutting down");
    session.shutdown();

    feeds_running.store(false, Ordering::SeqCst);
    let _ = gamepad_feed.join();
    let _ = telemetry_feed.join();

    info!("Demo finished");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env()?;
    Ok(())
}

// Logs go to a file: stdout belongs to the status display.
fn setup_logging_env() -> Result<()> {
    let log_file = File::create(LOG_FILE)?;
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .init();
    Ok(())
}

fn load_config() -> DemoConfig {
    match std::fs::read_to_string(CONFIG_FILE) {
        Ok(raw) => match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", CONFIG_FILE, e);
                DemoConfig::default()
            }
        },
        Err(_) => DemoConfig::default(),
    }
}

/// Poll the gamepad and publish complete control snapshots.
///
/// Runs on its own thread because gilrs polling is blocking-style; the HMI
/// only ever sees whole snapshots through the watch channel.
fn run_gamepad_feed(control_tx: watch::Sender<ControlSnapshot>, running: Arc<AtomicBool>) {
    let mut gilrs = match Gilrs::new() {
        Ok(g) => {
            info!("Gamepad interface initialized");
            g
        }
        Err(e) => {
            warn!("No gamepad support available: {}", e);
            return;
        }
    };

    let connected: Vec<String> = gilrs
        .gamepads()
        .map(|(id, pad)| format!("{} ({})", pad.name(), id))
        .collect();
    if connected.is_empty() {
        warn!("No gamepad connected, keyboard input only");
    } else {
        info!("Connected gamepads: {:?}", connected);
    }

    let mut snapshot = ControlSnapshot::default();
    while running.load(Ordering::SeqCst) {
        let mut changed = false;
        while let Some(Event { event, .. }) = gilrs.next_event() {
            apply_gamepad_event(&mut snapshot, event);
            snapshot.debug = snapshot.debug.wrapping_add(1);
            changed = true;
        }

        if changed {
            debug!("Publishing control snapshot: {:?}", snapshot);
            if control_tx.send(snapshot.clone()).is_err() {
                info!("Control feed closed, stopping gamepad thread");
                return;
            }
        }

        std::thread::sleep(Duration::from_millis(5));
    }
}

fn apply_gamepad_event(snapshot: &mut ControlSnapshot, event: EventType) {
    match event {
        EventType::ButtonPressed(button, _) => set_button(snapshot, button, true),
        EventType::ButtonReleased(button, _) => set_button(snapshot, button, false),
        EventType::AxisChanged(axis, value, _) => {
            let percent = (apply_deadzone(value, JOYSTICK_DEADZONE) * 100.0) as i32;
            match axis {
                Axis::LeftStickY => snapshot.pitch = percent,
                Axis::LeftStickX => snapshot.roll = percent,
                Axis::RightStickX => snapshot.yaw = percent,
                Axis::RightStickY => snapshot.gaz = percent,
                Axis::DPadX => snapshot.pan = percent,
                Axis::DPadY => snapshot.tilt = percent,
                _ => debug!("Ignoring axis: {:?}", axis),
            }
        }
        EventType::Connected => info!("Gamepad connected"),
        EventType::Disconnected => warn!("Gamepad disconnected"),
        _ => debug!("Unhandled gamepad event: {:?}", event),
    }
}

fn set_button(snapshot: &mut ControlSnapshot, button: Button, pressed: bool) {
    match button {
        Button::South => snapshot.takeoff = pressed,
        Button::East => snapshot.landing = pressed,
        Button::North => snapshot.shot = pressed,
        Button::RightTrigger => snapshot.trig = pressed,
        Button::DPadUp => snapshot.up = pressed as i32,
        Button::DPadDown => snapshot.down = pressed as i32,
        _ => debug!("Ignoring button: {:?}", button),
    }
}

// Rescale an axis value to zero inside the deadzone and a smooth ramp
// outside it.
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

/// Publish slowly drifting fake telemetry so the status rows have something
/// to show without a device link.
fn run_telemetry_feed(telemetry_tx: watch::Sender<TelemetrySnapshot>, running: Arc<AtomicBool>) {
    let mut t: f32 = 0.0;
    while running.load(Ordering::SeqCst) {
        t += 0.2;
        let snapshot = TelemetrySnapshot {
            speed: 12.0 + 4.0 * (t * 0.13).sin(),
            altitude: 20.0 + 6.0 * (t * 0.07).cos(),
        };
        if telemetry_tx.send(snapshot).is_err() {
            info!("Telemetry feed closed, stopping telemetry thread");
            return;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}
