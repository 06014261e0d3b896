//! HMI session: owns the screen surface and the input polling thread.
//!
//! The session is created once by the consuming application, lives for the
//! interactive run, and is torn down exactly once (explicitly via
//! [`HmiSession::shutdown`] or implicitly on drop). Teardown order is fixed:
//! clear the running flag, join the input thread, then release the screen.
//! The loop never touches the screen, but the ordering keeps that extension
//! safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::hmi::input_loop::{
    CrosstermKeys, InputEventHandler, InputLoop, KeySource, SharedContext,
};
use crate::hmi::screen::{CrosstermScreen, ScreenError, ScreenSurface};
use crate::state::{ControlSnapshot, TelemetrySnapshot};

// Fixed status rows, matching the layout of the original ncurses display
const HEADER_ROW: u16 = 0;
const INFO_ROW: u16 = 2;
const BATTERY_ROW: u16 = 4;
const CONTROL_ROW: u16 = 6;
const TELEMETRY_ROW: u16 = 8;

/// Configuration for the HMI session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HmiSettings {
    /// Sleep quantum of the input loop in milliseconds.
    ///
    /// Bounds both event latency and shutdown latency: clearing the running
    /// flag takes effect at the next top of iteration.
    pub poll_interval_ms: u64,
}

impl Default for HmiSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
        }
    }
}

/// Errors surfaced from session startup.
#[derive(Debug, thiserror::Error)]
pub enum HmiError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Screen error: {0}")]
    Screen(#[from] ScreenError),

    #[error("Failed to start input thread: {0}")]
    TaskStart(String),
}

/// Handle for the terminal status display and its input loop.
pub struct HmiSession {
    // Stop flag shared with the input loop; cleared only by shutdown
    running: Arc<AtomicBool>,

    // Joined and dropped by shutdown; None means not running
    input_task: Option<thread::JoinHandle<()>>,

    // None after shutdown, which turns every render call into a no-op
    screen: Option<Box<dyn ScreenSurface>>,

    // Opaque consumer context handed back on every event dispatch
    context: Arc<Mutex<Option<SharedContext>>>,

    control_rx: watch::Receiver<ControlSnapshot>,
    telemetry_rx: watch::Receiver<TelemetrySnapshot>,
}

impl HmiSession {
    /// Acquire the terminal and start the input loop.
    ///
    /// Fails with [`HmiError::InvalidArgument`] when no callback is given,
    /// before any terminal state is touched. Screen or thread-start failures
    /// roll back whatever was acquired; no partial session escapes.
    pub fn spawn(
        callback: Option<Arc<dyn InputEventHandler>>,
        settings: Option<HmiSettings>,
        control_rx: watch::Receiver<ControlSnapshot>,
        telemetry_rx: watch::Receiver<TelemetrySnapshot>,
    ) -> Result<Self, HmiError> {
        Self::spawn_with_io(
            callback,
            settings,
            control_rx,
            telemetry_rx,
            Box::new(CrosstermScreen::new()),
            Box::new(CrosstermKeys),
        )
    }

    fn spawn_with_io(
        callback: Option<Arc<dyn InputEventHandler>>,
        settings: Option<HmiSettings>,
        control_rx: watch::Receiver<ControlSnapshot>,
        telemetry_rx: watch::Receiver<TelemetrySnapshot>,
        mut screen: Box<dyn ScreenSurface>,
        keys: Box<dyn KeySource>,
    ) -> Result<Self, HmiError> {
        let handler = callback.ok_or_else(|| {
            HmiError::InvalidArgument("input event callback is required".to_string())
        })?;

        let settings = settings.unwrap_or_default();
        info!("Starting HMI session with settings: {:?}", settings);

        screen.acquire()?;
        if let Err(e) = screen.refresh() {
            screen.release();
            return Err(e.into());
        }
        debug!("Screen surface acquired");

        let running = Arc::new(AtomicBool::new(true));
        let context: Arc<Mutex<Option<SharedContext>>> = Arc::new(Mutex::new(None));

        let input_loop = InputLoop::create(
            running.clone(),
            handler,
            context.clone(),
            control_rx.clone(),
            keys,
            Duration::from_millis(settings.poll_interval_ms),
        );

        let spawned = thread::Builder::new()
            .name("hmi-input".to_string())
            .spawn(move || {
                let mut polling = input_loop.start();
                polling.run_poll_loop();
            });

        let input_task = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start input thread: {}", e);
                screen.release();
                return Err(HmiError::TaskStart(e.to_string()));
            }
        };

        info!("HMI session started");
        Ok(Self {
            running,
            input_task: Some(input_task),
            screen: Some(screen),
            context,
            control_rx,
            telemetry_rx,
        })
    }

    /// Replace the opaque context passed to the event handler.
    ///
    /// Takes effect on a subsequent dispatch; there is no ordering guarantee
    /// relative to an iteration already in flight.
    pub fn set_context(&self, context: SharedContext) {
        let mut guard = match self.context.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(context);
    }

    /// Stop the input loop and restore the terminal. Safe to call twice;
    /// also runs on drop.
    ///
    /// Blocks until the loop observes the cleared flag, which takes at most
    /// one poll interval plus the time of the iteration in progress.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(task) = self.input_task.take() {
            debug!("Waiting for input thread to stop");
            if task.join().is_err() {
                error!("Input thread panicked before shutdown");
            }
        }

        if let Some(mut screen) = self.screen.take() {
            screen.release();
            info!("HMI session shut down");
        }
    }

    /// Write the header line (row 0). Not refreshed on its own; the next
    /// refreshing render call makes it visible.
    pub fn print_header(&mut self, text: &str) {
        let Some(screen) = self.screen.as_mut() else {
            return;
        };
        if let Err(e) = screen.write_line(HEADER_ROW, text) {
            warn!("Header render failed: {}", e);
        }
    }

    /// Write the free-form info line (row 2) and refresh.
    pub fn print_info(&mut self, text: &str) {
        let Some(screen) = self.screen.as_mut() else {
            return;
        };
        if let Err(e) = screen
            .write_line(INFO_ROW, text)
            .and_then(|_| screen.refresh())
        {
            warn!("Info render failed: {}", e);
        }
    }

    /// Write the battery line (row 4) and refresh.
    pub fn print_battery(&mut self, percent: u8) {
        let Some(screen) = self.screen.as_mut() else {
            return;
        };
        if let Err(e) = screen
            .write_line(BATTERY_ROW, &format!("Battery: {}", percent))
            .and_then(|_| screen.refresh())
        {
            warn!("Battery render failed: {}", e);
        }
    }

    /// Write the control-axis line (row 6) and the telemetry line (row 8)
    /// from the current snapshots, then refresh.
    pub fn print_telemetry(&mut self) {
        let control = self.control_rx.borrow().clone();
        let telemetry = self.telemetry_rx.borrow().clone();

        let Some(screen) = self.screen.as_mut() else {
            return;
        };

        let control_line = format!(
            "Pitch: {},Roll: {},Yaw: {},UP: {},DOWN: {}, View:(x: {},y: {}), Debug:{:x}",
            control.pitch,
            control.roll,
            control.yaw,
            control.up,
            control.down,
            control.pan,
            control.tilt,
            control.debug
        );
        let telemetry_line = format!(
            "Speed: {:4.2} km/h,Alt: {:4.2}",
            telemetry.speed, telemetry.altitude
        );

        if let Err(e) = screen
            .write_line(CONTROL_ROW, &control_line)
            .and_then(|_| screen.write_line(TELEMETRY_ROW, &telemetry_line))
            .and_then(|_| screen.refresh())
        {
            warn!("Telemetry render failed: {}", e);
        }
    }
}

impl Drop for HmiSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
