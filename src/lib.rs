//! droneterm - terminal status display and input dispatch for a
//! remote-controlled device sample application.
//!
//! The [`hmi`] subsystem owns the terminal and a background polling loop that
//! turns keyboard and joystick-style control state into semantic
//! [`InputEvent`]s for a consumer callback. The [`state`] module defines the
//! snapshot types fed in from the capture and device-link sides.

pub mod hmi;
pub mod state;

pub use hmi::{HmiError, HmiSession, HmiSettings, InputEvent, InputEventHandler, SharedContext};
pub use state::{control_channel, telemetry_channel, ControlSnapshot, TelemetrySnapshot};
