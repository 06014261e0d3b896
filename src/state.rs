//! Shared state snapshots exchanged between the capture side and the HMI.
//!
//! The control and telemetry snapshots are owned by whatever feeds them (a
//! gamepad capture loop, the device link) and published as complete values
//! through watch channels. Readers always see a whole snapshot, at worst one
//! generation stale.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Current control input state: button flags plus signed axis values on a
/// percent scale (-100..=100).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub takeoff: bool,
    pub landing: bool,
    pub shot: bool,
    /// Stick trigger; gates pitch/roll so resting stick drift does not
    /// produce movement.
    pub trig: bool,

    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
    pub gaz: i32,
    pub up: i32,
    pub down: i32,
    pub pan: i32,
    pub tilt: i32,
    /// Raw diagnostic word from the capture side, rendered in hex.
    pub debug: u32,
}

/// Latest device telemetry as reported over the device link.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub speed: f32,
    pub altitude: f32,
}

/// Create a control snapshot channel seeded with the default (all-zero)
/// snapshot. The sender side belongs to the input capture mechanism.
pub fn control_channel() -> (
    watch::Sender<ControlSnapshot>,
    watch::Receiver<ControlSnapshot>,
) {
    watch::channel(ControlSnapshot::default())
}

/// Create a telemetry snapshot channel seeded with zeroed telemetry. The
/// sender side belongs to the device communication layer.
pub fn telemetry_channel() -> (
    watch::Sender<TelemetrySnapshot>,
    watch::Receiver<TelemetrySnapshot>,
) {
    watch::channel(TelemetrySnapshot::default())
}
