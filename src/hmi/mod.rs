//! Terminal HMI subsystem for the remote-controlled device sample.
//!
//! Three pieces:
//!
//! 1. [`screen`] - Raw-mode terminal surface for the status display
//! 2. [`input_loop`] - Background polling loop deriving semantic input events
//! 3. [`session`] - Lifecycle management and render operations
//!
//! # Architecture
//!
//! ```text
//! Keyboard ──┐
//!            ├──► Input Loop ──► InputEventHandler (consumer callback)
//! Control ───┘
//! snapshot
//!
//! Consumer ──► HmiSession render ops ──► ScreenSurface
//! ```
//!
//! The input loop runs on its own thread at a 10 ms default interval and is
//! stopped cooperatively by [`session::HmiSession::shutdown`].

pub mod input_loop;
pub mod screen;
pub mod session;

pub use input_loop::{InputEvent, InputEventHandler, KeyPress, KeySource, SharedContext};
pub use screen::{CrosstermScreen, ScreenError, ScreenSurface};
pub use session::{HmiError, HmiSession, HmiSettings};
