//! Screen surface backend for the status display.
//!
//! The session talks to the terminal through the [`ScreenSurface`] trait so
//! the lifecycle and render paths can be exercised in tests without a real
//! terminal. [`CrosstermScreen`] is the production implementation.

use std::io::{self, Stdout, Write};

use crossterm::{cursor, queue, style, terminal};
use tracing::debug;

/// Errors from the terminal backend.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("Terminal error: {0}")]
    Terminal(#[from] io::Error),
}

/// A character-grid surface the session renders status lines onto.
///
/// Writes are queued; nothing becomes visible until [`refresh`] flushes the
/// surface. [`release`] must be safe to call more than once.
///
/// [`refresh`]: ScreenSurface::refresh
/// [`release`]: ScreenSurface::release
pub trait ScreenSurface: Send {
    /// Put the terminal into raw, no-echo interactive mode and clear it.
    fn acquire(&mut self) -> Result<(), ScreenError>;

    /// Move to the start of `row`, clear it, and queue `text` there.
    fn write_line(&mut self, row: u16, text: &str) -> Result<(), ScreenError>;

    /// Flush queued writes so they become visible.
    fn refresh(&mut self) -> Result<(), ScreenError>;

    /// Restore the terminal to its previous mode.
    fn release(&mut self);
}

/// Crossterm-backed screen surface writing to stdout.
pub struct CrosstermScreen {
    stdout: Stdout,
    acquired: bool,
}

impl CrosstermScreen {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            acquired: false,
        }
    }
}

impl Default for CrosstermScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSurface for CrosstermScreen {
    fn acquire(&mut self) -> Result<(), ScreenError> {
        debug!("Entering raw terminal mode");
        // Raw mode disables both line buffering and echo, so single
        // keypresses reach the input loop without being printed back.
        terminal::enable_raw_mode()?;

        if let Err(e) = queue!(
            self.stdout,
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide
        )
        .and_then(|_| self.stdout.flush())
        {
            let _ = terminal::disable_raw_mode();
            return Err(e.into());
        }

        self.acquired = true;
        Ok(())
    }

    fn write_line(&mut self, row: u16, text: &str) -> Result<(), ScreenError> {
        queue!(
            self.stdout,
            cursor::MoveTo(0, row),
            terminal::Clear(terminal::ClearType::CurrentLine),
            style::Print(text)
        )?;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), ScreenError> {
        self.stdout.flush()?;
        Ok(())
    }

    fn release(&mut self) {
        if !self.acquired {
            return;
        }
        debug!("Restoring terminal mode");
        let _ = queue!(self.stdout, cursor::Show);
        let _ = self.stdout.flush();
        let _ = terminal::disable_raw_mode();
        self.acquired = false;
    }
}
