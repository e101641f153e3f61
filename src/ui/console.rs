//! Console display surface
//!
//! Puts the local terminal in raw mode and lets the session write echo and
//! backend output straight to it.

use std::io::{self, Stdout, Write};

use crossterm::{
    cursor::MoveTo,
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{self, Clear, ClearType, SetTitle},
};
use tracing::{debug, error};

use crate::core::session::DisplaySurface;

/// The local terminal
pub struct Console {
    stdout: Stdout,
    /// Whether raw mode is currently enabled
    raw: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            raw: false,
        }
    }

    /// Enter raw mode so every keystroke reaches the session, and have
    /// pastes arrive as one event
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        self.raw = true;
        execute!(self.stdout, EnableBracketedPaste)?;
        debug!("Raw mode enabled");
        Ok(())
    }

    /// Restore the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if self.raw {
            execute!(self.stdout, DisableBracketedPaste)?;
            terminal::disable_raw_mode()?;
            self.raw = false;
            debug!("Raw mode disabled");
        }
        // Leave the cursor on a fresh line
        write!(self.stdout, "\r\n")?;
        self.stdout.flush()
    }

    pub fn set_title(&mut self, title: &str) {
        if let Err(e) = execute!(self.stdout, SetTitle(title)) {
            debug!("Failed to set title: {}", e);
        }
    }
}

impl DisplaySurface for Console {
    fn write(&mut self, text: &str) {
        let result = self
            .stdout
            .write_all(text.as_bytes())
            .and_then(|_| self.stdout.flush());
        if let Err(e) = result {
            error!("Failed to write to console: {}", e);
        }
    }

    fn clear(&mut self) {
        if let Err(e) = execute!(self.stdout, Clear(ClearType::All), MoveTo(0, 0)) {
            error!("Failed to clear console: {}", e);
        }
    }

    fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        if self.raw {
            let _ = execute!(self.stdout, DisableBracketedPaste);
            let _ = terminal::disable_raw_mode();
        }
    }
}
