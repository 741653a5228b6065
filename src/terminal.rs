use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use tracing::{debug, warn};

use crate::select::KeySource;

pub trait TerminalMode {
    /// Switches to raw, no-echo input. Returns whether raw mode was already on.
    fn enter_raw(&mut self) -> Result<bool>;

    fn restore(&mut self, was_raw: bool) -> Result<()>;
}

pub struct CrosstermTerminal;

impl TerminalMode for CrosstermTerminal {
    fn enter_raw(&mut self) -> Result<bool> {
        let was_raw = is_raw_mode_enabled().context("failed to query terminal mode")?;
        if !was_raw {
            enable_raw_mode().context("failed to enable raw mode")?;
        }
        Ok(was_raw)
    }

    fn restore(&mut self, was_raw: bool) -> Result<()> {
        if !was_raw {
            disable_raw_mode().context("failed to disable raw mode")?;
        }
        Ok(())
    }
}

/// Raw mode held for the lifetime of the guard. Dropping it restores the prior mode,
/// so early returns and unwinding leave the terminal usable.
pub struct RawModeGuard<'a> {
    mode: &'a mut dyn TerminalMode,
    was_raw: bool,
    active: bool,
}

impl<'a> RawModeGuard<'a> {
    pub fn acquire(mode: &'a mut dyn TerminalMode) -> Result<Self> {
        let was_raw = mode.enter_raw()?;
        debug!(was_raw, "entered raw mode");
        Ok(Self {
            mode,
            was_raw,
            active: true,
        })
    }

    pub fn release(mut self) -> Result<()> {
        self.active = false;
        self.mode.restore(self.was_raw)
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        if self.active
            && let Err(error) = self.mode.restore(self.was_raw)
        {
            warn!("failed to restore terminal mode: {error:#}");
        }
    }
}

pub struct CrosstermKeys;

impl KeySource for CrosstermKeys {
    fn next_key(&mut self) -> Result<KeyEvent> {
        loop {
            match event::read().context("failed to read terminal input")? {
                Event::Key(key) if key.kind != KeyEventKind::Release => return Ok(key),
                _ => continue,
            }
        }
    }
}
