use anyhow::Result;
use crossterm::{cursor, execute, terminal};
use std::io;

/// Raw mode for the lifetime of the guard. Restored on normal exit and early
/// returns; release builds abort on panic, so a panic skips the restore.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // no stdout writes beyond the escape sequences - the player may still hold it
        let _ = terminal::disable_raw_mode();
        let _ = execute!(io::stdout(), cursor::Show);
    }
}
