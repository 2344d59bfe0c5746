// Terminal output - everything the player prints goes through Console
// Plain line-oriented output; \r\n everywhere because the player runs in raw mode

pub mod events;   // keyboard reader thread + key normalization
pub mod prompt;   // startup questions, before raw mode
pub mod terminal; // raw mode guard

pub use events::{CrosstermKeys, KeyEvent, KeyEventSource, KeyListener, KeyReader};
pub use terminal::RawModeGuard;

use crate::catalog::Track;
use crate::config::KeyBindings;
use crossterm::{
    cursor, queue,
    style::Stylize,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use std::time::Duration;

const BANNER: &str = r"
      _                 _       _
  ___| | ___  _   _  __| |_ __ (_)_ __   ___
 / __| |/ _ \| | | |/ _` | '_ \| | '_ \ / _ \
| (__| | (_) | |_| | (_| | |_) | | |_) |  __/
 \___|_|\___/ \__,_|\__,_| .__/|_| .__/ \___|
                         |_|     |_|";

/// `MM:SS`, minutes uncapped.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub struct Console<W: Write> {
    out: W,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl std::fmt::Display) -> io::Result<()> {
        write!(self.out, "{}\r\n", text)?;
        self.out.flush()
    }

    pub fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        self.out.flush()
    }

    pub fn header(&mut self) -> io::Result<()> {
        for row in BANNER.lines().skip(1) {
            write!(self.out, "{}\r\n", row.bold())?;
        }
        self.line("terminal streaming player".cyan())
    }

    pub fn track_list(&mut self, tracks: &[Track]) -> io::Result<()> {
        self.line("")?;
        self.line("🎵 Tracks found:".yellow())?;
        for (i, track) in tracks.iter().enumerate() {
            write!(
                self.out,
                "{} {}\r\n",
                format!("[{:2}]", i + 1).cyan(),
                track.display_title().white().bold()
            )?;
        }
        self.out.flush()
    }

    pub fn controls(&mut self, keys: &KeyBindings) -> io::Result<()> {
        let legend = format!(
            "\r\n🎛 Controls:\r\n  [{p}/space] ⏸ pause / ▶ resume\r\n  [{n}] ⏭ next track\r\n  [{s}] 🔁 new search\r\n  [←] ⏪ back 30s\r\n  [→] ⏩ forward 30s\r\n  [{q}] ⏹ quit\r\n",
            p = keys.pause,
            n = keys.next,
            s = keys.search,
            q = keys.quit,
        );
        self.line(legend.yellow())
    }

    pub fn loading(&mut self, track: &Track) -> io::Result<()> {
        self.line(format!("▶ Trying to play: {}", track.display_title()))
    }

    pub fn now_playing(&mut self, track: &Track) -> io::Result<()> {
        self.line(format!("🎵 Now playing: {}", track.display_title().green().bold()))
    }

    /// One-line status message on its own row.
    pub fn status(&mut self, message: &str) -> io::Result<()> {
        self.line(format!("\r\n{}", message))
    }

    /// Rewrites the progress row in place.
    pub fn progress(&mut self, position: Duration, length: Duration) -> io::Result<()> {
        write!(
            self.out,
            "\r⏳ {} / {} ",
            format_duration(position),
            format_duration(length)
        )?;
        self.out.flush()
    }

    pub fn error(&mut self, message: &str) -> io::Result<()> {
        self.line(format!("[-] {}", message).red())
    }

    pub fn prompt(&mut self, label: &str) -> io::Result<()> {
        write!(self.out, "{}", label)?;
        self.out.flush()
    }

    pub fn echo(&mut self, c: char) -> io::Result<()> {
        write!(self.out, "{}", c)?;
        self.out.flush()
    }

    pub fn erase_char(&mut self) -> io::Result<()> {
        write!(self.out, "\u{8} \u{8}")?;
        self.out.flush()
    }

    pub fn newline(&mut self) -> io::Result<()> {
        self.line("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut Console<Vec<u8>>) -> io::Result<()>) -> String {
        let mut console = Console::new(Vec::new());
        f(&mut console).unwrap();
        String::from_utf8(console.into_inner()).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "00:00");
        assert_eq!(format_duration(Duration::from_millis(61_900)), "01:01");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "62:05");
    }

    #[test]
    fn test_progress_rewrites_line() {
        let out = rendered(|c| c.progress(Duration::from_secs(75), Duration::from_secs(200)));
        assert_eq!(out, "\r⏳ 01:15 / 03:20 ");
    }

    #[test]
    fn test_track_list_is_one_based() {
        let tracks = vec![
            Track::new(1, "First", "https://cdn/1"),
            Track::new(2, "Second", "https://cdn/2"),
        ];
        let out = rendered(|c| c.track_list(&tracks));
        assert!(out.contains("[ 1]"));
        assert!(out.contains("First"));
        assert!(out.contains("[ 2]"));
        assert!(out.contains("Second"));
    }

    #[test]
    fn test_controls_use_configured_keys() {
        let keys = KeyBindings {
            quit: 'x',
            ..KeyBindings::default()
        };
        let out = rendered(|c| c.controls(&keys));
        assert!(out.contains("[x] ⏹ quit"));
        assert!(out.contains("[p/space]"));
    }

    #[test]
    fn test_error_line_prefix() {
        let out = rendered(|c| c.error("catalog is down"));
        assert!(out.contains("[-] catalog is down"));
        assert!(out.ends_with("\r\n"));
    }
}
