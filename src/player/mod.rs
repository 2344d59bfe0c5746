// Playback controller - the state machine that drives everything
// One track at a time: Loading -> Playing -> (next track | new search | quit | out of tracks)

use crate::audio::{AudioPipeline, PlaybackHandle, PlaybackSession, StreamFetcher};
use crate::catalog::{CatalogError, Track, TrackCatalog};
use crate::config::{Config, KeyBindings};
use crate::ui::{Console, KeyEvent};
use anyhow::Result;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};


/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exhausted,
    Quit,
}

enum State {
    Loading,
    Playing(PlaybackSession),
    Exhausted,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Next,
    TogglePause,
    SeekBack,
    SeekForward,
    Search,
}

impl Command {
    fn from_key(key: KeyEvent, bindings: &KeyBindings) -> Option<Self> {
        match key {
            KeyEvent::Interrupt => Some(Command::Quit),
            KeyEvent::Left => Some(Command::SeekBack),
            KeyEvent::Right => Some(Command::SeekForward),
            KeyEvent::Char(' ') => Some(Command::TogglePause),
            KeyEvent::Char(c) if c == bindings.quit => Some(Command::Quit),
            KeyEvent::Char(c) if c == bindings.next => Some(Command::Next),
            KeyEvent::Char(c) if c == bindings.pause => Some(Command::TogglePause),
            KeyEvent::Char(c) if c == bindings.search => Some(Command::Search),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub seek_step: Duration,
    pub progress_interval: Duration,
    pub keys: KeyBindings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        PlayerSettings::from(&Config::default())
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            seek_step: config.playback.seek_step(),
            progress_interval: config.playback.progress_interval(),
            keys: config.keys.clone(),
        }
    }
}

pub struct PlaybackController<F, C, W: Write> {
    tracks: Vec<Track>,
    cursor: usize,
    pipeline: AudioPipeline<F>,
    catalog: C,
    keys: mpsc::UnboundedReceiver<KeyEvent>,
    console: Console<W>,
    settings: PlayerSettings,
}

impl<F, C, W> PlaybackController<F, C, W>
where
    F: StreamFetcher,
    C: TrackCatalog,
    W: Write,
{
    pub fn new(
        tracks: Vec<Track>,
        start_index: usize,
        pipeline: AudioPipeline<F>,
        catalog: C,
        keys: mpsc::UnboundedReceiver<KeyEvent>,
        console: Console<W>,
        settings: PlayerSettings,
    ) -> Self {
        let cursor = start_index.min(tracks.len());
        Self {
            tracks,
            cursor,
            pipeline,
            catalog,
            keys,
            console,
            settings,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn into_console(self) -> Console<W> {
        self.console
    }

    /// Play until the list runs out or the user quits. The output device is
    /// shut down on the way out whatever happened.
    pub async fn run(&mut self) -> Result<Outcome> {
        let result = self.drive().await;
        self.pipeline.device().shutdown();
        if let Ok(outcome) = &result {
            info!("Player finished: {:?}", outcome);
        }
        result
    }

    async fn drive(&mut self) -> Result<Outcome> {
        let mut state = State::Loading;
        loop {
            state = match state {
                State::Loading => self.load_current().await?,
                State::Playing(session) => self.play(session).await?,
                State::Exhausted => {
                    self.console.status("⛔ Tracks ran out.")?;
                    return Ok(Outcome::Exhausted);
                }
                State::Quit => return Ok(Outcome::Quit),
            };
        }
    }

    /// Move past the current track. Never goes beyond `tracks.len()`.
    fn advance(&mut self) -> State {
        self.cursor = (self.cursor + 1).min(self.tracks.len());
        State::Loading
    }

    async fn load_current(&mut self) -> Result<State> {
        let Some(track) = self.tracks.get(self.cursor).cloned() else {
            return Ok(State::Exhausted);
        };

        self.console.clear()?;
        self.console.header()?;
        self.console.loading(&track)?;
        debug!("Loading track {} '{}'", self.cursor, track.title);

        match self.pipeline.load(&track).await {
            Ok(session) => {
                self.console.clear()?;
                self.console.header()?;
                self.console.now_playing(&track)?;
                self.console.controls(&self.settings.keys)?;
                info!("Playing '{}' ({}/{})", track.title, self.cursor + 1, self.tracks.len());
                Ok(State::Playing(session))
            }
            Err(e) => {
                warn!("Skipping '{}': {}", track.title, e);
                self.console.error(&format!("{}: {}", track.display_title(), e))?;
                Ok(self.advance())
            }
        }
    }

    async fn play(&mut self, mut session: PlaybackSession) -> Result<State> {
        let mut ticker = time::interval(self.settings.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let awaiting_done = !session.handle.is_released();

            tokio::select! {
                finished = &mut session.done, if awaiting_done => {
                    if finished.is_err() {
                        warn!("Renderer dropped the session before the end");
                    }
                    self.console.status("✅ Track finished")?;
                    session.handle.release();
                    return Ok(self.advance());
                }
                Some(key) = self.keys.recv() => {
                    if let Some(next) = self.on_key(key, &mut session).await? {
                        return Ok(next);
                    }
                }
                _ = ticker.tick() => self.render_progress(&session.handle)?,
            }
        }
    }

    async fn on_key(&mut self, key: KeyEvent, session: &mut PlaybackSession) -> Result<Option<State>> {
        let Some(command) = Command::from_key(key, &self.settings.keys) else {
            return Ok(None);
        };
        debug!("{:?} -> {:?}", key, command);

        let handle = &mut session.handle;
        match command {
            Command::Quit => {
                self.console.status("⏹ Quitting...")?;
                handle.release();
                Ok(Some(State::Quit))
            }
            Command::Next => {
                self.console.status("⏭ Next track...")?;
                handle.release();
                Ok(Some(self.advance()))
            }
            Command::TogglePause => {
                if handle.is_released() {
                    self.console.status("Nothing is playing")?;
                } else if handle.toggle_pause() {
                    self.console.status("⏸ Paused")?;
                } else {
                    self.console.status("▶ Playing")?;
                }
                Ok(None)
            }
            Command::SeekBack | Command::SeekForward => {
                self.seek(handle, command == Command::SeekForward)?;
                Ok(None)
            }
            Command::Search => self.requery(handle).await,
        }
    }

    fn seek(&mut self, handle: &PlaybackHandle, forward: bool) -> Result<()> {
        if handle.is_released() {
            self.console.status("Nothing is playing")?;
            return Ok(());
        }

        let step = handle.format().frames_for(self.settings.seek_step);
        let position = handle.position();
        let target = if forward {
            position.saturating_add(step)
        } else {
            position.saturating_sub(step)
        };
        let landed = handle.seek(target);
        debug!("Seek {} -> {} (of {})", position, landed, handle.length());

        let secs = self.settings.seek_step.as_secs();
        if forward {
            self.console.status(&format!("⏩ Forward {}s", secs))?;
        } else {
            self.console.status(&format!("⏪ Back {}s", secs))?;
        }
        self.render_progress(handle)
    }

    fn render_progress(&mut self, handle: &PlaybackHandle) -> Result<()> {
        let format = handle.format();
        self.console.progress(
            format.duration_of(handle.position()),
            format.duration_of(handle.length()),
        )?;
        Ok(())
    }

    /// The current session is released before the catalog answers. A failed
    /// search leaves the player in Playing with nothing audible until the
    /// next command.
    async fn requery(&mut self, handle: &mut PlaybackHandle) -> Result<Option<State>> {
        handle.release();
        self.console.status("🔁 New search")?;
        self.console.prompt("Enter a new query: ")?;

        let result = match self.read_line().await? {
            Some(query) if !query.trim().is_empty() => {
                let query = query.trim().to_string();
                self.catalog.search(&query).await.and_then(|tracks| {
                    if tracks.is_empty() {
                        Err(CatalogError::NoResults(query))
                    } else {
                        Ok(tracks)
                    }
                })
            }
            _ => Err(CatalogError::EmptyQuery),
        };

        match result {
            Ok(tracks) => {
                info!("New search returned {} tracks", tracks.len());
                self.tracks = tracks;
                self.cursor = 0;
                Ok(Some(State::Loading))
            }
            Err(e) => {
                warn!("New search failed: {}", e);
                self.console.error(&format!("Search failed: {}", e))?;
                Ok(None)
            }
        }
    }

    /// Line editing on top of the key stream, so the prompt never competes
    /// with the key reader for stdin.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        while let Some(key) = self.keys.recv().await {
            match key {
                KeyEvent::Enter => {
                    self.console.newline()?;
                    return Ok(Some(line));
                }
                KeyEvent::Esc | KeyEvent::Interrupt => {
                    self.console.newline()?;
                    return Ok(None);
                }
                KeyEvent::Backspace => {
                    if line.pop().is_some() {
                        self.console.erase_char()?;
                    }
                }
                KeyEvent::Char(c) => {
                    line.push(c);
                    self.console.echo(c)?;
                }
                KeyEvent::Left | KeyEvent::Right => {}
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn test_default_key_map() {
        let keys = KeyBindings::default();
        let cases = [
            (KeyEvent::Char('q'), Some(Command::Quit)),
            (KeyEvent::Interrupt, Some(Command::Quit)),
            (KeyEvent::Char('n'), Some(Command::Next)),
            (KeyEvent::Char('p'), Some(Command::TogglePause)),
            (KeyEvent::Char(' '), Some(Command::TogglePause)),
            (KeyEvent::Char('s'), Some(Command::Search)),
            (KeyEvent::Left, Some(Command::SeekBack)),
            (KeyEvent::Right, Some(Command::SeekForward)),
            (KeyEvent::Char('z'), None),
            (KeyEvent::Enter, None),
        ];
        for (key, expected) in cases {
            assert_eq!(Command::from_key(key, &keys), expected, "{:?}", key);
        }
    }

    #[test]
    fn test_rebound_keys() {
        let keys = KeyBindings {
            quit: 'x',
            next: 'j',
            ..KeyBindings::default()
        };
        assert_eq!(Command::from_key(KeyEvent::Char('x'), &keys), Some(Command::Quit));
        assert_eq!(Command::from_key(KeyEvent::Char('j'), &keys), Some(Command::Next));
        assert_eq!(Command::from_key(KeyEvent::Char('q'), &keys), None);
    }
}
