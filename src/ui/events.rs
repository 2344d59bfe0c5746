use crossterm::event::{self, Event, KeyCode, KeyEvent as TermKeyEvent, KeyEventKind, KeyModifiers};
use std::io;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A normalized key press. Space arrives as `Char(' ')`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Char(char),
    Left,
    Right,
    Enter,
    Backspace,
    Esc,
    /// Ctrl-C, which raw mode no longer turns into SIGINT
    Interrupt,
}

/// Blocking source of key presses. `Ok(None)` means "something that isn't a key".
pub trait KeyReader: Send + 'static {
    fn read_key(&mut self) -> io::Result<Option<KeyEvent>>;
}

/// Reads from the real terminal. Raw mode must already be on.
#[derive(Debug, Default)]
pub struct CrosstermKeys;

impl KeyReader for CrosstermKeys {
    fn read_key(&mut self) -> io::Result<Option<KeyEvent>> {
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(normalize(key)),
            _ => Ok(None),
        }
    }
}

pub fn normalize(key: TermKeyEvent) -> Option<KeyEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(KeyEvent::Interrupt),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char(c) => Some(KeyEvent::Char(c)),
        KeyCode::Left => Some(KeyEvent::Left),
        KeyCode::Right => Some(KeyEvent::Right),
        KeyCode::Enter => Some(KeyEvent::Enter),
        KeyCode::Backspace => Some(KeyEvent::Backspace),
        KeyCode::Esc => Some(KeyEvent::Esc),
        _ => None,
    }
}

/// The running reader thread. Holds a sender of its own, so the key channel
/// stays open after the thread stops.
pub struct KeyListener {
    worker: thread::JoinHandle<()>,
    _sender: mpsc::UnboundedSender<KeyEvent>,
}

impl KeyListener {
    pub fn join(self) -> thread::Result<()> {
        self.worker.join()
    }
}

/// Runs a `KeyReader` on its own thread and forwards presses to the player.
pub struct KeyEventSource<R> {
    reader: R,
}

impl<R: KeyReader> KeyEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Start listening. The token is checked between reads, so cancelling
    /// takes effect after the next key press at the latest.
    pub fn start(
        self,
        cancel: CancellationToken,
    ) -> io::Result<(mpsc::UnboundedReceiver<KeyEvent>, KeyListener)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let keepalive = sender.clone();
        let mut reader = self.reader;

        let worker = thread::Builder::new()
            .name("key-reader".to_string())
            .spawn(move || {
                while !cancel.is_cancelled() {
                    match reader.read_key() {
                        Ok(Some(key)) => {
                            if sender.send(key).is_err() {
                                debug!("Key consumer gone, stopping reader");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Key read failed, retrying: {}", e);
                            thread::sleep(READ_RETRY_DELAY);
                        }
                    }
                }
                debug!("Key reader stopped");
            })?;

        Ok((
            receiver,
            KeyListener {
                worker,
                _sender: keepalive,
            },
        ))
    }
}
