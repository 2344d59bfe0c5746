use super::device::DeviceState;
use super::SampleFormat;
use rodio::Source;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

/// What the speaker pulls from. Frames are copied out of the session buffer
/// one window at a time under the device lock; the renderer never waits on
/// that lock and plays a frame of silence instead when it is contended.
pub struct SessionSource {
    shared: Arc<Mutex<DeviceState>>,
    session: u64,
    format: SampleFormat,
    chunk_frames: usize,
    chunk: Vec<i16>,
    cursor: usize,
    finished: bool,
}

impl SessionSource {
    pub(crate) fn new(
        shared: Arc<Mutex<DeviceState>>,
        session: u64,
        format: SampleFormat,
        chunk_frames: usize,
    ) -> Self {
        Self {
            shared,
            session,
            format,
            chunk_frames,
            chunk: Vec::with_capacity(chunk_frames * format.channels.max(1) as usize),
            cursor: 0,
            finished: false,
        }
    }

    /// Load the next window into `chunk`. False once the session is over.
    fn refill(&mut self) -> bool {
        let channels = self.format.channels.max(1) as usize;
        self.chunk.clear();
        self.cursor = 0;

        let mut state = match self.shared.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.chunk.resize(channels, 0);
                return true;
            }
        };

        let Some(session) = state.session.as_mut().filter(|s| s.id == self.session) else {
            // released or replaced
            return false;
        };

        if session.paused {
            self.chunk.resize(self.chunk_frames * channels, 0);
            return true;
        }

        let length = session.length();
        if session.position >= length {
            if let Some(done) = session.done.take() {
                let _ = done.send(());
            }
            return false;
        }

        let end = (session.position + self.chunk_frames).min(length);
        self.chunk
            .extend_from_slice(&session.samples[session.position * channels..end * channels]);
        session.position = end;
        true
    }
}

impl Iterator for SessionSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished {
            return None;
        }
        if self.cursor >= self.chunk.len() && !self.refill() {
            self.finished = true;
            return None;
        }
        let sample = self.chunk.get(self.cursor).copied();
        self.cursor += 1;
        sample
    }
}

impl Source for SessionSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.format.channels
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::{OutputBackend, OutputDevice, PlaybackSession};
    use super::*;

    struct Capture(Arc<Mutex<Option<SessionSource>>>);

    impl OutputBackend for Capture {
        fn open(&mut self, _format: SampleFormat) -> Result<(), String> {
            Ok(())
        }
        fn play(&mut self, source: SessionSource) -> Result<(), String> {
            *self.0.lock().unwrap() = Some(source);
            Ok(())
        }
        fn clear(&mut self) {}
        fn close(&mut self) {}
    }

    // 10ms window at 1 kHz mono = 10 frames per chunk; sample n holds the value n + 1
    fn start(frames: usize) -> (OutputDevice, PlaybackSession, SessionSource) {
        let slot = Arc::new(Mutex::new(None));
        let device = OutputDevice::new(Capture(Arc::clone(&slot)), Duration::from_millis(10));
        let format = SampleFormat::new(1_000, 1);
        device.reinit(format).unwrap();
        let session = device.start(format, (1..=frames as i16).collect()).unwrap();
        let source = slot.lock().unwrap().take().unwrap();
        (device, session, source)
    }

    #[test]
    fn test_renders_buffer_then_signals_done() {
        let (_device, mut session, source) = start(25);

        let rendered: Vec<i16> = source.collect();
        assert_eq!(rendered, (1..=25).collect::<Vec<i16>>());
        assert_eq!(session.handle.position(), 25);
        assert!(session.done.try_recv().is_ok());
    }

    #[test]
    fn test_paused_source_emits_silence_without_advancing() {
        let (_device, session, mut source) = start(100);

        assert_eq!(source.next(), Some(1));
        let before = session.handle.position();

        session.handle.toggle_pause();
        // the rest of the window copied before the pause still plays
        let tail: Vec<i16> = source.by_ref().take(9).collect();
        assert_eq!(tail, (2..=10).collect::<Vec<i16>>());

        let silence: Vec<i16> = source.by_ref().take(30).collect();
        assert!(silence.iter().all(|s| *s == 0));
        assert_eq!(session.handle.position(), before);

        session.handle.toggle_pause();
        assert_eq!(source.next(), Some(11));
    }

    #[test]
    fn test_seek_takes_effect_on_next_window() {
        let (_device, session, mut source) = start(100);

        source.next();
        session.handle.seek(80);
        let after: Vec<i16> = source.by_ref().skip(9).take(3).collect();
        assert_eq!(after, vec![81, 82, 83]);
    }

    #[test]
    fn test_released_session_ends_source_without_done() {
        let (_device, mut session, mut source) = start(100);

        source.next();
        session.handle.release();
        let rest: Vec<i16> = source.by_ref().collect();
        assert_eq!(rest.len(), 9);
        assert_eq!(source.next(), None);
        // the sender went away with the session without firing
        assert!(matches!(
            session.done.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_contended_lock_yields_silence() {
        let (device, session, mut source) = start(100);

        let during = device.with_session(1, |_| source.next());
        assert_eq!(during, Some(Some(0)));
        assert_eq!(session.handle.position(), 0);

        assert_eq!(source.next(), Some(1));
    }
}
