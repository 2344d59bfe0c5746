use super::{OutputDevice, SampleFormat};
use tokio::sync::oneshot;
use tracing::debug;

/// A loaded track: the control handle plus the one-shot that fires when the
/// renderer runs out of frames.
pub struct PlaybackSession {
    pub handle: PlaybackHandle,
    pub done: oneshot::Receiver<()>,
}

/// Controls for the active session. Every call takes the device lock for the
/// duration of the call and nothing longer.
pub struct PlaybackHandle {
    device: OutputDevice,
    session: u64,
    format: SampleFormat,
    length: usize,
    last_position: usize,
    released: bool,
}

impl PlaybackHandle {
    pub(crate) fn new(device: OutputDevice, session: u64, format: SampleFormat, length: usize) -> Self {
        Self {
            device,
            session,
            format,
            length,
            last_position: 0,
            released: false,
        }
    }

    /// Current frame offset. After release this is the position playback stopped at.
    pub fn position(&self) -> usize {
        self.device
            .with_session(self.session, |s| s.position)
            .unwrap_or(self.last_position)
    }

    /// Move to `frame`, clamped to `[0, length - 1]`. Returns where it landed.
    pub fn seek(&self, frame: usize) -> usize {
        let target = frame.min(self.length.saturating_sub(1));
        self.device
            .with_session(self.session, |s| {
                s.position = target;
                target
            })
            .unwrap_or(self.last_position)
    }

    /// Flip the paused flag the renderer consults. Returns the new value.
    pub fn toggle_pause(&self) -> bool {
        self.device
            .with_session(self.session, |s| {
                s.paused = !s.paused;
                s.paused
            })
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn is_paused(&self) -> bool {
        self.device
            .with_session(self.session, |s| s.paused)
            .unwrap_or(false)
    }

    /// Total length in frames.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop rendering and drop the session's claim on the device.
    /// Returns false when there was nothing left to release.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.last_position = self.position();
        self.released = true;
        let released = self.device.release(self.session);
        debug!("Handle {} released (device claim dropped: {})", self.session, released);
        released
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.release();
    }
}
