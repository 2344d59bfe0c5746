use super::{LoadError, PlaybackHandle, PlaybackSession, SampleFormat, SessionSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// The speaker itself. Implementations render `SessionSource`s on their own thread.
pub trait OutputBackend: Send {
    /// Open the output stream for `format`. The device is closed when this is called.
    fn open(&mut self, format: SampleFormat) -> Result<(), String>;
    /// Start rendering `source`; it ends on its own once the session is exhausted or released.
    /// An error means the source was not taken and will never render.
    fn play(&mut self, source: SessionSource) -> Result<(), String>;
    /// Stop whatever is currently rendering.
    fn clear(&mut self);
    fn close(&mut self);
}

/// Live state of the one active session. Only touched with the device lock held.
pub(crate) struct SessionState {
    pub(crate) id: u64,
    pub(crate) samples: Arc<[i16]>, // interleaved
    pub(crate) channels: usize,
    pub(crate) position: usize,     // frames
    pub(crate) paused: bool,
    pub(crate) done: Option<oneshot::Sender<()>>,
}

impl SessionState {
    pub(crate) fn length(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

pub(crate) struct DeviceState {
    backend: Box<dyn OutputBackend>,
    open_format: Option<SampleFormat>,
    pub(crate) session: Option<SessionState>,
    next_session: u64,
}

impl DeviceState {
    fn release_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                self.backend.clear();
                debug!("Released session {}", session.id);
                true
            }
            None => false,
        }
    }
}

/// Process-wide output device. Clones share one lock, which serializes
/// device lifecycle, seeks, pause toggles and the renderer's sample pulls.
#[derive(Clone)]
pub struct OutputDevice {
    shared: Arc<Mutex<DeviceState>>,
    window: Duration,
}

impl OutputDevice {
    pub fn new(backend: impl OutputBackend + 'static, window: Duration) -> Self {
        Self {
            shared: Arc::new(Mutex::new(DeviceState {
                backend: Box::new(backend),
                open_format: None,
                session: None,
                next_session: 1,
            })),
            window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tear down any previous claim, then open the device for `format`.
    pub fn reinit(&self, format: SampleFormat) -> Result<(), LoadError> {
        let mut state = self.lock();
        state.release_session();
        if state.open_format.take().is_some() {
            state.backend.close();
        }

        state.backend.open(format).map_err(LoadError::OutputInit)?;
        state.open_format = Some(format);
        info!(
            "Output open: {} Hz, {} ch, {:?} window",
            format.sample_rate, format.channels, self.window
        );
        Ok(())
    }

    /// Install `samples` as the active session and submit it for rendering.
    /// The receiver fires once the renderer has pulled the last frame. If the
    /// backend refuses the source, the session is released again.
    pub fn start(&self, format: SampleFormat, samples: Vec<i16>) -> Result<PlaybackSession, LoadError> {
        let (done_tx, done_rx) = oneshot::channel();
        let channels = format.channels.max(1) as usize;
        let samples: Arc<[i16]> = samples.into();
        let length = samples.len() / channels;

        let mut state = self.lock();
        state.release_session();

        let id = state.next_session;
        state.next_session += 1;
        state.session = Some(SessionState {
            id,
            samples,
            channels,
            position: 0,
            paused: false,
            done: Some(done_tx),
        });

        let chunk_frames = format.frames_for(self.window).max(1);
        let source = SessionSource::new(Arc::clone(&self.shared), id, format, chunk_frames);
        if let Err(e) = state.backend.play(source) {
            state.release_session();
            return Err(LoadError::OutputInit(e));
        }
        drop(state);

        debug!("Started session {} ({} frames)", id, length);
        Ok(PlaybackSession {
            handle: PlaybackHandle::new(self.clone(), id, format, length),
            done: done_rx,
        })
    }

    /// Run `f` against session `id` if it is still the active one.
    pub(crate) fn with_session<T>(&self, id: u64, f: impl FnOnce(&mut SessionState) -> T) -> Option<T> {
        let mut state = self.lock();
        state.session.as_mut().filter(|s| s.id == id).map(f)
    }

    /// Release session `id`. A no-op if it was already released or replaced.
    pub(crate) fn release(&self, id: u64) -> bool {
        let mut state = self.lock();
        if state.session.as_ref().map(|s| s.id) == Some(id) {
            state.release_session()
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Release everything and close the device. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.release_session();
        if state.open_format.take().is_some() {
            state.backend.close();
            info!("Output closed");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{BackendCall, RecordingBackend};
    use super::*;

    fn device(backend: &RecordingBackend) -> OutputDevice {
        OutputDevice::new(backend.clone(), Duration::from_millis(100))
    }

    #[test]
    fn test_reinit_releases_prior_claim_first() {
        let backend = RecordingBackend::default();
        let device = device(&backend);
        let format = SampleFormat::new(8_000, 1);

        device.reinit(format).unwrap();
        let _session = device.start(format, vec![0; 800]).unwrap();
        device.reinit(format).unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Open(format),
                BackendCall::Play,
                BackendCall::Clear,
                BackendCall::Close,
                BackendCall::Open(format),
            ]
        );
        assert!(!device.has_session());
    }

    #[test]
    fn test_failed_open_is_output_init_error() {
        let backend = RecordingBackend::failing();
        let device = device(&backend);

        let err = device.reinit(SampleFormat::new(44_100, 2)).unwrap_err();
        assert!(matches!(err, LoadError::OutputInit(_)));

        // Nothing was opened, so shutdown has nothing to close.
        device.shutdown();
        assert_eq!(backend.count(&BackendCall::Close), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let backend = RecordingBackend::default();
        let device = device(&backend);
        let format = SampleFormat::new(8_000, 2);

        device.reinit(format).unwrap();
        let _session = device.start(format, vec![0; 1_600]).unwrap();

        device.shutdown();
        device.shutdown();

        assert_eq!(backend.count(&BackendCall::Clear), 1);
        assert_eq!(backend.count(&BackendCall::Close), 1);
    }

    #[test]
    fn test_refused_source_releases_session() {
        let backend = RecordingBackend::refusing();
        let device = device(&backend);
        let format = SampleFormat::new(8_000, 1);

        device.reinit(format).unwrap();
        let result = device.start(format, vec![0; 800]);

        assert!(matches!(result, Err(LoadError::OutputInit(_))));
        assert!(!device.has_session());
        assert_eq!(
            backend.calls(),
            vec![BackendCall::Open(format), BackendCall::Play, BackendCall::Clear]
        );
    }
}
