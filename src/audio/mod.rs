// Audio pipeline - fetch, decode fully into memory, hand to the output device
// Everything that touches playback position or the device goes through OutputDevice's lock

pub mod device;
pub mod handle;
pub mod pipeline;
pub mod rodio_backend;
pub mod source;

pub use device::{OutputBackend, OutputDevice};
pub use handle::{PlaybackHandle, PlaybackSession};
pub use pipeline::{decode, AudioPipeline, DecodedAudio, HttpFetcher, StreamFetcher};
pub use rodio_backend::RodioBackend;
pub use source::SessionSource;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch track: {0}")]
    Fetch(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("failed to initialize audio output: {0}")]
    OutputInit(String),
}

/// Shape of a decoded buffer. Positions and lengths are counted in frames
/// (one sample per channel), so a second is always `sample_rate` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl SampleFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_nanos() * self.sample_rate as u128 / 1_000_000_000) as usize
    }

    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((frames as u128 * 1_000_000_000 / self.sample_rate as u128) as u64)
    }
}
