use super::{LoadError, OutputDevice, PlaybackSession, SampleFormat};
use crate::catalog::Track;
use rodio::{Decoder, Source};
use std::io::Cursor;
use tracing::{debug, info};

/// Where raw track bytes come from.
#[allow(async_fn_in_trait)]
pub trait StreamFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

/// Downloads the whole stream body over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoadError::Fetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::Fetch(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// A fully materialized track, ready for random access.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub format: SampleFormat,
    pub samples: Vec<i16>, // interleaved
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }
}

/// Decode an entire payload in one go. Trailing partial frames are dropped.
pub fn decode(bytes: Vec<u8>) -> Result<DecodedAudio, LoadError> {
    let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| LoadError::Decode(e.to_string()))?;
    let format = SampleFormat::new(decoder.sample_rate(), decoder.channels());
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(LoadError::Decode(format!("unusable stream format {:?}", format)));
    }

    let mut samples: Vec<i16> = decoder.collect();
    let whole = samples.len() - samples.len() % format.channels as usize;
    samples.truncate(whole);

    if samples.is_empty() {
        return Err(LoadError::Decode("stream contains no audio".to_string()));
    }

    Ok(DecodedAudio { format, samples })
}

/// Fetch → decode → claim the device → start rendering.
pub struct AudioPipeline<F> {
    fetcher: F,
    device: OutputDevice,
}

impl<F: StreamFetcher> AudioPipeline<F> {
    pub fn new(fetcher: F, device: OutputDevice) -> Self {
        Self { fetcher, device }
    }

    pub fn device(&self) -> &OutputDevice {
        &self.device
    }

    pub async fn load(&self, track: &Track) -> Result<PlaybackSession, LoadError> {
        let bytes = self.fetcher.fetch(&track.stream_url).await?;
        debug!("Fetched {} bytes for '{}'", bytes.len(), track.title);

        let decoded = tokio::task::spawn_blocking(move || decode(bytes))
            .await
            .map_err(|e| LoadError::Decode(format!("decoder task failed: {}", e)))??;

        let format = decoded.format;
        info!(
            "Decoded '{}': {} frames at {} Hz, {} ch ({:?})",
            track.title,
            decoded.frames(),
            format.sample_rate,
            format.channels,
            format.duration_of(decoded.frames())
        );

        self.device.reinit(format)?;
        self.device.start(format, decoded.samples)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// 16-bit PCM WAV with a ramp so every frame is distinguishable.
    pub fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let data_len = (frames * channels as usize * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..frames {
            for _ in 0..channels {
                out.extend_from_slice(&((frame % 1_000) as i16).to_le_bytes());
            }
        }
        out
    }

    /// Serves canned payloads by URL and remembers what was asked for.
    #[derive(Clone, Default)]
    pub struct FakeFetcher {
        pub payloads: HashMap<String, Result<Vec<u8>, String>>,
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeFetcher {
        pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
            self.payloads.insert(url.to_string(), Ok(body));
            self
        }

        pub fn fail(mut self, url: &str, reason: &str) -> Self {
            self.payloads.insert(url.to_string(), Err(reason.to_string()));
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl StreamFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.payloads.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(reason)) => Err(LoadError::Fetch(reason.clone())),
                None => Err(LoadError::Fetch(format!("404 for {}", url))),
            }
        }
    }
}
