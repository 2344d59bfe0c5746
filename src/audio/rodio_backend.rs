// rodio speaker - owns the OutputStream on a dedicated thread
// OutputStream is !Send, so the device lock only ever holds a command sender

use super::{OutputBackend, SampleFormat, SessionSource};
use anyhow::{Context, Result};
use rodio::cpal::traits::HostTrait;
use rodio::cpal::{self, SupportedBufferSize, SupportedStreamConfig};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, error, warn};

enum AudioCommand {
    Open {
        format: SampleFormat,
        reply: mpsc::SyncSender<Result<(), String>>,
    },
    Play {
        source: SessionSource,
        reply: mpsc::SyncSender<Result<(), String>>,
    },
    Clear,
    Close,
}

pub struct RodioBackend {
    commands: mpsc::Sender<AudioCommand>,
}

impl RodioBackend {
    pub fn spawn() -> Result<Self> {
        let (commands, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_thread(receiver))
            .context("spawning audio output thread")?;
        Ok(Self { commands })
    }

    fn send(&self, command: AudioCommand) {
        if self.commands.send(command).is_err() {
            error!("Audio output thread is gone");
        }
    }

    /// Send a command and wait for the output thread's answer.
    fn request(
        &self,
        command: impl FnOnce(mpsc::SyncSender<Result<(), String>>) -> AudioCommand,
    ) -> Result<(), String> {
        let (reply, response) = mpsc::sync_channel(1);
        self.send(command(reply));
        response
            .recv()
            .map_err(|_| "audio output thread stopped".to_string())?
    }
}

impl OutputBackend for RodioBackend {
    fn open(&mut self, format: SampleFormat) -> Result<(), String> {
        self.request(|reply| AudioCommand::Open { format, reply })
    }

    fn play(&mut self, source: SessionSource) -> Result<(), String> {
        self.request(|reply| AudioCommand::Play { source, reply })
    }

    fn clear(&mut self) {
        self.send(AudioCommand::Clear);
    }

    fn close(&mut self) {
        self.send(AudioCommand::Close);
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.commands.send(AudioCommand::Close);
    }
}

fn run_output_thread(commands: mpsc::Receiver<AudioCommand>) {
    let mut stream: Option<(OutputStream, OutputStreamHandle)> = None;
    let mut sink: Option<Sink> = None;

    while let Ok(command) = commands.recv() {
        match command {
            AudioCommand::Open { format, reply } => {
                stop(&mut sink);
                stream = None;
                let result = open_stream(format).map(|opened| stream = Some(opened));
                let _ = reply.send(result);
            }
            AudioCommand::Play { source, reply } => {
                stop(&mut sink);
                let result = match stream.as_ref() {
                    Some((_, handle)) => Sink::try_new(handle)
                        .map(|new_sink| {
                            new_sink.append(source);
                            sink = Some(new_sink);
                        })
                        .map_err(|e| format!("could not create sink: {}", e)),
                    None => Err("no open output stream".to_string()),
                };
                if let Err(e) = &result {
                    warn!("Play rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            AudioCommand::Clear => stop(&mut sink),
            AudioCommand::Close => {
                stop(&mut sink);
                if stream.take().is_some() {
                    debug!("Output stream dropped");
                }
            }
        }
    }
    debug!("Audio output thread exiting");
}

fn stop(sink: &mut Option<Sink>) {
    if let Some(sink) = sink.take() {
        sink.stop();
    }
}

/// Ask for the track's own rate first; fall back to whatever the device likes
/// (rodio resamples).
fn open_stream(format: SampleFormat) -> Result<(OutputStream, OutputStreamHandle), String> {
    let host = cpal::default_host();
    if let Some(device) = host.default_output_device() {
        let config = SupportedStreamConfig::new(
            format.channels,
            cpal::SampleRate(format.sample_rate),
            SupportedBufferSize::Unknown,
            cpal::SampleFormat::F32,
        );
        match OutputStream::try_from_device_config(&device, config) {
            Ok(opened) => return Ok(opened),
            Err(e) => debug!(
                "Device rejected {} Hz / {} ch ({}), using default config",
                format.sample_rate, format.channels, e
            ),
        }
    }

    OutputStream::try_default().map_err(|e| e.to_string())
}
