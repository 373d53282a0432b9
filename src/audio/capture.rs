//! Microphone capture into fixed-size frames

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::device::{self, AudioInput};
use super::frame::{AudioFrame, FrameSlicer, downmix};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Captures audio from the default input device
///
/// The stream callback down-mixes to mono, slices into frames of
/// `frame_size` samples and pushes each frame into an unbounded channel.
pub struct CpalInput {
    device: Device,
    config: StreamConfig,
    frame_size: usize,
    stream: Option<Stream>,
}

impl CpalInput {
    /// Open the default input device at the configured rate
    ///
    /// Mono is preferred; if the device only offers multi-channel configs at
    /// that rate the first one is used and down-mixed.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if there is no input device or none
    /// supports the requested sample rate
    pub fn open(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let rate = SampleRate(audio.input_sample_rate);

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported = || {
            device
                .supported_input_configs()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))
        };

        let supported_config = supported()?
            .find(|c| {
                c.channels() == audio.channels
                    && c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
            })
            .or_else(|| {
                supported()
                    .ok()?
                    .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!(
                    "no input config supports {} Hz",
                    audio.input_sample_rate
                ))
            })?;

        let config = supported_config.with_sample_rate(rate).config();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = audio.input_sample_rate,
            channels = config.channels,
            frame_size = audio.frame_size,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            frame_size: audio.frame_size,
            stream: None,
        })
    }

    /// Capture sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl AudioInput for CpalInput {
    fn start(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let mut slicer = FrameSlicer::new(self.frame_size, self.sample_rate());

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix(data, channels);
                    for frame in slicer.push(&mono) {
                        // Receiver gone means the session is tearing down
                        if frames.send(frame).is_err() {
                            break;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(device::build_error)?;

        stream.play().map_err(device::play_error)?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encode mono i16 frames as a WAV file
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn frames_to_wav(frames: &[AudioFrame], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in frames.iter().flat_map(AudioFrame::samples) {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
