//! Scheduled playback to speakers
//!
//! A single output stream stays open for the life of the sink. Units are
//! placed on a timeline measured in output frames; the stream callback mixes
//! whatever units cover the current position and advances the clock.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use super::device::{self, AudioOutput, UnitId};
use crate::config::AudioConfig;
use crate::{Error, Result};

#[derive(Debug)]
struct Voice {
    id: UnitId,
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Timeline shared between the sink and the stream callback
#[derive(Debug, Default)]
struct Mixer {
    frames_played: u64,
    voices: Vec<Voice>,
    ended: Vec<UnitId>,
}

impl Mixer {
    /// Fill an interleaved output buffer and advance the clock
    fn render(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let position = self.frames_played;
            let mut sample = 0.0_f32;
            for voice in &self.voices {
                if position >= voice.start_frame && position < voice.end_frame() {
                    #[allow(clippy::cast_possible_truncation)]
                    let offset = (position - voice.start_frame) as usize;
                    sample += voice.samples[offset];
                }
            }

            let sample = sample.clamp(-1.0, 1.0);
            for out in frame.iter_mut() {
                *out = sample;
            }
            self.frames_played += 1;
        }

        let now = self.frames_played;
        let ended = &mut self.ended;
        self.voices.retain(|voice| {
            let done = voice.end_frame() <= now;
            if done {
                ended.push(voice.id);
            }
            !done
        });
    }
}

/// Plays scheduled units on the default output device
pub struct CpalOutput {
    sample_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device and start its clock
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if there is no output device or none
    /// supports the configured rate
    pub fn open(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let rate = SampleRate(audio.output_sample_rate);

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or_else(|| Error::DeviceUnavailable("no suitable output config found".to_string()))?;

        let config = supported_config.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let callback_mixer = Arc::clone(&mixer);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut mixer) = callback_mixer.lock() {
                        mixer.render(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(device::build_error)?;

        stream.play().map_err(device::play_error)?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = audio.output_sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            sample_rate: audio.output_sample_rate,
            mixer,
            stream: Some(stream),
        })
    }

    fn with_mixer<T>(&self, f: impl FnOnce(&mut Mixer) -> T) -> T {
        let mut mixer = self.mixer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut mixer)
    }

    fn frame_at(&self, time: Duration) -> u64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frame = (time.as_secs_f64() * f64::from(self.sample_rate)).round() as u64;
        frame
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> Duration {
        let frames = self.with_mixer(|m| m.frames_played);
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    fn schedule(&mut self, id: UnitId, samples: Arc<[f32]>, start: Duration) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Audio("output device is closed".to_string()));
        }

        let start_frame = self.frame_at(start);
        self.with_mixer(|m| {
            m.voices.push(Voice {
                id,
                start_frame,
                samples,
            });
        });
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        self.with_mixer(|m| m.voices.retain(|v| v.id != id));
    }

    fn take_ended(&mut self) -> Vec<UnitId> {
        self.with_mixer(|m| std::mem::take(&mut m.ended))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let paused = stream.pause().map_err(|e| Error::Audio(e.to_string()));
            drop(stream);
            self.with_mixer(|m| m.voices.clear());
            tracing::debug!("audio playback closed");
            paused?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close audio output");
        }
    }
}
