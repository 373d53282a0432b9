//! Fixed-size capture frames

use std::sync::Arc;
use std::time::Duration;

use super::pcm;
use crate::live::EncodedChunk;

/// Immutable block of 16-bit samples produced by the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    /// Create a frame from already-converted samples
    #[must_use]
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    /// Convert normalized float samples into a mono frame
    #[must_use]
    pub fn from_float(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(pcm::float_to_int16_frame(samples), sample_rate, 1)
    }

    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time of the frame
    #[must_use]
    pub fn duration(&self) -> Duration {
        let per_channel = self.samples.len() / usize::from(self.channels.max(1));
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(per_channel as f64 / f64::from(self.sample_rate.max(1)))
    }

    /// Wrap the frame for transmission
    #[must_use]
    pub fn to_chunk(&self) -> EncodedChunk {
        EncodedChunk::from_pcm(&self.samples, self.sample_rate)
    }
}

/// Slices an arbitrary stream of mono samples into fixed-size frames
///
/// Device callbacks deliver buffers of whatever size the backend picks; the
/// slicer carries the remainder over until a full frame is available.
#[derive(Debug)]
pub struct FrameSlicer {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameSlicer {
    #[must_use]
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            sample_rate,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Append samples and return every frame that became complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_len;
        if complete == 0 {
            return Vec::new();
        }

        let consumed = complete * self.frame_len;
        let frames = self.pending[..consumed]
            .chunks_exact(self.frame_len)
            .map(|chunk| AudioFrame::from_float(chunk, self.sample_rate))
            .collect();
        self.pending.drain(..consumed);
        frames
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Average interleaved channels down to mono
#[must_use]
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slicer_emits_full_frames_and_keeps_remainder() {
        let mut slicer = FrameSlicer::new(4096, 16000);

        assert!(slicer.push(&[0.1; 3000]).is_empty());
        assert_eq!(slicer.pending(), 3000);

        let frames = slicer.push(&[0.1; 7000]);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4096 && f.sample_rate() == 16000));
        assert_eq!(slicer.pending(), 10000 - 2 * 4096);
    }

    #[test]
    fn frame_duration_uses_sample_rate() {
        let frame = AudioFrame::new(vec![0; 16000], 16000, 1);
        assert_eq!(frame.duration(), Duration::from_secs(1));

        let stereo = AudioFrame::new(vec![0; 16000], 16000, 2);
        assert_eq!(stereo.duration(), Duration::from_millis(500));
    }

    #[test]
    fn frame_chunk_is_tagged_with_capture_rate() {
        let frame = AudioFrame::from_float(&[0.5, -0.5], 16000);
        let chunk = frame.to_chunk();

        assert_eq!(chunk.media_type().to_string(), "audio/pcm;rate=16000");
        assert_eq!(chunk.decode().unwrap(), vec![0x00, 0x40, 0x00, 0xc0]);
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(downmix(&[0.2, 0.4], 1), vec![0.2, 0.4]);
    }
}
