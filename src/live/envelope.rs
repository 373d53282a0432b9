//! Text-safe framing for audio exchanged with the live service
//!
//! The signaling channel is JSON, so PCM bytes travel as standard padded
//! base64 alongside a `audio/pcm;rate=N` media type.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::audio::pcm;
use crate::{Error, Result};

/// Sample rate assumed for inbound audio that omits a rate parameter
pub const DEFAULT_INBOUND_RATE: u32 = 24000;

/// Encode raw bytes as base64 text
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode base64 text back to raw bytes
///
/// # Errors
///
/// Returns `MalformedPayload` on an invalid alphabet or padding
pub fn decode(text: &str) -> Result<Vec<u8>> {
    B64.decode(text)
        .map_err(|e| Error::MalformedPayload(format!("base64: {e}")))
}

/// Media type tag carried with every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Mono 16-bit little-endian PCM at the given rate
    Pcm { sample_rate: u32 },
}

impl MediaType {
    /// PCM at `sample_rate`
    #[must_use]
    pub const fn pcm(sample_rate: u32) -> Self {
        Self::Pcm { sample_rate }
    }

    /// Sample rate of the payload
    #[must_use]
    pub const fn sample_rate(self) -> u32 {
        match self {
            Self::Pcm { sample_rate } => sample_rate,
        }
    }

    /// Parse a MIME string such as `audio/pcm;rate=24000`
    ///
    /// Returns `None` for anything that is not raw PCM audio.
    #[must_use]
    pub fn parse(mime: &str) -> Option<Self> {
        let mut parts = mime.split(';').map(str::trim);
        if !parts.next()?.eq_ignore_ascii_case("audio/pcm") {
            return None;
        }

        let mut sample_rate = DEFAULT_INBOUND_RATE;
        for param in parts {
            if let Some((key, value)) = param.split_once('=')
                && key.trim().eq_ignore_ascii_case("rate")
            {
                sample_rate = value.trim().parse().ok()?;
            }
        }

        Some(Self::Pcm { sample_rate })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcm { sample_rate } => write!(f, "audio/pcm;rate={sample_rate}"),
        }
    }
}

/// Unit of audio exchanged with the remote service in both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    payload: String,
    media_type: MediaType,
}

impl EncodedChunk {
    /// Wrap an already-encoded payload as received off the wire
    #[must_use]
    pub const fn new(payload: String, media_type: MediaType) -> Self {
        Self {
            payload,
            media_type,
        }
    }

    /// Encode raw bytes into a chunk
    #[must_use]
    pub fn from_bytes(bytes: &[u8], media_type: MediaType) -> Self {
        Self::new(encode(bytes), media_type)
    }

    /// Encode i16 samples as little-endian PCM
    #[must_use]
    pub fn from_pcm(samples: &[i16], sample_rate: u32) -> Self {
        Self::from_bytes(&pcm::int16_to_le_bytes(samples), MediaType::pcm(sample_rate))
    }

    /// Base64 payload
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Media type tag
    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Decode the payload to raw bytes
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` if the payload is not valid base64
    pub fn decode(&self) -> Result<Vec<u8>> {
        decode(&self.payload)
    }

    /// Decode the payload to normalized float samples
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` on bad base64 or an odd PCM byte count
    pub fn decode_samples(&self) -> Result<Vec<f32>> {
        pcm::pcm_bytes_to_float(&self.decode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_bytes() {
        let inputs: [&[u8]; 5] = [b"", b"a", b"ab", b"abc", &[0, 255, 128, 1, 254, 7, 9]];
        for bytes in inputs {
            assert_eq!(decode(&encode(bytes)).unwrap(), bytes);
        }

        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(decode(&encode(&all)).unwrap(), all);
    }

    #[test]
    fn rejects_invalid_alphabet() {
        assert!(matches!(decode("ab$d"), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn rejects_bad_padding() {
        assert!(matches!(decode("abc"), Err(Error::MalformedPayload(_))));
        assert!(matches!(decode("a==="), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn media_type_parsing() {
        assert_eq!(MediaType::parse("audio/pcm;rate=16000"), Some(MediaType::pcm(16000)));
        assert_eq!(MediaType::parse("audio/pcm; rate=24000"), Some(MediaType::pcm(24000)));
        assert_eq!(MediaType::parse("audio/pcm"), Some(MediaType::pcm(DEFAULT_INBOUND_RATE)));
        assert_eq!(MediaType::parse("image/png"), None);
        assert_eq!(MediaType::parse("audio/pcm;rate=fast"), None);
        assert_eq!(MediaType::pcm(16000).to_string(), "audio/pcm;rate=16000");
    }

    #[test]
    fn chunk_decodes_samples() {
        let chunk = EncodedChunk::from_pcm(&[16384, -16384], 24000);
        assert_eq!(chunk.decode_samples().unwrap(), vec![0.5, -0.5]);
        assert_eq!(chunk.media_type().sample_rate(), 24000);
    }
}
