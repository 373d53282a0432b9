//! 16-bit PCM conversion
//!
//! Samples are scaled by the full i16 range (32768). Float to int casts
//! saturate, so input outside `[-1.0, 1.0]` clamps to `i16::MIN`/`i16::MAX`.

use crate::{Error, Result};

/// Scaling factor between normalized floats and i16 samples
pub const PCM_SCALE: f32 = 32768.0;

/// Convert normalized float samples to i16
#[must_use]
pub fn float_to_int16_frame(samples: &[f32]) -> Vec<i16> {
    #[allow(clippy::cast_possible_truncation)]
    samples.iter().map(|&s| (s * PCM_SCALE) as i16).collect()
}

/// Convert i16 samples back to normalized floats
#[must_use]
pub fn int16_frame_to_float(frame: &[i16]) -> Vec<f32> {
    frame.iter().map(|&s| f32::from(s) / PCM_SCALE).collect()
}

/// Serialize i16 samples as little-endian bytes
#[must_use]
pub fn int16_to_le_bytes(frame: &[i16]) -> Vec<u8> {
    frame.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian bytes into i16 samples
///
/// # Errors
///
/// Returns `MalformedPayload` if the byte count is odd
pub fn le_bytes_to_int16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedPayload(format!(
            "pcm payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode little-endian 16-bit PCM bytes straight to floats
///
/// # Errors
///
/// Returns `MalformedPayload` if the byte count is odd
pub fn pcm_bytes_to_float(bytes: &[u8]) -> Result<Vec<f32>> {
    le_bytes_to_int16(bytes).map(|frame| int16_frame_to_float(&frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / PCM_SCALE;

    #[test]
    fn scales_by_full_range() {
        assert_eq!(float_to_int16_frame(&[0.0, 0.5, -0.5, -1.0]), vec![0, 16384, -16384, -32768]);
    }

    #[test]
    fn saturates_out_of_range() {
        assert_eq!(float_to_int16_frame(&[1.0, 2.0, -3.0]), vec![i16::MAX, i16::MAX, i16::MIN]);
    }

    #[test]
    fn float_roundtrip_within_one_step() {
        let samples: Vec<f32> = (0..=200).map(|i| (i as f32 - 100.0) / 100.0).collect();
        let restored = int16_frame_to_float(&float_to_int16_frame(&samples));

        for (original, back) in samples.iter().zip(&restored) {
            assert!(
                (original - back).abs() <= STEP + f32::EPSILON,
                "{original} drifted to {back}"
            );
        }
    }

    #[test]
    fn bytes_are_little_endian() {
        assert_eq!(int16_to_le_bytes(&[0x0102, -1]), vec![0x02, 0x01, 0xff, 0xff]);
        assert_eq!(le_bytes_to_int16(&[0x02, 0x01, 0xff, 0xff]).unwrap(), vec![0x0102, -1]);
    }

    #[test]
    fn odd_byte_count_is_malformed() {
        let err = pcm_bytes_to_float(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }
}
