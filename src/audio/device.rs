//! Device seams used by the live session
//!
//! The session only talks to these traits. [`CpalDevices`] opens the real
//! default devices; tests substitute in-memory doubles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::CpalInput;
use super::frame::AudioFrame;
use super::playback::CpalOutput;
use crate::Result;
use crate::config::AudioConfig;

/// Identifier of a scheduled playback unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Microphone handle
pub trait AudioInput {
    /// Begin delivering frames into `frames`
    ///
    /// # Errors
    ///
    /// Returns error if the device stream cannot be started
    fn start(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> Result<()>;

    /// Stop the stream and release the device; safe to call repeatedly
    fn stop(&mut self);

    fn is_capturing(&self) -> bool;
}

/// Output sink with its own clock
///
/// Times are measured on the output clock, which starts at zero when the
/// sink is opened.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Current position of the output clock
    fn current_time(&self) -> Duration;

    /// Queue `samples` to begin at `start`
    ///
    /// # Errors
    ///
    /// Returns error if the sink is closed
    fn schedule(&mut self, id: UnitId, samples: Arc<[f32]>, start: Duration) -> Result<()>;

    /// Silence a unit immediately; unknown ids are ignored
    fn stop_unit(&mut self, id: UnitId);

    /// Units that finished playing since the last call
    fn take_ended(&mut self) -> Vec<UnitId>;

    /// Close the sink and release the device
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to shut the stream down
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Acquires device handles for a session
pub trait DeviceProvider {
    /// Open the capture device
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `DeviceUnavailable` when no microphone
    /// can be used
    fn open_input(&self, config: &AudioConfig) -> Result<Box<dyn AudioInput>>;

    /// Open the playback device
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` when no output device can be used
    fn open_output(&self, config: &AudioConfig) -> Result<Box<dyn AudioOutput>>;
}

/// Default host devices via cpal
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalDevices;

impl DeviceProvider for CpalDevices {
    fn open_input(&self, config: &AudioConfig) -> Result<Box<dyn AudioInput>> {
        Ok(Box::new(CpalInput::open(config)?))
    }

    fn open_output(&self, config: &AudioConfig) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(CpalOutput::open(config)?))
    }
}

/// Map a cpal stream build failure onto the session error taxonomy
pub(crate) fn build_error(err: cpal::BuildStreamError) -> crate::Error {
    use cpal::BuildStreamError;

    match err {
        BuildStreamError::DeviceNotAvailable => {
            crate::Error::DeviceUnavailable("device no longer available".to_string())
        }
        BuildStreamError::StreamConfigNotSupported => {
            crate::Error::DeviceUnavailable("stream config not supported".to_string())
        }
        BuildStreamError::BackendSpecific { err } => backend_error(err.description),
        other => crate::Error::Audio(other.to_string()),
    }
}

/// Map a cpal play failure onto the session error taxonomy
pub(crate) fn play_error(err: cpal::PlayStreamError) -> crate::Error {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => {
            crate::Error::DeviceUnavailable("device no longer available".to_string())
        }
        cpal::PlayStreamError::BackendSpecific { err } => backend_error(err.description),
    }
}

fn backend_error(description: String) -> crate::Error {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        crate::Error::PermissionDenied(description)
    } else {
        crate::Error::Audio(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_permission_errors_are_classified() {
        let err = build_error(cpal::BuildStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "Permission denied (os error 13)".to_string(),
            },
        });
        assert!(matches!(err, crate::Error::PermissionDenied(_)));

        let err = build_error(cpal::BuildStreamError::DeviceNotAvailable);
        assert!(matches!(err, crate::Error::DeviceUnavailable(_)));

        let err = play_error(cpal::PlayStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "underrun".to_string(),
            },
        });
        assert!(matches!(err, crate::Error::Audio(_)));
    }
}
