//! Audio devices and sample formats
//!
//! Handles microphone capture, scheduled playback and 16-bit PCM conversion.

mod capture;
mod device;
mod frame;
pub mod pcm;
mod playback;

pub use capture::{CpalInput, frames_to_wav};
pub use device::{AudioInput, AudioOutput, CpalDevices, DeviceProvider, UnitId};
pub use frame::{AudioFrame, FrameSlicer, downmix};
pub use playback::CpalOutput;
