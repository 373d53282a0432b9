//! ipguard-voice - Realtime voice consultation for an AI IP protection assistant
//!
//! This library provides the live consultation core:
//! - Microphone capture sliced into 16 kHz PCM frames
//! - Base64 framing and typed messages for the live service stream
//! - Gapless scheduled playback with immediate interruption
//! - A session state machine that releases every handle on any exit path
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  frames   ┌──────────────┐  realtimeInput  ┌────────────┐
//! │   Capture    │──────────▶│              │────────────────▶│            │
//! │  (cpal in)   │           │ LiveSession  │                 │   Live     │
//! └──────────────┘           │ (lifecycle)  │◀────────────────│  service   │
//! ┌──────────────┐  units    │              │  ServerEvent    │ (WebSocket)│
//! │  Playback    │◀──────────│              │                 └────────────┘
//! │  Scheduler   │           └──────────────┘
//! │  (cpal out)  │
//! └──────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod live;

pub use audio::{AudioFrame, AudioInput, AudioOutput, CpalDevices, DeviceProvider};
pub use config::{AudioConfig, Config, LiveConfig};
pub use error::{Error, Result};
pub use live::{
    EncodedChunk, GeminiConnector, LiveSession, MediaType, PlaybackScheduler, ServerEvent,
    SessionSetup, SessionState, SessionUpdate, StopHandle,
};
