//! Live voice consultation
//!
//! Streams microphone audio to a remote conversational service and plays
//! its spoken replies back without gaps, while tracking both transcripts.

mod envelope;
mod gemini;
mod protocol;
mod scheduler;
mod session;
mod transcript;
mod transport;

pub use envelope::{DEFAULT_INBOUND_RATE, EncodedChunk, MediaType, decode, encode};
pub use gemini::{GeminiConnector, GeminiTransport};
pub use protocol::{ClientMessage, Modality, ServerEvent, ServerMessage, SessionSetup};
pub use scheduler::{PlaybackScheduler, PlaybackUnit};
pub use session::{LiveSession, SessionState, SessionUpdate, StopHandle};
pub use transcript::Transcript;
pub use transport::{LiveConnection, LiveConnector, LiveTransport};
