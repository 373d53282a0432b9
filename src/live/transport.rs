//! Transport seam between the session and the remote service

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::envelope::EncodedChunk;
use super::protocol::{ServerEvent, SessionSetup};
use crate::Result;

/// Opens bidirectional streams to the live service
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a stream and complete the setup handshake
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the stream cannot be opened or the service
    /// rejects the setup
    async fn connect(&self, setup: &SessionSetup) -> Result<LiveConnection>;
}

/// An open stream: outbound handle plus inbound events in arrival order
pub struct LiveConnection {
    pub transport: Box<dyn LiveTransport>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("open", &self.transport.is_open())
            .finish_non_exhaustive()
    }
}

/// Outbound half of an open stream
pub trait LiveTransport: Send {
    /// Queue an audio chunk for sending
    ///
    /// Fire-and-forget: returns once the chunk is queued, never waits for
    /// the network.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the stream is already closed
    fn send_audio(&self, chunk: EncodedChunk) -> Result<()>;

    /// Close the stream; closing twice is a no-op
    ///
    /// # Errors
    ///
    /// Returns error if the close could not be requested
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}
