//! WebSocket transport for the Gemini Live `BidiGenerateContent` stream

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use super::envelope::EncodedChunk;
use super::protocol::{ClientMessage, ServerEvent, ServerMessage, SessionSetup};
use super::transport::{LiveConnection, LiveConnector, LiveTransport};
use crate::config::LiveConfig;
use crate::{Error, Result};

/// Opens live streams against a Gemini-compatible WebSocket endpoint
#[derive(Debug)]
pub struct GeminiConnector {
    endpoint: String,
    api_key: SecretString,
    connect_timeout: Duration,
}

impl GeminiConnector {
    #[must_use]
    pub const fn new(endpoint: String, api_key: SecretString, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            api_key,
            connect_timeout,
        }
    }

    /// Build a connector from configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if no API key is configured
    pub fn from_config(config: &LiveConfig) -> Result<Self> {
        let api_key = config.api_key.as_ref().ok_or_else(|| {
            Error::Config(
                "no API key configured (set IPGUARD_API_KEY or GEMINI_API_KEY)".to_string(),
            )
        })?;

        Ok(Self::new(
            config.endpoint.clone(),
            SecretString::from(api_key.expose_secret().to_string()),
            config.connect_timeout,
        ))
    }

    fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    async fn open(&self, setup: &SessionSetup) -> Result<LiveConnection> {
        let url = self.url()?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(connection_error)?;
        let (mut sink, mut stream) = ws.split();

        sink.send(Message::Text(setup.to_message().to_json()?))
            .await
            .map_err(connection_error)?;

        await_setup_complete(&mut stream).await?;
        tracing::debug!(endpoint = %self.endpoint, model = %setup.model, "live stream open");

        let (events_tx, events) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        tokio::spawn(async move {
            while let Some(out) = outbound_rx.recv().await {
                match out {
                    Outbound::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            tracing::warn!(error = %e, "live stream send failed");
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });
        let reader = tokio::spawn(read_loop(stream, events_tx));

        Ok(LiveConnection {
            transport: Box::new(GeminiTransport {
                outbound,
                reader,
                open: true,
            }),
            events,
        })
    }
}

#[async_trait]
impl LiveConnector for GeminiConnector {
    async fn connect(&self, setup: &SessionSetup) -> Result<LiveConnection> {
        tokio::time::timeout(self.connect_timeout, self.open(setup))
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "timed out after {}s opening live stream",
                    self.connect_timeout.as_secs()
                ))
            })?
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// Outbound half of a Gemini live stream
pub struct GeminiTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    open: bool,
}

impl LiveTransport for GeminiTransport {
    fn send_audio(&self, chunk: EncodedChunk) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Connection("live stream is closed".to_string()));
        }

        let text = ClientMessage::audio(&chunk).to_json()?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| Error::Connection("live stream writer stopped".to_string()))
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.reader.abort();
        // Writer may already be gone after a remote close
        let _ = self.outbound.send(Outbound::Close);
        tracing::debug!("live stream closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && !self.outbound.is_closed()
    }
}

impl Drop for GeminiTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn connection_error(err: tungstenite::Error) -> Error {
    Error::Connection(err.to_string())
}

fn message_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text),
        // The service also delivers JSON in binary frames
        Message::Binary(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

async fn await_setup_complete<S>(stream: &mut S) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        let msg = msg.map_err(connection_error)?;
        if let Message::Close(frame) = &msg {
            let reason = frame
                .as_ref()
                .map_or_else(String::new, |f| f.reason.to_string());
            return Err(Error::Connection(format!("stream closed during setup: {reason}")));
        }

        if let Some(text) = message_text(msg)
            && ServerMessage::parse(&text)?.is_setup_complete()
        {
            return Ok(());
        }
    }

    Err(Error::Connection("stream ended during setup".to_string()))
}

async fn read_loop<S>(mut stream: S, events: mpsc::UnboundedSender<ServerEvent>)
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| f.reason.into_owned())
                    .filter(|r| !r.is_empty());
            }
            Some(Ok(msg)) => {
                let Some(text) = message_text(msg) else {
                    continue;
                };
                match ServerMessage::parse(&text) {
                    Ok(message) => {
                        for event in message.into_events() {
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unparseable server message");
                    }
                }
            }
            Some(Err(e)) => break Some(format!("connection error: {e}")),
            None => break None,
        }
    };

    tracing::debug!(reason = ?reason, "live stream ended");
    let _ = events.send(ServerEvent::Closed { reason });
}
