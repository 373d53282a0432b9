//! Live consultation session lifecycle
//!
//! ```text
//!  Idle ──start()──▶ Connecting ──open ok──▶ Connected
//!   ▲                    │                      │
//!   │                 failure /              stop() / remote close
//!   │                 stop request              │
//!   └──────────────── Closed ◀──────────────────┘
//! ```
//!
//! `Closed` is transient: teardown passes through it and always lands in
//! `Idle`. Every handle the session acquires lives in an `Option` field and
//! teardown takes each one exactly once, so repeated stops release nothing
//! twice.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::envelope::EncodedChunk;
use super::protocol::{ServerEvent, SessionSetup};
use super::scheduler::PlaybackScheduler;
use super::transcript::Transcript;
use super::transport::{LiveConnector, LiveTransport};
use crate::audio::{AudioFrame, AudioInput, DeviceProvider};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// How often finished playback units are released while idle
const REAP_INTERVAL: Duration = Duration::from_millis(250);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Progress notifications for a front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    State(SessionState),
    InputTranscript(String),
    OutputTranscript(String),
    TurnComplete,
    Interrupted,
    RemoteError(String),
}

/// Requests teardown of a session from another task
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    /// Ask the session to stop; repeated calls are harmless
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        *self.0.borrow()
    }
}

enum Step {
    Stop,
    Event(Option<ServerEvent>),
    Frame(AudioFrame),
    Reap,
}

/// One live voice consultation
///
/// Owns the capture device, the playback scheduler (and through it the
/// output device), the transport and the transcript buffers. At most one
/// session should be active per client.
pub struct LiveSession {
    id: Uuid,
    state: SessionState,
    setup: SessionSetup,
    audio: AudioConfig,
    devices: Box<dyn DeviceProvider>,
    connector: Box<dyn LiveConnector>,
    input: Option<Box<dyn AudioInput>>,
    playback: Option<PlaybackScheduler>,
    transport: Option<Box<dyn LiveTransport>>,
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    frames: Option<mpsc::UnboundedReceiver<AudioFrame>>,
    transcript: Transcript,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl LiveSession {
    pub fn new(
        setup: SessionSetup,
        audio: AudioConfig,
        devices: impl DeviceProvider + 'static,
        connector: impl LiveConnector + 'static,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            setup,
            audio,
            devices: Box::new(devices),
            connector: Box::new(connector),
            input: None,
            playback: None,
            transport: None,
            events: None,
            frames: None,
            transcript: Transcript::default(),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            updates: None,
        }
    }

    /// Identifier of the current (or last) consultation attempt
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Transcript of the turn in progress
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Number of playback units scheduled and not yet finished
    #[must_use]
    pub fn scheduled_units(&self) -> usize {
        self.playback.as_ref().map_or(0, PlaybackScheduler::len)
    }

    /// Whether any device or connection handle is still held
    #[must_use]
    pub const fn holds_resources(&self) -> bool {
        self.input.is_some()
            || self.playback.is_some()
            || self.transport.is_some()
            || self.events.is_some()
            || self.frames.is_some()
    }

    /// Handle that stops this session from elsewhere
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_tx))
    }

    /// Receive progress updates; replaces any previous subscriber
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.updates = Some(tx);
        rx
    }

    /// Acquire devices, open the stream and start capturing
    ///
    /// On any failure everything acquired so far is released and the
    /// session is back in `Idle`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the session is `Idle`
    /// - `PermissionDenied` / `DeviceUnavailable` if a device cannot be opened
    /// - `Connection` if the stream cannot be opened
    /// - `Cancelled` if a stop was requested while connecting
    #[allow(clippy::future_not_send)]
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::InvalidState(format!(
                "cannot start a session that is {}",
                self.state
            )));
        }

        self.stop_tx.send_replace(false);
        self.id = Uuid::new_v4();
        self.set_state(SessionState::Connecting);
        tracing::info!(
            session = %self.id,
            model = %self.setup.model,
            voice = %self.setup.voice,
            "starting live session"
        );

        if let Err(e) = self.connect().await {
            if matches!(e, Error::Cancelled) {
                tracing::info!(session = %self.id, "session start cancelled");
            } else {
                tracing::warn!(session = %self.id, error = %e, "session start failed");
            }
            self.stop();
            return Err(e);
        }

        Ok(())
    }

    #[allow(clippy::future_not_send)]
    async fn connect(&mut self) -> Result<()> {
        self.input = Some(self.devices.open_input(&self.audio)?);
        let output = self.devices.open_output(&self.audio)?;
        self.playback = Some(PlaybackScheduler::new(output));

        let mut stop_rx = self.stop_rx.clone();
        let connection = tokio::select! {
            result = self.connector.connect(&self.setup) => result?,
            _ = stop_rx.wait_for(|stop| *stop) => return Err(Error::Cancelled),
        };
        self.transport = Some(connection.transport);
        self.events = Some(connection.events);
        self.set_state(SessionState::Connected);

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        self.frames = Some(frames_rx);
        if let Some(input) = self.input.as_mut() {
            input.start(frames_tx)?;
        }

        tracing::info!(session = %self.id, "live session connected");
        Ok(())
    }

    /// Pump inbound events and captured frames until the session ends
    ///
    /// Returns after teardown, which happens on a stop request or when the
    /// remote side closes the stream.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the session is `Connected`
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::InvalidState(format!(
                "cannot run a session that is {}",
                self.state
            )));
        }

        let mut stop_rx = self.stop_rx.clone();
        let mut reap = tokio::time::interval(REAP_INTERVAL);
        reap.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let (Some(events), Some(frames)) = (self.events.as_mut(), self.frames.as_mut()) else {
                break;
            };

            let step = tokio::select! {
                biased;
                _ = stop_rx.wait_for(|stop| *stop) => Step::Stop,
                event = events.recv() => Step::Event(event),
                Some(frame) = frames.recv() => Step::Frame(frame),
                _ = reap.tick() => Step::Reap,
            };

            match step {
                Step::Stop => {
                    tracing::info!(session = %self.id, "stop requested");
                    break;
                }
                Step::Event(Some(event)) => {
                    if self.dispatch(event).is_break() {
                        break;
                    }
                }
                Step::Event(None) => {
                    tracing::warn!(session = %self.id, "live event stream ended without close");
                    break;
                }
                Step::Frame(frame) => self.forward_frame(&frame),
                Step::Reap => self.reap(),
            }
        }

        self.stop();
        Ok(())
    }

    /// Apply one inbound event
    ///
    /// Returns `Break` once the session has been torn down by a remote close.
    pub fn dispatch(&mut self, event: ServerEvent) -> ControlFlow<()> {
        if self.state != SessionState::Connected {
            if let ServerEvent::Closed { .. } = event {
                self.stop();
                return ControlFlow::Break(());
            }
            tracing::debug!(session = %self.id, state = %self.state, "ignoring event outside connected session");
            return ControlFlow::Continue(());
        }

        match event {
            ServerEvent::OutputTranscriptDelta(text) => {
                self.transcript.push_output(&text);
                self.emit(SessionUpdate::OutputTranscript(text));
            }
            ServerEvent::InputTranscriptDelta(text) => {
                self.transcript.push_input(&text);
                self.emit(SessionUpdate::InputTranscript(text));
            }
            ServerEvent::TurnComplete => {
                tracing::debug!(session = %self.id, "turn complete");
                self.transcript.clear();
                self.emit(SessionUpdate::TurnComplete);
            }
            ServerEvent::ModelAudioChunk(chunk) => self.play(&chunk),
            ServerEvent::Interrupted => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.interrupt();
                }
                self.emit(SessionUpdate::Interrupted);
            }
            ServerEvent::Error(message) => {
                tracing::error!(session = %self.id, error = %message, "live service error");
                self.emit(SessionUpdate::RemoteError(message));
            }
            ServerEvent::Closed { reason } => {
                tracing::info!(session = %self.id, reason = ?reason, "live stream closed by remote");
                self.stop();
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    /// Send one captured frame; never waits for the network
    pub fn forward_frame(&self, frame: &AudioFrame) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };

        if let Err(e) = transport.send_audio(frame.to_chunk()) {
            tracing::debug!(session = %self.id, error = %e, "dropping captured frame");
        }
    }

    /// Tear the session down and return to `Idle`
    ///
    /// Closes the stream, stops capture, stops and clears playback, closes
    /// the output device and clears the transcript, continuing past any
    /// step that fails. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle && !self.holds_resources() {
            return;
        }

        tracing::info!(session = %self.id, from = %self.state, "tearing down live session");
        self.set_state(SessionState::Closed);

        if let Some(mut transport) = self.transport.take()
            && let Err(e) = transport.close()
        {
            tracing::warn!(session = %self.id, error = %e, "failed to close live stream");
        }
        self.events = None;

        if let Some(mut input) = self.input.take() {
            input.stop();
        }
        self.frames = None;

        if let Some(mut playback) = self.playback.take()
            && let Err(e) = playback.shutdown()
        {
            tracing::warn!(session = %self.id, error = %e, "failed to close audio output");
        }

        self.transcript.clear();
        self.set_state(SessionState::Idle);
    }

    fn play(&mut self, chunk: &EncodedChunk) {
        let Some(playback) = self.playback.as_mut() else {
            return;
        };

        match playback.enqueue(chunk) {
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {
                tracing::warn!(session = %self.id, error = %e, "dropping malformed audio chunk");
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "failed to schedule audio chunk");
            }
        }
    }

    fn reap(&mut self) {
        if let Some(playback) = self.playback.as_mut() {
            playback.reap();
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(session = %self.id, from = %self.state, to = %state, "session state");
        self.state = state;
        self.emit(SessionUpdate::State(state));
    }

    fn emit(&self, update: SessionUpdate) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(update);
        }
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("playback", &self.playback)
            .field("transcript", &self.transcript)
            .finish_non_exhaustive()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}
