//! Shared test doubles
//!
//! In-memory devices and a scripted live service, so session behavior can be
//! exercised without audio hardware or network access.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ipguard_voice::audio::{AudioFrame, AudioInput, AudioOutput, DeviceProvider, UnitId};
use ipguard_voice::config::AudioConfig;
use ipguard_voice::live::{
    EncodedChunk, LiveConnection, LiveConnector, LiveTransport, ServerEvent, SessionSetup,
};
use ipguard_voice::{Error, Result};

/// Output sample rate of the fake speaker
pub const OUTPUT_RATE: u32 = 24000;

/// How the fake microphone responds to being opened
#[derive(Debug, Clone, Copy, Default)]
pub enum InputBehavior {
    #[default]
    Available,
    PermissionDenied,
    Missing,
}

/// Everything the fake devices observed
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub inputs_opened: usize,
    pub inputs_stopped: usize,
    pub outputs_opened: usize,
    pub outputs_closed: usize,
    pub capturing: bool,
    pub now: Duration,
    pub scheduled: Vec<(UnitId, Duration, usize)>,
    pub stopped_units: Vec<UnitId>,
    pub frames: Option<mpsc::UnboundedSender<AudioFrame>>,
}

impl DeviceLog {
    /// Device handles opened and not yet released
    pub fn open_handles(&self) -> usize {
        (self.inputs_opened - self.inputs_stopped) + (self.outputs_opened - self.outputs_closed)
    }

    /// Start times of every scheduled unit, in scheduling order
    pub fn starts(&self) -> Vec<Duration> {
        self.scheduled.iter().map(|(_, start, _)| *start).collect()
    }
}

/// Device provider backed by a shared [`DeviceLog`]
#[derive(Clone, Default)]
pub struct FakeDevices {
    log: Arc<Mutex<DeviceLog>>,
    input: InputBehavior,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: InputBehavior) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap()
    }

    /// Move the output clock forward
    pub fn advance(&self, by: Duration) {
        self.log().now += by;
    }

    /// Deliver a frame as if the microphone produced it
    ///
    /// Returns false when nothing is capturing.
    pub fn capture(&self, frame: AudioFrame) -> bool {
        self.log()
            .frames
            .as_ref()
            .is_some_and(|frames| frames.send(frame).is_ok())
    }
}

impl DeviceProvider for FakeDevices {
    fn open_input(&self, _config: &AudioConfig) -> Result<Box<dyn AudioInput>> {
        match self.input {
            InputBehavior::PermissionDenied => Err(Error::PermissionDenied(
                "microphone access denied".to_string(),
            )),
            InputBehavior::Missing => {
                Err(Error::DeviceUnavailable("no input device".to_string()))
            }
            InputBehavior::Available => {
                self.log().inputs_opened += 1;
                Ok(Box::new(FakeInput {
                    log: Arc::clone(&self.log),
                    released: false,
                }))
            }
        }
    }

    fn open_output(&self, _config: &AudioConfig) -> Result<Box<dyn AudioOutput>> {
        self.log().outputs_opened += 1;
        Ok(Box::new(FakeOutput {
            log: Arc::clone(&self.log),
            active: Vec::new(),
            closed: false,
        }))
    }
}

pub struct FakeInput {
    log: Arc<Mutex<DeviceLog>>,
    released: bool,
}

impl AudioInput for FakeInput {
    fn start(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.capturing = true;
        log.frames = Some(frames);
        Ok(())
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut log = self.log.lock().unwrap();
        log.inputs_stopped += 1;
        log.capturing = false;
        log.frames = None;
    }

    fn is_capturing(&self) -> bool {
        !self.released && self.log.lock().unwrap().capturing
    }
}

impl Drop for FakeInput {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct FakeOutput {
    log: Arc<Mutex<DeviceLog>>,
    active: Vec<(UnitId, Duration)>,
    closed: bool,
}

impl AudioOutput for FakeOutput {
    fn sample_rate(&self) -> u32 {
        OUTPUT_RATE
    }

    fn current_time(&self) -> Duration {
        self.log.lock().unwrap().now
    }

    fn schedule(&mut self, id: UnitId, samples: Arc<[f32]>, start: Duration) -> Result<()> {
        if self.closed {
            return Err(Error::Audio("output closed".to_string()));
        }
        let len = samples.len();
        let end = start + Duration::from_secs_f64(len as f64 / f64::from(OUTPUT_RATE));
        self.active.push((id, end));
        self.log.lock().unwrap().scheduled.push((id, start, len));
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        self.active.retain(|(active, _)| *active != id);
        self.log.lock().unwrap().stopped_units.push(id);
    }

    fn take_ended(&mut self) -> Vec<UnitId> {
        let now = self.current_time();
        let (ended, active): (Vec<_>, Vec<_>) =
            self.active.drain(..).partition(|(_, end)| *end <= now);
        self.active = active;
        ended.into_iter().map(|(id, _)| id).collect()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.active.clear();
            self.log.lock().unwrap().outputs_closed += 1;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for FakeOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// How the fake service answers a connection attempt
#[derive(Debug, Clone, Copy)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    Hang,
}

/// Everything the fake service observed
#[derive(Debug, Default)]
pub struct ConnectionLog {
    pub connects: usize,
    pub closes: usize,
    pub sent: Vec<EncodedChunk>,
    pub server: Option<mpsc::UnboundedSender<ServerEvent>>,
}

/// Connector backed by a shared [`ConnectionLog`]
#[derive(Clone)]
pub struct FakeConnector {
    log: Arc<Mutex<ConnectionLog>>,
    behavior: ConnectBehavior,
}

impl FakeConnector {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            log: Arc::default(),
            behavior,
        }
    }

    pub fn log(&self) -> MutexGuard<'_, ConnectionLog> {
        self.log.lock().unwrap()
    }

    /// Sender that pushes events to the most recent connection
    pub fn server(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.log().server.clone().expect("no connection opened")
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(&self, _setup: &SessionSetup) -> Result<LiveConnection> {
        self.log().connects += 1;

        match self.behavior {
            ConnectBehavior::Fail => Err(Error::Connection("connection refused".to_string())),
            ConnectBehavior::Hang => std::future::pending::<Result<LiveConnection>>().await,
            ConnectBehavior::Succeed => {
                let (server, events) = mpsc::unbounded_channel();
                self.log().server = Some(server);
                Ok(LiveConnection {
                    transport: Box::new(FakeTransport {
                        log: Arc::clone(&self.log),
                        open: true,
                    }),
                    events,
                })
            }
        }
    }
}

pub struct FakeTransport {
    log: Arc<Mutex<ConnectionLog>>,
    open: bool,
}

impl LiveTransport for FakeTransport {
    fn send_audio(&self, chunk: EncodedChunk) -> Result<()> {
        if !self.open {
            return Err(Error::Connection("stream closed".to_string()));
        }
        self.log.lock().unwrap().sent.push(chunk);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.log.lock().unwrap().closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// A chunk of `duration` worth of constant audio at the output rate
pub fn model_audio(duration: Duration) -> EncodedChunk {
    let samples = (duration.as_secs_f64() * f64::from(OUTPUT_RATE)).round() as usize;
    EncodedChunk::from_pcm(&vec![2000; samples], OUTPUT_RATE)
}
