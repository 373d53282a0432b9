//! Gapless playback of received audio chunks
//!
//! Chunks arrive in bursts. Each one is placed at a cursor that only moves
//! forward: `start = max(cursor, now)`, then `cursor = start + duration`.
//! Back-to-back chunks therefore abut exactly, and a chunk that arrives after
//! the queue drained starts immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::envelope::EncodedChunk;
use crate::audio::{AudioOutput, UnitId};
use crate::{Error, Result};

/// A decoded buffer scheduled on the output clock
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    pub id: UnitId,
    pub start: Duration,
    pub duration: Duration,
    samples: Arc<[f32]>,
}

impl PlaybackUnit {
    /// Output clock time at which the unit finishes
    #[must_use]
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Owns the output device and the registry of scheduled units
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    cursor: Duration,
    units: HashMap<UnitId, PlaybackUnit>,
    next_id: u64,
}

impl PlaybackScheduler {
    /// Take ownership of an open output; the cursor starts at its clock
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let cursor = output.current_time();
        Self {
            output,
            cursor,
            units: HashMap::new(),
            next_id: 0,
        }
    }

    /// Decode a chunk and schedule it after everything already queued
    ///
    /// Returns `None` for a chunk that carries no audio.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` if the chunk cannot be decoded, or an
    /// audio error if the output refuses the unit. Neither affects units
    /// already scheduled.
    pub fn enqueue(&mut self, chunk: &EncodedChunk) -> Result<Option<PlaybackUnit>> {
        self.reap();

        let samples = chunk.decode_samples()?;
        if samples.is_empty() {
            return Ok(None);
        }

        let sample_rate = self.output.sample_rate();
        let chunk_rate = chunk.media_type().sample_rate();
        if chunk_rate != sample_rate {
            tracing::debug!(chunk_rate, sample_rate, "chunk rate differs from output rate");
        }

        #[allow(clippy::cast_precision_loss)]
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));

        self.cursor = self.cursor.max(self.output.current_time());
        let unit = PlaybackUnit {
            id: UnitId(self.next_id),
            start: self.cursor,
            duration,
            samples: samples.into(),
        };

        self.output
            .schedule(unit.id, Arc::clone(&unit.samples), unit.start)?;
        self.next_id += 1;
        self.cursor += duration;
        self.units.insert(unit.id, unit.clone());

        tracing::trace!(
            unit = %unit.id,
            start_ms = unit.start.as_millis(),
            duration_ms = unit.duration.as_millis(),
            queued = self.units.len(),
            "scheduled playback unit"
        );

        Ok(Some(unit))
    }

    /// Stop every scheduled unit and restart the cursor at the output clock
    ///
    /// Returns the number of units stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped: Vec<UnitId> = self.units.drain().map(|(id, _)| id).collect();
        for &id in &stopped {
            self.output.stop_unit(id);
        }
        self.cursor = self.output.current_time();

        if !stopped.is_empty() {
            tracing::debug!(units = stopped.len(), "playback interrupted");
        }
        stopped.len()
    }

    /// Release units the output reports as finished
    pub fn reap(&mut self) {
        for id in self.output.take_ended() {
            self.units.remove(&id);
        }
    }

    /// Stop everything and close the output device
    ///
    /// # Errors
    ///
    /// Returns error if the output fails to close; units are cleared regardless
    pub fn shutdown(&mut self) -> Result<()> {
        self.interrupt();
        if self.output.is_closed() {
            return Ok(());
        }
        self.output
            .close()
            .map_err(|e| Error::Audio(format!("closing output: {e}")))
    }

    /// Next free start time
    #[must_use]
    pub const fn cursor(&self) -> Duration {
        self.cursor
    }

    /// Current output clock time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.output.current_time()
    }

    /// Number of units scheduled and not yet ended
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Whether the output device has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.output.is_closed()
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("cursor", &self.cursor)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}
