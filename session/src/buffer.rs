//! Frame buffering for one capture window.
//!
//! A window is opened with `begin_window`, filled with `capture`/`add_frame`, and
//! sealed by `submit`. A sealed buffer rejects further frames until `clear` reopens
//! it, so a late frame can never leak into the next round's batch.

use std::time::Instant;

use rpsense_logging::Log;

use crate::errors::BufferError;
use crate::{BatchMetadata, Frame, FrameBatch};

/// Timestamps are offset so the first frame of a window is never stamped zero.
const TIMESTAMP_BASE_MS: u64 = 1000;

#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: Vec<Frame>,
    window_started: Option<Instant>,
    sealed: bool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears anything left over and starts a new capture window at `now`.
    pub fn begin_window(&mut self, now: Instant) {
        self.clear();
        self.window_started = Some(now);
    }

    /// Stamps an encoded image and appends it. The timestamp is the time since the
    /// window opened, bumped forward if needed so it always strictly increases.
    pub fn capture(&mut self, image_data: Vec<u8>, now: Instant) -> Result<&Frame, BufferError> {
        let elapsed_ms = self
            .window_started
            .map(|started| now.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or_default();

        let candidate = TIMESTAMP_BASE_MS + elapsed_ms;
        let capture_timestamp = match self.frames.last() {
            Some(previous) => candidate.max(previous.capture_timestamp + 1),
            None => candidate,
        };

        let frame = Frame {
            image_data,
            capture_timestamp,
            sequence_index: self.frames.len() as u32,
        };

        self.add_frame(frame)?;

        self.frames.last().ok_or(BufferError::Empty)
    }

    /// Appends an already-stamped frame.
    pub fn add_frame(&mut self, frame: Frame) -> Result<(), BufferError> {
        if self.sealed {
            tracing::debug!(target: Log::Capture, "Dropping frame for a sealed batch");
            return Err(BufferError::BatchSealed);
        }

        if let Some(previous) = self.frames.last() {
            if frame.capture_timestamp <= previous.capture_timestamp {
                return Err(BufferError::NonMonotonicTimestamp {
                    previous: previous.capture_timestamp,
                    got: frame.capture_timestamp,
                });
            }
        }

        self.frames.push(frame);
        Ok(())
    }

    /// Seals the window and hands its frames out as a batch. Only one batch can be
    /// outstanding; call `clear` before the next window.
    pub fn submit(&mut self, metadata: BatchMetadata) -> Result<FrameBatch, BufferError> {
        if self.sealed {
            return Err(BufferError::SubmissionInFlight);
        }

        if self.frames.is_empty() {
            return Err(BufferError::Empty);
        }

        self.sealed = true;

        let frames = std::mem::take(&mut self.frames);
        tracing::debug!(target: Log::Capture, frames = frames.len(), round = metadata.round_number, "Sealed capture window");

        Ok(FrameBatch { frames, metadata })
    }

    /// Empties the buffer and reopens it. Safe to call at any time, any number of times.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.window_started = None;
        self.sealed = false;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
