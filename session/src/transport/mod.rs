//! Moving frames to the inference service and verdicts back.
//!
//! The orchestrator only knows the [`Transport`] trait. Results come back
//! asynchronously through a [`Completion`], which tags every delivery with the round
//! it belongs to; the orchestrator uses that tag to drop anything stale.

use std::sync::mpsc::Sender;

use rpsense_inference_api::{FramePayload, RoundContextPayload};
use rpsense_logging::Log;

use crate::controller::SessionInput;
use crate::errors::TransportError;
use crate::{BatchMetadata, Frame, FrameBatch, GameMode, LiveVerdict, RoundVerdict};

mod batch;
pub use batch::BatchTransport;

mod normalize;
pub use normalize::{normalize_live, normalize_response};

mod stream;
pub use stream::StreamTransport;

/// Identifies one round for the duration of its capture-to-verdict cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundContext {
    pub round_id: u64,
    pub mode: GameMode,
    pub total_rounds: u32,
    pub round_number: u32,
    pub player_id: String,
}

impl RoundContext {
    pub(crate) fn payload(&self) -> RoundContextPayload {
        RoundContextPayload {
            mode: self.mode.as_str().to_string(),
            total_rounds: self.total_rounds,
            round_number: self.round_number,
            player_id: self.player_id.clone(),
        }
    }
}

impl BatchMetadata {
    pub(crate) fn payload(&self) -> RoundContextPayload {
        RoundContextPayload {
            mode: self.mode.as_str().to_string(),
            total_rounds: self.total_rounds,
            round_number: self.round_number,
            player_id: self.player_id.clone(),
        }
    }
}

impl Frame {
    pub(crate) fn payload(&self) -> FramePayload {
        FramePayload::from_encoded(&self.image_data, self.capture_timestamp, self.sequence_index)
    }
}

/// Something a transport reports back.
#[derive(Debug)]
pub enum TransportEvent {
    /// The authoritative result for the round, or why there isn't one.
    Verdict(Result<RoundVerdict, TransportError>),

    /// An interim prediction while frames are still flowing.
    Live(LiveVerdict),
}

/// A transport event along with the round it belongs to.
#[derive(Debug)]
pub struct TransportMessage {
    pub round_id: u64,
    pub event: TransportEvent,
}

/// A cloneable handle a transport uses to report back for one round.
#[derive(Clone, Debug)]
pub struct Completion {
    round_id: u64,
    inbox: Sender<SessionInput>,
}

impl Completion {
    pub fn new(round_id: u64, inbox: Sender<SessionInput>) -> Self {
        Self { round_id, inbox }
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn verdict(&self, result: Result<RoundVerdict, TransportError>) {
        self.deliver(TransportEvent::Verdict(result));
    }

    pub fn live(&self, verdict: LiveVerdict) {
        self.deliver(TransportEvent::Live(verdict));
    }

    fn deliver(&self, event: TransportEvent) {
        let message = TransportMessage {
            round_id: self.round_id,
            event,
        };

        if self.inbox.send(SessionInput::Transport(message)).is_err() {
            tracing::debug!(target: Log::Transport, round_id = self.round_id, "Session is gone, dropping transport event");
        }
    }
}

/// A way of getting a round's frames judged.
///
/// Calls happen in this order for each round: `begin_round`, any number of
/// `on_frame`, then `submit` once. `abandon` may come at any point and means the
/// round's result is no longer wanted.
pub trait Transport: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Checks that the inference service is reachable and ready.
    fn health_check(&mut self) -> Result<(), TransportError>;

    /// Announces a round. Results for it must be delivered through `completion`.
    fn begin_round(&mut self, context: &RoundContext, completion: Completion) -> Result<(), TransportError>;

    /// Called for every captured frame, in order.
    fn on_frame(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Called once the capture window closes, with everything it captured.
    fn submit(&mut self, batch: FrameBatch) -> Result<(), TransportError>;

    /// Stops caring about the current round. Anything still in flight is ignored.
    fn abandon(&mut self);

    /// Releases connections and threads. No further rounds follow.
    fn shutdown(&mut self);
}
