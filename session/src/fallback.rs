use std::fmt;

use rpsense_logging::Log;

use crate::errors::{DeviceError, TransportError};
use crate::{Move, RoundVerdict, Winner};

/// Gesture assigned to the computer when no real verdict could be obtained.
pub const FALLBACK_COMPUTER_MOVE: Move = Move::Rock;

/// Why a round had to be settled without a verdict from the service.
#[derive(Debug)]
pub enum FallbackReason {
    Timeout,
    Transport(TransportError),
    NoFrames,
    Device(DeviceError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("no verdict before the deadline"),
            Self::Transport(error) => write!(f, "transport failure: {error}"),
            Self::NoFrames => f.write_str("the capture window produced no frames"),
            Self::Device(error) => write!(f, "capture device failure: {error}"),
        }
    }
}

/// Produces the verdict used when a round can't be decided normally. The round
/// always goes to the computer, so a broken pipeline never hands out free wins.
pub fn fallback_verdict(round: u32, reason: &FallbackReason) -> RoundVerdict {
    tracing::warn!(target: Log::Session, round, %reason, "Settling round with fallback verdict");

    RoundVerdict {
        player_move: Move::Unknown,
        computer_move: FALLBACK_COMPUTER_MOVE,
        winner: Winner::Computer,
        confidence: 0.0,
        is_fallback: true,
    }
}
