//! Turns whatever the service sent into a `RoundVerdict`.
//!
//! Responses come flat (`playerMove`, `computerMove`, ...) or nested under
//! `game_result`; nested values win when both are present. A response with no
//! usable gesture is still a verdict, just one the computer wins.

use rpsense_inference_api::{InferenceResponse, LivePredictionPayload};

use crate::errors::TransportError;
use crate::{LiveVerdict, Move, RoundVerdict, Winner};

const STATUS_ERROR: &str = "error";
const STATUS_NO_DETECTION: &str = "no_detection";

fn clamp_confidence(confidence: Option<f32>) -> f32 {
    match confidence {
        Some(value) if !value.is_nan() => value.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

pub fn normalize_response(response: InferenceResponse) -> Result<RoundVerdict, TransportError> {
    let status = response.status.as_deref().unwrap_or_default();

    if let Some(error) = response.error {
        return Err(TransportError::Service(error));
    }

    if status == STATUS_ERROR {
        return Err(TransportError::Service("status: error".to_string()));
    }

    let game = response.game_result.unwrap_or_default();
    let confidence = clamp_confidence(response.confidence);

    let player_move = game
        .player_move
        .or(response.player_move)
        .or(response.final_prediction)
        .map(|label| Move::from_label(&label))
        .unwrap_or(Move::Unknown);

    let computer_move = game
        .computer_move
        .or(response.computer_move)
        .map(|label| Move::from_label(&label));

    let undetected = response.detected_hand == Some(false)
        || status == STATUS_NO_DETECTION
        || game.valid_move == Some(false)
        || !player_move.is_known();

    if undetected {
        return Ok(RoundVerdict {
            player_move: Move::Unknown,
            computer_move: computer_move.filter(|mv| mv.is_known()).unwrap_or(Move::Rock),
            winner: Winner::Computer,
            confidence,
            is_fallback: false,
        });
    }

    let computer_move = match computer_move {
        Some(mv) if mv.is_known() => mv,
        _ => return Err(TransportError::MalformedResponse("missing computer move".to_string())),
    };

    let winner = game
        .winner
        .or(response.winner)
        .and_then(|label| Winner::from_label(&label))
        .unwrap_or_else(|| player_move.play_against(computer_move));

    Ok(RoundVerdict {
        player_move,
        computer_move,
        winner,
        confidence,
        is_fallback: false,
    })
}

/// Returns `None` for payloads that carry no prediction at all.
pub fn normalize_live(payload: &LivePredictionPayload) -> Option<LiveVerdict> {
    let status = payload.status.as_deref().unwrap_or_default();

    if status == STATUS_ERROR {
        return None;
    }

    let prediction = Move::from_label(payload.prediction.as_deref()?);

    Some(LiveVerdict {
        prediction,
        confidence: clamp_confidence(payload.confidence),
        detected_hand: prediction.is_known() && status != STATUS_NO_DETECTION,
    })
}
