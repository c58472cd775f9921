//! Request and response payloads as they travel over the wire.
//!
//! Responses are intentionally loose: the service has shipped both a flat camelCase
//! shape and a snake_case shape with a nested `game_result` object, and any field
//! may be missing. Interpreting them is the caller's job.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Prefix the service expects in front of every base64 frame.
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// One captured frame.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    pub image: String,
    pub timestamp: u64,
    pub sequence_index: u32,
}

impl FramePayload {
    /// Wraps already-encoded image bytes into a JPEG data URL.
    pub fn from_encoded(image: &[u8], timestamp: u64, sequence_index: u32) -> Self {
        let mut data_url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + image.len() * 4 / 3 + 4);
        data_url.push_str(JPEG_DATA_URL_PREFIX);
        STANDARD.encode_string(image, &mut data_url);

        Self {
            image: data_url,
            timestamp,
            sequence_index,
        }
    }
}

/// Round metadata sent with every submission (and with `start_game` on the channel).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundContextPayload {
    pub mode: String,
    pub total_rounds: u32,
    pub round_number: u32,
    pub player_id: String,
}

/// Body of `POST /process-frames`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProcessFramesRequest {
    pub frames: Vec<FramePayload>,
    pub context: RoundContextPayload,
}

/// The nested result object some service versions return.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct GameResultPayload {
    #[serde(alias = "playerMove")]
    pub player_move: Option<String>,

    #[serde(alias = "computerMove")]
    pub computer_move: Option<String>,

    pub winner: Option<String>,

    #[serde(alias = "validMove")]
    pub valid_move: Option<bool>,

    pub reason: Option<String>,
}

/// A final verdict response, in whichever shape the server chose.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct InferenceResponse {
    pub status: Option<String>,

    #[serde(alias = "finalPrediction")]
    pub final_prediction: Option<String>,

    #[serde(alias = "playerMove")]
    pub player_move: Option<String>,

    #[serde(alias = "computerMove")]
    pub computer_move: Option<String>,

    pub winner: Option<String>,

    pub confidence: Option<f32>,

    #[serde(alias = "detectedHand")]
    pub detected_hand: Option<bool>,

    #[serde(alias = "gameResult")]
    pub game_result: Option<GameResultPayload>,

    pub error: Option<String>,
}

/// Interim, per-frame prediction pushed over the streaming channel.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct LivePredictionPayload {
    pub status: Option<String>,
    pub prediction: Option<String>,
    pub confidence: Option<f32>,
    pub message: Option<String>,
}

/// Response of the health endpoint.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct HealthStatus {
    pub status: Option<String>,
    pub message: Option<String>,
    pub version: Option<String>,
}

impl HealthStatus {
    /// Older servers return an empty object, so a missing status counts as healthy.
    pub fn is_ok(&self) -> bool {
        self.status.as_deref().is_none_or(|status| status == "success" || status == "ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_payload_is_a_jpeg_data_url() {
        let payload = FramePayload::from_encoded(&[0xFF, 0xD8, 0xFF], 1100, 0);

        assert_eq!(payload.image, "data:image/jpeg;base64,/9j/");
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "image": "data:image/jpeg;base64,/9j/", "timestamp": 1100, "sequenceIndex": 0 })
        );
    }

    #[test]
    fn nested_response_shape() {
        let response: InferenceResponse = serde_json::from_value(json!({
            "status": "final_result",
            "final_prediction": "rock",
            "confidence": 0.91,
            "detected_hand": true,
            "game_result": {
                "player_move": "rock",
                "computer_move": "scissors",
                "winner": "player",
                "valid_move": true
            }
        }))
        .unwrap();

        let game_result = response.game_result.unwrap();
        assert_eq!(game_result.computer_move.as_deref(), Some("scissors"));
        assert_eq!(game_result.winner.as_deref(), Some("player"));
        assert_eq!(response.detected_hand, Some(true));
    }

    #[test]
    fn flat_camel_case_response_shape() {
        let response: InferenceResponse = serde_json::from_value(json!({
            "playerMove": "paper",
            "computerMove": "rock",
            "winner": "player",
            "confidence": 0.8,
            "detectedHand": true
        }))
        .unwrap();

        assert_eq!(response.player_move.as_deref(), Some("paper"));
        assert_eq!(response.computer_move.as_deref(), Some("rock"));
        assert!(response.game_result.is_none());
    }

    #[test]
    fn health_status_tolerates_empty_body() {
        let status: HealthStatus = serde_json::from_str("{}").unwrap();
        assert!(status.is_ok());

        let status: HealthStatus = serde_json::from_value(json!({ "status": "error" })).unwrap();
        assert!(!status.is_ok());
    }
}
