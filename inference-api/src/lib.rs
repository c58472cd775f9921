use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use ureq::{Agent, AgentBuilder};

use rpsense_logging::Log;

mod error;
pub use error::ApiError;

pub mod channel;
pub use channel::{ChannelConnection, ChannelReader, ClientMessage, ServerMessage};

pub mod wire;
pub use wire::{
    FramePayload, GameResultPayload, HealthStatus, InferenceResponse, LivePredictionPayload, ProcessFramesRequest,
    RoundContextPayload,
};

/// Header the tunnel in front of the development server wants on every request.
const TUNNEL_HEADER: (&str, &str) = ("ngrok-skip-browser-warning", "true");

/// A wrapper type that simply dereferences to a `ureq::Agent`, carrying the
/// inference service base URL alongside it.
///
/// Anything that can be called on a `ureq::Agent` can be called on
/// this type. You can also clone this with little cost, and pass it freely
/// to other threads, as it manages itself under the hood with `Arc`.
#[derive(Clone, Debug)]
pub struct APIClient {
    agent: Agent,
    base_url: Arc<str>,
}

impl APIClient {
    /// Creates and initializes a new APIClient.
    ///
    /// `timeout` bounds every request end to end. Frame batches are a few hundred
    /// kilobytes, so keep this comfortably above the inference time of the model.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        // Keep a small idle pool around: a session submits once per round and the
        // connection is almost always reusable.
        let agent = AgentBuilder::new()
            .max_idle_connections(5)
            .timeout(timeout)
            .user_agent(&format!("RPSense/{} (Rust)", env!("CARGO_PKG_VERSION")))
            .build();

        Self {
            agent,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls the root endpoint and checks that the server reports itself as running.
    pub fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let url = format!("{}/", self.base_url);

        let status: HealthStatus = self
            .get(&url)
            .set(TUNNEL_HEADER.0, TUNNEL_HEADER.1)
            .call()
            .map_err(ApiError::from_ureq)?
            .into_json()?;

        if !status.is_ok() {
            let message = status.message.clone().unwrap_or_else(|| "server not ready".to_string());
            return Err(ApiError::Remote(message));
        }

        tracing::debug!(target: Log::Transport, version = ?status.version, "Inference service is healthy");

        Ok(status)
    }

    /// Sends a whole capture window and waits for the aggregated verdict.
    pub fn process_frames(&self, request: &ProcessFramesRequest) -> Result<InferenceResponse, ApiError> {
        let url = format!("{}/process-frames", self.base_url);

        tracing::info!(
            target: Log::Transport,
            frames = request.frames.len(),
            round = request.context.round_number,
            "Submitting frame batch"
        );

        let response_body = self
            .post(&url)
            .set(TUNNEL_HEADER.0, TUNNEL_HEADER.1)
            .send_json(request)
            .map_err(ApiError::from_ureq)?
            .into_string()?;

        serde_json::from_str(&response_body).map_err(|error| {
            tracing::error!(target: Log::Transport, ?error, "Failed to deserialize inference response");
            ApiError::InvalidResponseJSON(error)
        })
    }
}

impl Deref for APIClient {
    type Target = Agent;

    fn deref(&self) -> &Self::Target {
        &self.agent
    }
}
