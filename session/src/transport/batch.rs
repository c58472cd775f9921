use std::thread;

use rpsense_config::InferenceConfig;
use rpsense_inference_api::{APIClient, ProcessFramesRequest};
use rpsense_logging::Log;

use super::{Completion, RoundContext, Transport, normalize_response};
use crate::errors::TransportError;
use crate::{Frame, FrameBatch};

/// Sends each round's frames in one HTTP request once the capture window closes.
///
/// The request runs on a background thread so that the session thread keeps
/// ticking (and can time the request out). Only one request thread is alive at a
/// time.
#[derive(Debug)]
pub struct BatchTransport {
    client: APIClient,
    round: Option<Completion>,
    request_thread: Option<thread::JoinHandle<()>>,
}

impl BatchTransport {
    pub fn new(client: APIClient) -> Self {
        Self {
            client,
            round: None,
            request_thread: None,
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(APIClient::new(&config.base_url, config.request_timeout()))
    }

    fn request_in_flight(&self) -> bool {
        self.request_thread.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Transport for BatchTransport {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn health_check(&mut self) -> Result<(), TransportError> {
        self.client.health_check()?;
        Ok(())
    }

    fn begin_round(&mut self, context: &RoundContext, completion: Completion) -> Result<(), TransportError> {
        tracing::debug!(target: Log::Transport, round = context.round_number, "Batch round started");

        self.round = Some(completion);
        Ok(())
    }

    /// Frames travel with the batch.
    fn on_frame(&mut self, _frame: &Frame) -> Result<(), TransportError> {
        Ok(())
    }

    fn submit(&mut self, batch: FrameBatch) -> Result<(), TransportError> {
        if self.request_in_flight() {
            return Err(TransportError::SubmissionInFlight);
        }

        let completion = self.round.take().ok_or(TransportError::NoActiveRound)?;

        let request = ProcessFramesRequest {
            frames: batch.frames.iter().map(Frame::payload).collect(),
            context: batch.metadata.payload(),
        };

        let client = self.client.clone();

        let request_thread = thread::Builder::new()
            .name("RPSenseBatchRequestThread".into())
            .spawn(move || {
                let result = client
                    .process_frames(&request)
                    .map_err(TransportError::from)
                    .and_then(normalize_response);

                if let Err(error) = &result {
                    tracing::error!(target: Log::Transport, ?error, "Batch submission failed");
                }

                completion.verdict(result);
            })
            .map_err(TransportError::ThreadSpawn)?;

        self.request_thread = Some(request_thread);

        Ok(())
    }

    fn abandon(&mut self) {
        // A request that is already running finishes on its own; its completion is
        // tagged with the abandoned round and will be ignored.
        self.round = None;
    }

    fn shutdown(&mut self) {
        self.round = None;

        if let Some(handle) = self.request_thread.take() {
            if !handle.is_finished() {
                tracing::debug!(target: Log::Transport, "Leaving in-flight request to time out on its own");
                return;
            }

            if let Err(error) = handle.join() {
                tracing::error!(target: Log::Transport, ?error, "Batch request thread panicked");
            }
        }
    }
}

impl Drop for BatchTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
