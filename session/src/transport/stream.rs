use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rpsense_config::InferenceConfig;
use rpsense_inference_api::channel::CaptureCompletePayload;
use rpsense_inference_api::{ApiError, ChannelConnection, ChannelReader, ClientMessage, ServerMessage};
use rpsense_logging::Log;

use super::{Completion, RoundContext, Transport, normalize_live, normalize_response};
use crate::errors::TransportError;
use crate::{Frame, FrameBatch};

/// The completion for the round currently streaming, shared with the reader thread.
#[derive(Clone, Debug, Default)]
struct ActiveRound(Arc<Mutex<Option<Completion>>>);

impl ActiveRound {
    fn set(&self, completion: Option<Completion>) {
        let mut lock = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *lock = completion;
    }

    fn take(&self) -> Option<Completion> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn with<F>(&self, handler: F)
    where
        F: FnOnce(&Completion),
    {
        let lock = self.0.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(completion) = lock.as_ref() {
            handler(completion);
        }
    }
}

/// Streams frames over a persistent channel as they are captured, receiving live
/// predictions along the way and a final verdict after `capture_complete`.
///
/// The connection is opened lazily and reopened at the start of a round if it was
/// lost or the previous round was abandoned. A background thread reads everything
/// the server sends.
#[derive(Debug)]
pub struct StreamTransport {
    addr: String,
    connect_timeout: Duration,
    connection: Option<ChannelConnection>,
    reader_thread: Option<thread::JoinHandle<()>>,
    active: ActiveRound,
}

impl StreamTransport {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            connection: None,
            reader_thread: None,
            active: ActiveRound::default(),
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(config.stream_addr.clone(), config.connect_timeout())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.reader_thread.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Makes sure there is a live connection with a reader attached.
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        self.disconnect();

        let connection = ChannelConnection::connect(&self.addr, self.connect_timeout)?;
        let reader = connection.reader()?;
        let active = self.active.clone();

        let reader_thread = thread::Builder::new()
            .name("RPSenseStreamReaderThread".into())
            .spawn(move || read_loop(reader, active))
            .map_err(TransportError::ThreadSpawn)?;

        self.connection = Some(connection);
        self.reader_thread = Some(reader_thread);

        Ok(())
    }

    /// Closes the connection and waits for the reader to notice.
    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }

        if let Some(reader_thread) = self.reader_thread.take() {
            if let Err(error) = reader_thread.join() {
                tracing::error!(target: Log::Transport, ?error, "Stream reader thread panicked");
            }
        }
    }

    /// Sends a message, dropping the connection if the write fails.
    fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::ConnectionLost);
        };

        if let Err(error) = connection.send(message) {
            tracing::warn!(target: Log::Transport, ?error, "Channel write failed");
            self.active.set(None);
            self.disconnect();
            return Err(TransportError::ConnectionLost);
        }

        Ok(())
    }
}

impl Transport for StreamTransport {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn health_check(&mut self) -> Result<(), TransportError> {
        self.connect()
    }

    fn begin_round(&mut self, context: &RoundContext, completion: Completion) -> Result<(), TransportError> {
        self.connect()?;
        self.active.set(Some(completion));

        self.send(&ClientMessage::StartGame(context.payload()))
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.send(&ClientMessage::Frame(frame.payload()))
    }

    /// Frames have already been streamed, so only the end of the window is signalled.
    fn submit(&mut self, batch: FrameBatch) -> Result<(), TransportError> {
        let timestamp = batch.frames.last().map(|frame| frame.capture_timestamp).unwrap_or_default();

        self.send(&ClientMessage::CaptureComplete(CaptureCompletePayload {
            total_frames: batch.frames.len() as u32,
            timestamp,
        }))
    }

    /// Stops a round that is still waiting on the server. Results carry no round id,
    /// so the connection is dropped as well: anything the server still sends for this
    /// round dies with it, and the next round starts on a fresh connection.
    fn abandon(&mut self) {
        if self.active.take().is_none() {
            return;
        }

        if self.connection.is_some() {
            // Best effort; the connection is closed right after.
            let _ = self.send(&ClientMessage::StopGame);
        }

        self.disconnect();
    }

    fn shutdown(&mut self) {
        self.abandon();
        self.disconnect();
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forwards server messages to whichever round is active until the channel closes.
fn read_loop(mut reader: ChannelReader, active: ActiveRound) {
    loop {
        match reader.next_message() {
            Ok(ServerMessage::Connected) | Ok(ServerMessage::GameStarted) => {
                tracing::debug!(target: Log::Transport, "Channel handshake message");
            },

            Ok(ServerMessage::RealTimeResult(payload)) => {
                if let Some(live) = normalize_live(&payload) {
                    active.with(|completion| completion.live(live));
                }
            },

            Ok(ServerMessage::FinalResult(response)) => match active.take() {
                Some(completion) => completion.verdict(normalize_response(response)),
                None => tracing::debug!(target: Log::Transport, "Final result with no active round"),
            },

            Ok(ServerMessage::Error(payload)) => {
                let message = payload.describe();
                tracing::error!(target: Log::Transport, %message, "Inference server reported an error");

                if let Some(completion) = active.take() {
                    completion.verdict(Err(TransportError::Service(message)));
                }
            },

            Err(ApiError::InvalidResponseJSON(error)) => {
                tracing::warn!(target: Log::Transport, ?error, "Skipping undecodable channel message");
            },

            Err(error) => {
                tracing::info!(target: Log::Transport, ?error, "Channel closed");

                if let Some(completion) = active.take() {
                    completion.verdict(Err(TransportError::ConnectionLost));
                }

                return;
            },
        }
    }
}
