//! The streaming channel: a long-lived TCP connection carrying one JSON object per
//! line in each direction.
//!
//! Every message is `{"event": <name>, "data": <payload>}`. The client announces a
//! round with `start_game`, streams `frame`s as they are captured, and signals the end
//! of the window with `capture_complete`. The server answers with `real_time_result`
//! per frame and exactly one `final_result` (or an `error`).

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde_json::Value;

use rpsense_logging::Log;

use crate::ApiError;
use crate::wire::{FramePayload, InferenceResponse, LivePredictionPayload, RoundContextPayload};

/// Sent after the last frame of a capture window.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCompletePayload {
    pub total_frames: u32,
    pub timestamp: u64,
}

/// Messages the client sends.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    StartGame(RoundContextPayload),
    Frame(FramePayload),
    CaptureComplete(CaptureCompletePayload),
    StopGame,
}

/// Error payload pushed by the server.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct ServerErrorPayload {
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ServerErrorPayload {
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unspecified server error".to_string())
    }
}

/// Messages the server sends.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    Connected,
    GameStarted,
    RealTimeResult(LivePredictionPayload),
    FinalResult(InferenceResponse),
    Error(ServerErrorPayload),
}

impl ServerMessage {
    /// Decodes one line. Events this client doesn't know about yield `None` so that the
    /// server can add new ones without breaking older clients.
    pub fn decode(line: &str) -> Result<Option<Self>, ApiError> {
        let mut value: Value = serde_json::from_str(line).map_err(ApiError::InvalidResponseJSON)?;

        let event = value
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let data = value.get_mut("data").map(Value::take).unwrap_or(Value::Null);

        let message = match event.as_str() {
            "connected" => Self::Connected,
            "game_started" => Self::GameStarted,
            "real_time_result" => Self::RealTimeResult(payload(data)?),
            "final_result" => Self::FinalResult(payload(data)?),
            "error" => Self::Error(payload(data)?),

            other => {
                tracing::debug!(target: Log::Transport, event = other, "Ignoring unknown channel event");
                return Ok(None);
            },
        };

        Ok(Some(message))
    }
}

/// A null `data` is treated as an empty object so that every field falls back to `None`.
fn payload<T>(data: Value) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(data).map_err(ApiError::InvalidResponseJSON)
}

/// The write half of a channel. Reading happens through a [`ChannelReader`] obtained
/// from [`ChannelConnection::reader`], usually on a dedicated thread.
#[derive(Debug)]
pub struct ChannelConnection {
    addr: String,
    stream: TcpStream,
}

impl ChannelConnection {
    /// Opens a connection to `addr`, giving up after `timeout`.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, ApiError> {
        let connect_error = |source| ApiError::Connect {
            addr: addr.to_string(),
            source,
        };

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| {
                connect_error(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout).map_err(connect_error)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;

        tracing::info!(target: Log::Transport, addr, "Channel connected");

        Ok(Self {
            addr: addr.to_string(),
            stream,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Writes one message followed by a newline.
    pub fn send(&mut self, message: &ClientMessage) -> Result<(), ApiError> {
        let mut line = serde_json::to_vec(message).map_err(ApiError::Encode)?;
        line.push(b'\n');

        self.stream.write_all(&line)?;
        self.stream.flush()?;

        Ok(())
    }

    /// Returns a reader over a cloned handle of the same socket.
    pub fn reader(&self) -> Result<ChannelReader, ApiError> {
        Ok(ChannelReader {
            reader: BufReader::new(self.stream.try_clone()?),
        })
    }

    /// Shuts both halves down. Any blocked reader wakes up with `ConnectionClosed`.
    pub fn close(&self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            tracing::debug!(target: Log::Transport, ?error, "Channel already shut down");
        }
    }
}

/// The read half of a channel.
#[derive(Debug)]
pub struct ChannelReader {
    reader: BufReader<TcpStream>,
}

impl ChannelReader {
    /// Blocks until the next known message arrives. Blank lines and unknown events are
    /// skipped; end-of-stream is reported as `ConnectionClosed`.
    pub fn next_message(&mut self) -> Result<ServerMessage, ApiError> {
        let mut line = String::new();

        loop {
            line.clear();

            if self.reader.read_line(&mut line)? == 0 {
                return Err(ApiError::ConnectionClosed);
            }

            if line.trim().is_empty() {
                continue;
            }

            if let Some(message) = ServerMessage::decode(line.trim())? {
                return Ok(message);
            }
        }
    }
}
