use thiserror::Error;

use rpsense_inference_api::ApiError;

use crate::SessionState;

/// Problems with the capture device. These surface to the caller before a round
/// starts and are never retried automatically.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Camera access was denied")]
    PermissionDenied,

    #[error("No usable capture device: {0}")]
    Unavailable(String),

    #[error("The capture device is not open")]
    NotOpen,

    #[error("Unable to read a frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures between the controller and the inference service. A round never
/// fails because of one of these; the fallback verdict takes over.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("The inference service returned an unusable response: {0}")]
    MalformedResponse(String),

    #[error("The inference service reported an error: {0}")]
    Service(String),

    #[error("No round is active on this transport")]
    NoActiveRound,

    #[error("A submission is already in flight")]
    SubmissionInFlight,

    #[error("The connection to the inference service was lost")]
    ConnectionLost,

    #[error("Failed to spawn transport thread: {0}")]
    ThreadSpawn(std::io::Error),
}

/// Misuse of the frame buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("No frames have been captured")]
    Empty,

    #[error("The batch has already been submitted")]
    SubmissionInFlight,

    #[error("The batch is sealed; frames can't be added until it is cleared")]
    BatchSealed,

    #[error("Frame timestamp {got} does not follow {previous}")]
    NonMonotonicTimestamp { previous: u64, got: u64 },
}

/// Errors returned to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Tournaments take an odd number of rounds between 3 and 15, got {0}")]
    InvalidRoundCount(u32),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Can't {action} while {state:?}")]
    InvalidState { action: &'static str, state: SessionState },

    #[error("No {0} was configured")]
    MissingComponent(&'static str),

    #[error("The session thread has shut down")]
    Disconnected,
}
