//! The RPSense session controller.
//!
//! A match is driven by an [`Orchestrator`]: it counts down, captures a window of
//! frames, hands them to a [`Transport`] for a verdict (or settles the round with a
//! fallback verdict), keeps score, and produces one [`MatchRecord`] at the end.
//! [`SessionController`] runs an orchestrator on its own thread.

mod buffer;
pub use buffer::FrameBuffer;

mod controller;
pub use controller::{Command, SessionController, SessionInput};

pub mod device;
pub use device::{Camera, DirectoryFrameSource, FrameSource};

pub mod errors;
pub use errors::{BufferError, DeviceError, SessionError, TransportError};

mod fallback;
pub use fallback::{FALLBACK_COMPUTER_MOVE, FallbackReason, fallback_verdict};

mod orchestrator;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SessionEvent};

mod recorder;
pub use recorder::{MatchRecorder, RecordError};

mod scoreboard;
pub use scoreboard::Scoreboard;

pub mod timer;
pub use timer::{TimerBank, TimerFire, TimerKind};

pub mod transport;
pub use transport::{
    BatchTransport, Completion, RoundContext, StreamTransport, Transport, TransportEvent, TransportMessage,
};

mod types;
pub use types::*;
