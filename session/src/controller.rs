use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

use rpsense_logging::Log;

use crate::errors::SessionError;
use crate::orchestrator::{Orchestrator, OrchestratorBuilder, SessionEvent};
use crate::transport::TransportMessage;

/// Requests from the owner of a session.
#[derive(Debug)]
pub enum Command {
    StartRound(Sender<Result<(), SessionError>>),
    CheckService(Sender<Result<(), SessionError>>),
    Proceed,
    Exit,
}

/// Everything the session thread reacts to, other than its own timers.
#[derive(Debug)]
pub enum SessionInput {
    Command(Command),
    Transport(TransportMessage),
    Shutdown,
}

/// Runs an [`Orchestrator`] on a background thread.
///
/// Commands, transport results and timer expiries are all handled on that one
/// thread, so the orchestrator never needs a lock. Observers follow along through
/// the `SessionEvent` channel handed to `spawn`.
#[derive(Debug)]
pub struct SessionController {
    inbox: Sender<SessionInput>,
    session_thread: Option<thread::JoinHandle<()>>,
}

impl SessionController {
    /// Builds the orchestrator and starts the session thread.
    ///
    /// Failure to spawn the thread results in a crash; if we can't spawn an OS
    /// thread, there are far bigger issues at work.
    pub fn spawn(builder: OrchestratorBuilder, events: Sender<SessionEvent>) -> Result<Self, SessionError> {
        let (inbox, receiver) = mpsc::channel();
        let orchestrator = builder.with_events(events).build(inbox.clone())?;

        let session_thread = thread::Builder::new()
            .name("RPSenseSessionThread".into())
            .spawn(move || run(orchestrator, receiver))
            .expect("Failed to spawn RPSenseSessionThread.");

        Ok(Self {
            inbox,
            session_thread: Some(session_thread),
        })
    }

    /// Starts the match, waiting until the camera is open (or has failed to open).
    pub fn start_round(&self) -> Result<(), SessionError> {
        self.request(Command::StartRound)
    }

    pub fn check_service(&self) -> Result<(), SessionError> {
        self.request(Command::CheckService)
    }

    pub fn proceed(&self) -> Result<(), SessionError> {
        self.send(SessionInput::Command(Command::Proceed))
    }

    pub fn exit(&self) -> Result<(), SessionError> {
        self.send(SessionInput::Command(Command::Exit))
    }

    fn request<F>(&self, command: F) -> Result<(), SessionError>
    where
        F: FnOnce(Sender<Result<(), SessionError>>) -> Command,
    {
        let (reply, response) = mpsc::channel();
        self.send(SessionInput::Command(command(reply)))?;

        response.recv().map_err(|_| SessionError::Disconnected)?
    }

    fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.inbox.send(input).map_err(|_| SessionError::Disconnected)
    }
}

impl Drop for SessionController {
    /// Stops the session thread, aborting any match in progress, and joins it.
    fn drop(&mut self) {
        if let Some(session_thread) = self.session_thread.take() {
            if let Err(e) = self.inbox.send(SessionInput::Shutdown) {
                tracing::error!(
                    target: Log::Session,
                    error = ?e,
                    "Failed to send shutdown notification to session thread, may hang"
                );
            }

            if let Err(e) = session_thread.join() {
                tracing::error!(
                    target: Log::Session,
                    error = ?e,
                    "Session thread failure"
                );
            }
        }
    }
}

/// The session thread: sleep until the next timer or input, handle it, repeat.
fn run(mut orchestrator: Orchestrator, receiver: Receiver<SessionInput>) {
    loop {
        orchestrator.poll_timers(Instant::now());

        let input = match orchestrator.next_deadline() {
            Some(deadline) => match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(input) => input,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },

            None => match receiver.recv() {
                Ok(input) => input,
                Err(_) => break,
            },
        };

        let now = Instant::now();

        match input {
            SessionInput::Command(Command::StartRound(reply)) => {
                if reply.send(orchestrator.start_round(now)).is_err() {
                    tracing::debug!(target: Log::Session, "Start request was abandoned");
                }
            },

            SessionInput::Command(Command::CheckService(reply)) => {
                if reply.send(orchestrator.check_service()).is_err() {
                    tracing::debug!(target: Log::Session, "Health request was abandoned");
                }
            },

            SessionInput::Command(Command::Proceed) => {
                if let Err(error) = orchestrator.proceed(now) {
                    tracing::debug!(target: Log::Session, %error, "Ignoring proceed request");
                }
            },

            SessionInput::Command(Command::Exit) => orchestrator.exit(),
            SessionInput::Transport(message) => orchestrator.on_transport(message, now),
            SessionInput::Shutdown => break,
        }
    }

    orchestrator.shutdown();
}
