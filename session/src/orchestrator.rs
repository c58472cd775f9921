//! The round state machine.
//!
//! `Orchestrator` is single-threaded and never sleeps: every operation takes the
//! current instant, and whoever drives it (the [`SessionController`] thread, or a
//! test) calls `poll_timers` whenever `next_deadline` comes due.
//!
//! [`SessionController`]: crate::SessionController

use std::fmt;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use chrono::Utc;

use rpsense_config::{MatchConfig, RpsenseConfig, TimingConfig};
use rpsense_logging::Log;

use crate::buffer::FrameBuffer;
use crate::controller::SessionInput;
use crate::device::{Camera, FrameSource};
use crate::errors::{BufferError, DeviceError, SessionError, TransportError};
use crate::fallback::{FallbackReason, fallback_verdict};
use crate::recorder::MatchRecorder;
use crate::timer::{TimerBank, TimerFire, TimerKind};
use crate::transport::{Completion, RoundContext, Transport, TransportEvent, TransportMessage};
use crate::{
    BatchMetadata, LiveVerdict, MatchRecord, MatchSetup, RoundVerdict, Scoreboard, Session, SessionState,
};

/// Countdowns tick once a second.
const TICK: Duration = Duration::from_secs(1);

/// Everything observers can learn about a session, in the order it happens.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    CountdownTick { round: u32, remaining: u32 },
    FrameCaptured { round: u32, sequence_index: u32, total: u32 },
    Live { round: u32, verdict: LiveVerdict },
    RoundResolved { round: u32, verdict: RoundVerdict, score: Scoreboard },
    NextRoundCountdown { next_round: u32, remaining: u32 },
    MatchFinished(MatchRecord),
    Aborted,
}

/// Which round transport results are currently accepted for.
#[derive(Debug, Default)]
struct RoundGuard {
    id: u64,
    resolved: bool,
}

impl RoundGuard {
    fn accepts(&self, round_id: u64) -> bool {
        round_id == self.id && !self.resolved
    }
}

pub struct OrchestratorBuilder {
    setup: MatchSetup,
    timing: TimingConfig,
    model_label: String,
    transport: Option<Box<dyn Transport>>,
    frame_source: Option<Box<dyn FrameSource>>,
    recorder: Option<Box<dyn MatchRecorder>>,
    events: Option<Sender<SessionEvent>>,
}

impl OrchestratorBuilder {
    fn new(setup: MatchSetup) -> Self {
        Self {
            setup,
            timing: TimingConfig::default(),
            model_label: MatchConfig::default().model_label,
            transport: None,
            frame_source: None,
            recorder: None,
            events: None,
        }
    }

    /// Takes timings and the model label from `config`.
    pub fn with_config(mut self, config: &RpsenseConfig) -> Self {
        self.timing = config.timing.clone();
        self.model_label = config.matches.model_label.clone();
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn with_frame_source(mut self, source: impl FrameSource + 'static) -> Self {
        self.frame_source = Some(Box::new(source));
        self
    }

    pub fn with_recorder(mut self, recorder: impl MatchRecorder + 'static) -> Self {
        self.recorder = Some(Box::new(recorder));
        self
    }

    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// `inbox` is where transports deliver their results; the caller is expected to
    /// feed what arrives there back through [`Orchestrator::on_transport`].
    pub fn build(self, inbox: Sender<SessionInput>) -> Result<Orchestrator, SessionError> {
        let transport = self.transport.ok_or(SessionError::MissingComponent("transport"))?;
        let frame_source = self.frame_source.ok_or(SessionError::MissingComponent("frame source"))?;

        Ok(Orchestrator {
            session: Session::new(&self.setup),
            setup: self.setup,
            timing: self.timing,
            model_label: self.model_label,
            timers: TimerBank::new(),
            buffer: FrameBuffer::new(),
            camera: Camera::new(frame_source),
            transport,
            recorder: self.recorder,
            events: self.events,
            inbox,
            round: RoundGuard::default(),
            pending_failure: None,
            capture_error: None,
            last_verdict: None,
        })
    }
}

/// Drives one match from the first countdown to the final record.
pub struct Orchestrator {
    setup: MatchSetup,
    session: Session,
    timing: TimingConfig,
    model_label: String,
    timers: TimerBank,
    buffer: FrameBuffer,
    camera: Camera,
    transport: Box<dyn Transport>,
    recorder: Option<Box<dyn MatchRecorder>>,
    events: Option<Sender<SessionEvent>>,
    inbox: Sender<SessionInput>,
    round: RoundGuard,

    /// A transport failure seen before the capture window closed.
    pending_failure: Option<TransportError>,

    /// The most recent frame the device failed to produce.
    capture_error: Option<DeviceError>,

    last_verdict: Option<RoundVerdict>,
}

impl Orchestrator {
    pub fn builder(setup: MatchSetup) -> OrchestratorBuilder {
        OrchestratorBuilder::new(setup)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn is_camera_active(&self) -> bool {
        self.camera.is_active()
    }

    /// When `poll_timers` next has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn last_verdict(&self) -> Option<RoundVerdict> {
        self.last_verdict
    }

    pub fn check_service(&mut self) -> Result<(), SessionError> {
        self.transport.health_check()?;
        Ok(())
    }

    /// Starts the match. The camera is opened here; if that fails the error is
    /// returned and nothing changes.
    pub fn start_round(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.session.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                action: "start a round",
                state: self.session.state,
            });
        }

        self.camera.acquire()?;

        tracing::info!(
            target: Log::Session,
            mode = %self.setup.mode,
            total_rounds = self.setup.total_rounds,
            player = %self.setup.player_id,
            transport = self.transport.name(),
            "Match started"
        );

        self.enter_countdown(now);
        Ok(())
    }

    /// Skips the rest of the inter-round countdown.
    pub fn proceed(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.session.state != SessionState::NextRoundPending {
            return Err(SessionError::InvalidState {
                action: "proceed",
                state: self.session.state,
            });
        }

        self.advance_round(now);
        Ok(())
    }

    /// Abandons the match. Nothing is recorded.
    pub fn exit(&mut self) {
        if self.session.state.is_terminal() {
            return;
        }

        self.timers.cancel_all();
        self.round.resolved = true;
        self.transport.abandon();
        self.buffer.clear();
        self.camera.release();

        tracing::info!(target: Log::Session, round = self.session.round_number(), "Match abandoned");

        self.set_state(SessionState::Aborted);
        self.emit(SessionEvent::Aborted);
        self.transport.shutdown();
    }

    /// Final cleanup before the orchestrator goes away. Aborts a match in progress.
    pub fn shutdown(&mut self) {
        self.exit();
        self.transport.shutdown();
        self.camera.release();
    }

    /// Handles every timer expiry due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        while let Some(fire) = self.timers.poll(now) {
            self.on_timer(fire, now);
        }
    }

    /// Handles something a transport delivered. Deliveries for an earlier or already
    /// resolved round are dropped.
    pub fn on_transport(&mut self, message: TransportMessage, now: Instant) {
        if !self.round.accepts(message.round_id) {
            tracing::debug!(
                target: Log::Session,
                round_id = message.round_id,
                current = self.round.id,
                "Ignoring stale transport event"
            );
            return;
        }

        let round = self.session.round_number();

        match message.event {
            TransportEvent::Live(verdict) => {
                self.emit(SessionEvent::Live { round, verdict });
            },

            TransportEvent::Verdict(result) => match (self.session.state, result) {
                (SessionState::AwaitingVerdict, result) => self.resolve_with(result, now),

                // Streaming services may settle the round before every frame is in.
                (SessionState::Capturing, Ok(verdict)) => {
                    tracing::info!(target: Log::Session, round, "Verdict arrived before the capture window closed");
                    self.timers.cancel(TimerKind::Capture);
                    self.buffer.clear();
                    self.set_state(SessionState::AwaitingVerdict);
                    self.resolve(verdict, now);
                },

                // Still capturing; remember the failure and settle once the window closes.
                (SessionState::Countdown | SessionState::Capturing, Err(error)) => {
                    tracing::warn!(target: Log::Session, round, ?error, "Transport failed mid-round");
                    self.pending_failure.get_or_insert(error);
                },

                (state, _) => {
                    tracing::debug!(target: Log::Session, round, ?state, "Ignoring verdict outside the verdict window");
                },
            },
        }
    }

    fn on_timer(&mut self, fire: TimerFire, now: Instant) {
        let round = self.session.round_number();

        match fire.kind {
            TimerKind::Countdown => {
                self.emit(SessionEvent::CountdownTick {
                    round,
                    remaining: fire.remaining,
                });

                if fire.remaining == 0 {
                    self.begin_capture(now);
                }
            },

            TimerKind::Capture => {
                self.capture_frame(now);

                if fire.remaining == 0 {
                    self.finish_capture(now);
                }
            },

            TimerKind::VerdictDeadline => {
                if self.session.state == SessionState::AwaitingVerdict {
                    self.transport.abandon();
                    self.resolve_fallback(FallbackReason::Timeout, now);
                }
            },

            TimerKind::InterRound => {
                self.emit(SessionEvent::NextRoundCountdown {
                    next_round: round + 1,
                    remaining: fire.remaining,
                });

                if fire.remaining == 0 {
                    self.advance_round(now);
                }
            },
        }
    }

    fn enter_countdown(&mut self, now: Instant) {
        debug_assert_eq!(self.session.score.rounds_scored(), self.session.current_round_index);

        self.round = RoundGuard {
            id: self.round.id + 1,
            resolved: false,
        };
        self.pending_failure = None;
        self.capture_error = None;
        self.last_verdict = None;
        self.buffer.clear();

        let context = RoundContext {
            round_id: self.round.id,
            mode: self.setup.mode,
            total_rounds: self.setup.total_rounds,
            round_number: self.session.round_number(),
            player_id: self.setup.player_id.clone(),
        };

        let completion = Completion::new(self.round.id, self.inbox.clone());

        if let Err(error) = self.transport.begin_round(&context, completion) {
            tracing::warn!(
                target: Log::Session,
                transport = self.transport.name(),
                ?error,
                "Transport could not start the round"
            );
            self.pending_failure = Some(error);
        }

        self.set_state(SessionState::Countdown);

        match self.timing.countdown_secs {
            0 => self.begin_capture(now),
            secs => self.timers.start(TimerKind::Countdown, TICK, secs, now),
        }
    }

    fn begin_capture(&mut self, now: Instant) {
        self.set_state(SessionState::Capturing);
        self.buffer.begin_window(now);

        match self.timing.capture_frames {
            0 => self.finish_capture(now),
            frames => self
                .timers
                .start(TimerKind::Capture, self.timing.capture_interval(), frames, now),
        }
    }

    fn capture_frame(&mut self, now: Instant) {
        let round = self.session.round_number();

        let image = match self.camera.capture() {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(target: Log::Capture, round, ?error, "Frame capture failed");
                self.capture_error = Some(error);
                return;
            },
        };

        let frame = match self.buffer.capture(image, now) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(target: Log::Capture, round, ?error, "Frame rejected by buffer");
                return;
            },
        };

        let sequence_index = frame.sequence_index;

        if let Err(error) = self.transport.on_frame(frame) {
            if self.pending_failure.is_none() {
                tracing::warn!(target: Log::Session, round, ?error, "Transport rejected a frame");
                self.pending_failure = Some(error);
            }
        }

        self.emit(SessionEvent::FrameCaptured {
            round,
            sequence_index,
            total: self.timing.capture_frames,
        });
    }

    /// Seals the window and hands it to the transport, or settles the round right
    /// away if there is nothing worth sending.
    fn finish_capture(&mut self, now: Instant) {
        self.set_state(SessionState::AwaitingVerdict);

        if let Some(error) = self.pending_failure.take() {
            self.buffer.clear();
            self.transport.abandon();
            self.resolve_fallback(FallbackReason::Transport(error), now);
            return;
        }

        let metadata = BatchMetadata {
            mode: self.setup.mode,
            total_rounds: self.setup.total_rounds,
            round_number: self.session.round_number(),
            player_id: self.setup.player_id.clone(),
            player_score: self.session.score.player,
            computer_score: self.session.score.computer,
        };

        let submitted = match self.buffer.submit(metadata) {
            Ok(batch) => self.transport.submit(batch).map_err(FallbackReason::Transport),

            Err(BufferError::Empty) => Err(match self.capture_error.take() {
                Some(error) => FallbackReason::Device(error),
                None => FallbackReason::NoFrames,
            }),

            Err(error) => {
                tracing::error!(target: Log::Capture, ?error, "Capture window could not be sealed");
                Err(FallbackReason::NoFrames)
            },
        };

        self.buffer.clear();

        match submitted {
            Ok(()) => {
                self.timers
                    .start(TimerKind::VerdictDeadline, self.timing.verdict_timeout(), 1, now);
            },

            Err(reason) => {
                self.transport.abandon();
                self.resolve_fallback(reason, now);
            },
        }
    }

    fn resolve_with(&mut self, result: Result<RoundVerdict, TransportError>, now: Instant) {
        match result {
            Ok(verdict) => self.resolve(verdict, now),

            Err(error) => {
                self.transport.abandon();
                self.resolve_fallback(FallbackReason::Transport(error), now);
            },
        }
    }

    fn resolve_fallback(&mut self, reason: FallbackReason, now: Instant) {
        let verdict = fallback_verdict(self.session.round_number(), &reason);
        self.resolve(verdict, now);
    }

    /// The only place a round's score changes. Runs at most once per round.
    fn resolve(&mut self, verdict: RoundVerdict, now: Instant) {
        let round = self.session.round_number();

        if self.round.resolved {
            tracing::debug!(target: Log::Session, round, "Round already resolved, ignoring verdict");
            return;
        }

        self.round.resolved = true;
        self.timers.cancel_all();

        self.session.score.apply_verdict(&verdict);
        self.last_verdict = Some(verdict);
        self.set_state(SessionState::RoundResult);

        tracing::info!(
            target: Log::Session,
            round,
            player_move = ?verdict.player_move,
            computer_move = ?verdict.computer_move,
            winner = ?verdict.winner,
            fallback = verdict.is_fallback,
            "Round resolved"
        );

        self.emit(SessionEvent::RoundResolved {
            round,
            verdict,
            score: self.session.score,
        });

        if self.session.is_final_round() {
            self.finish_match();
            return;
        }

        self.set_state(SessionState::NextRoundPending);

        match self.timing.inter_round_secs {
            0 => self.advance_round(now),
            secs => self.timers.start(TimerKind::InterRound, TICK, secs, now),
        }
    }

    /// The single way into the next round, whether the countdown ran out or the
    /// player asked to go on.
    fn advance_round(&mut self, now: Instant) {
        if self.session.state != SessionState::NextRoundPending {
            tracing::debug!(target: Log::Session, state = ?self.session.state, "No round pending");
            return;
        }

        self.timers.cancel(TimerKind::InterRound);
        self.session.current_round_index += 1;
        self.enter_countdown(now);
    }

    fn finish_match(&mut self) {
        self.timers.cancel_all();
        self.camera.release();
        self.transport.shutdown();

        let record = self
            .session
            .score
            .finalize_match(&self.setup, &self.model_label, Utc::now());

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(error) = recorder.record(&record) {
                tracing::error!(target: Log::History, ?error, "Failed to record finished match");
            }
        }

        self.set_state(SessionState::MatchFinished);

        tracing::info!(
            target: Log::Session,
            player_wins = record.player_wins,
            computer_wins = record.computer_wins,
            draws = record.draws,
            "Match finished"
        );

        self.emit(SessionEvent::MatchFinished(record));
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.session.state;

        if from == to {
            return;
        }

        self.session.state = to;
        tracing::debug!(target: Log::Session, ?from, ?to, "State changed");

        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                tracing::trace!(target: Log::Session, "No one is listening for session events");
            }
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session)
            .field("transport", &self.transport.name())
            .field("camera", &self.camera)
            .finish_non_exhaustive()
    }
}
