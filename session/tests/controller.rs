//! Runs matches on the real session thread with fast timings.

use std::fs;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use rpsense_config::TimingConfig;
use rpsense_session::{
    Completion, DirectoryFrameSource, Frame, FrameBatch, MatchRecord, MatchSetup, Move, Orchestrator, RoundContext,
    RoundVerdict, SessionController, SessionError, SessionEvent, Transport, TransportError, Winner,
};

const WAIT: Duration = Duration::from_secs(5);

fn fast_timing() -> TimingConfig {
    TimingConfig {
        countdown_secs: 0,
        capture_frames: 3,
        capture_fps: 100,
        inter_round_secs: 0,
        verdict_timeout_secs: 1,
    }
}

/// Answers every submission immediately with a player win.
#[derive(Default)]
struct EagerTransport {
    completion: Option<Completion>,
}

impl Transport for EagerTransport {
    fn name(&self) -> &'static str {
        "eager"
    }

    fn health_check(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn begin_round(&mut self, _context: &RoundContext, completion: Completion) -> Result<(), TransportError> {
        self.completion = Some(completion);
        Ok(())
    }

    fn on_frame(&mut self, _frame: &Frame) -> Result<(), TransportError> {
        Ok(())
    }

    fn submit(&mut self, _batch: FrameBatch) -> Result<(), TransportError> {
        let completion = self.completion.take().ok_or(TransportError::NoActiveRound)?;

        completion.verdict(Ok(RoundVerdict {
            player_move: Move::Paper,
            computer_move: Move::Rock,
            winner: Winner::Player,
            confidence: 0.8,
            is_fallback: false,
        }));

        Ok(())
    }

    fn abandon(&mut self) {
        self.completion = None;
    }

    fn shutdown(&mut self) {}
}

/// Never answers.
struct SilentTransport;

impl Transport for SilentTransport {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn health_check(&mut self) -> Result<(), TransportError> {
        Err(TransportError::ConnectionLost)
    }

    fn begin_round(&mut self, _context: &RoundContext, _completion: Completion) -> Result<(), TransportError> {
        Ok(())
    }

    fn on_frame(&mut self, _frame: &Frame) -> Result<(), TransportError> {
        Ok(())
    }

    fn submit(&mut self, _batch: FrameBatch) -> Result<(), TransportError> {
        Ok(())
    }

    fn abandon(&mut self) {}

    fn shutdown(&mut self) {}
}

fn frames_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("frame_000.jpg"), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
    dir
}

fn wait_for<F>(events: &Receiver<SessionEvent>, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = events.recv_timeout(WAIT).expect("session went quiet");

        if matches(&event) {
            return event;
        }
    }
}

#[test]
fn plays_a_tournament_to_the_end() {
    let dir = frames_dir();
    let (events_tx, events) = mpsc::channel();
    let (records_tx, records) = mpsc::channel::<MatchRecord>();

    let builder = Orchestrator::builder(MatchSetup::tournament("ana", 3).unwrap())
        .with_timing(fast_timing())
        .with_transport(EagerTransport::default())
        .with_frame_source(DirectoryFrameSource::new(dir.path()))
        .with_recorder(records_tx);

    let controller = SessionController::spawn(builder, events_tx).unwrap();

    controller.check_service().unwrap();
    controller.start_round().unwrap();

    let finished = wait_for(&events, |event| matches!(event, SessionEvent::MatchFinished(_)));
    let SessionEvent::MatchFinished(record) = finished else {
        unreachable!();
    };

    assert_eq!((record.player_wins, record.computer_wins, record.draws), (3, 0, 0));
    assert_eq!(record.win_streak, 3);
    assert_eq!(records.recv_timeout(WAIT).unwrap(), record);

    // The match is over; starting again is refused.
    assert!(matches!(controller.start_round(), Err(SessionError::InvalidState { .. })));
}

#[test]
fn silent_service_times_out_into_a_fallback() {
    let dir = frames_dir();
    let (events_tx, events) = mpsc::channel();

    let builder = Orchestrator::builder(MatchSetup::classic("ana"))
        .with_timing(fast_timing())
        .with_transport(SilentTransport)
        .with_frame_source(DirectoryFrameSource::new(dir.path()));

    let controller = SessionController::spawn(builder, events_tx).unwrap();

    assert!(matches!(controller.check_service(), Err(SessionError::Transport(_))));
    controller.start_round().unwrap();

    let resolved = wait_for(&events, |event| matches!(event, SessionEvent::RoundResolved { .. }));
    let SessionEvent::RoundResolved { verdict, score, .. } = resolved else {
        unreachable!();
    };

    assert!(verdict.is_fallback);
    assert_eq!(score.computer, 1);
}

#[test]
fn exit_aborts_and_drop_joins() {
    let dir = frames_dir();
    let (events_tx, events) = mpsc::channel();

    let timing = TimingConfig {
        countdown_secs: 30,
        ..fast_timing()
    };

    let builder = Orchestrator::builder(MatchSetup::classic("ana"))
        .with_timing(timing)
        .with_transport(SilentTransport)
        .with_frame_source(DirectoryFrameSource::new(dir.path()));

    let controller = SessionController::spawn(builder, events_tx).unwrap();
    controller.start_round().unwrap();
    controller.exit().unwrap();

    wait_for(&events, |event| *event == SessionEvent::Aborted);
    drop(controller);
}

#[test]
fn missing_frames_directory_is_reported_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let (events_tx, _events) = mpsc::channel();

    let builder = Orchestrator::builder(MatchSetup::classic("ana"))
        .with_transport(SilentTransport)
        .with_frame_source(DirectoryFrameSource::new(dir.path().join("nope")));

    let controller = SessionController::spawn(builder, events_tx).unwrap();

    assert!(matches!(controller.start_round(), Err(SessionError::Device(_))));
}

#[test]
fn builder_requires_a_transport() {
    let (events_tx, _events) = mpsc::channel();
    let builder = Orchestrator::builder(MatchSetup::classic("ana")).with_frame_source(DirectoryFrameSource::new("."));

    assert!(matches!(
        SessionController::spawn(builder, events_tx),
        Err(SessionError::MissingComponent("transport"))
    ));
}
