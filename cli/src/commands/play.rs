use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use rpsense_config::RpsenseConfig;
use rpsense_logging::Log;
use rpsense_session::{
    BatchTransport, DirectoryFrameSource, MatchRecord, MatchSetup, Orchestrator, SessionController, SessionEvent,
    SessionState, StreamTransport, Winner,
};

use super::open_history;
use crate::{ModeArg, TransportKind};

/// How often the event loop looks at keyboard input.
const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Classic)]
    mode: ModeArg,

    /// Rounds in a tournament (odd, 3 to 15)
    #[arg(long, default_value_t = 5)]
    rounds: u32,

    #[arg(long, default_value = "Player")]
    player: String,

    /// Directory of jpg/png images replayed as camera frames
    #[arg(long)]
    frames: PathBuf,

    #[arg(long, value_enum, default_value_t = TransportKind::Batch)]
    transport: TransportKind,

    /// Play even if the inference service can't be reached; every round falls back
    #[arg(long)]
    offline: bool,
}

pub fn run(config: &RpsenseConfig, args: PlayArgs) -> Result<()> {
    let setup = MatchSetup::new(args.mode.into(), args.rounds, &args.player)?;
    let history = open_history(config);

    let builder = Orchestrator::builder(setup)
        .with_config(config)
        .with_frame_source(DirectoryFrameSource::new(args.frames))
        .with_recorder(history);

    let builder = match args.transport {
        TransportKind::Batch => builder.with_transport(BatchTransport::from_config(&config.inference)),
        TransportKind::Stream => builder.with_transport(StreamTransport::from_config(&config.inference)),
    };

    let (events_tx, events) = mpsc::channel();
    let controller = SessionController::spawn(builder, events_tx)?;

    ensure_service(&controller, args.offline)?;

    controller.start_round().context("unable to start the match")?;

    println!("Press enter (or n) to skip ahead between rounds, q to quit.");

    let keys = spawn_stdin_reader();

    match drive(&controller, &events, &keys)? {
        Some(record) => print_summary(&record),
        None => println!("Match abandoned."),
    }

    Ok(())
}

/// Refuses to start a match against a service that isn't there, unless asked to.
fn ensure_service(controller: &SessionController, offline: bool) -> Result<()> {
    match controller.check_service() {
        Ok(()) => Ok(()),

        Err(error) if offline => {
            tracing::warn!(target: Log::Session, ?error, "Inference service unavailable, rounds will fall back");
            Ok(())
        },

        Err(error) => Err(error).context("inference service is unavailable (pass --offline to play anyway)"),
    }
}

/// Prints events as they arrive until the match ends. Returns the record of a
/// finished match, or `None` if it was aborted.
fn drive(controller: &SessionController, events: &Receiver<SessionEvent>, keys: &Receiver<String>) -> Result<Option<MatchRecord>> {
    loop {
        for key in keys.try_iter() {
            match key.trim() {
                "q" => controller.exit()?,
                _ => controller.proceed()?,
            }
        }

        let event = match events.recv_timeout(INPUT_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        };

        match event {
            SessionEvent::CountdownTick { round, remaining } => {
                if remaining > 0 {
                    println!("Round {round}: {remaining}...");
                } else {
                    println!("Round {round}: show your hand!");
                }
            },

            SessionEvent::FrameCaptured { .. } => {},

            SessionEvent::Live { verdict, .. } => {
                tracing::debug!(
                    target: Log::Session,
                    prediction = %verdict.prediction,
                    confidence = verdict.confidence,
                    "Live prediction"
                );
            },

            SessionEvent::StateChanged { to: SessionState::AwaitingVerdict, .. } => {
                println!("Thinking...");
            },

            SessionEvent::StateChanged { .. } => {},

            SessionEvent::RoundResolved { round, verdict, score } => {
                let note = if verdict.is_fallback { " (no verdict received)" } else { "" };
                let outcome = match verdict.winner {
                    Winner::Player => "you win",
                    Winner::Computer => "computer wins",
                    Winner::Draw => "draw",
                };

                println!(
                    "Round {round}: you played {}, computer played {}: {outcome}{note}",
                    verdict.player_move, verdict.computer_move
                );
                println!(
                    "  Score: you {} - {} computer ({} draws)",
                    score.player, score.computer, score.draws
                );
            },

            SessionEvent::NextRoundCountdown { next_round, remaining } => {
                if remaining > 0 {
                    println!("  Round {next_round} in {remaining}...");
                }
            },

            SessionEvent::MatchFinished(record) => return Ok(Some(record)),

            SessionEvent::Aborted => return Ok(None),
        }
    }
}

/// Forwards stdin lines until stdin closes. The thread is left detached; it is
/// blocked on a read for as long as the process lives.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new().name("RPSenseStdinThread".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };

            if tx.send(line).is_err() {
                break;
            }
        }
    });

    if let Err(error) = spawned {
        tracing::warn!(target: Log::Session, ?error, "Keyboard input unavailable");
    }

    rx
}

fn print_summary(record: &MatchRecord) {
    println!();
    println!(
        "Match over: {} {} - {} computer, {} draws",
        record.player_id, record.player_wins, record.computer_wins, record.draws
    );
    println!("Winner: {}", record.winner());

    if record.win_streak > 0 {
        println!("Win streak: {}", record.win_streak);
    }
}
