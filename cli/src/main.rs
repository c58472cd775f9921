use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use rpsense_config::RpsenseConfig;
use rpsense_session::GameMode;

mod commands;

#[derive(Parser)]
#[command(name = "rpsense")]
#[command(about = "RPSense - rock, paper, scissors against a gesture recognition model", long_about = None)]
struct Cli {
    /// TOML file layered over the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the inference service is up
    Health {
        #[arg(long, value_enum, default_value_t = TransportKind::Batch)]
        transport: TransportKind,
    },

    /// Play a match using images from a directory as the camera
    Play(commands::play::PlayArgs),

    /// Show finished matches
    History {
        /// Only matches played by this player
        #[arg(long)]
        player: Option<String>,

        /// How many matches to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// How frames reach the inference service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// One HTTP request per round
    Batch,

    /// Frames streamed over a persistent channel
    Stream,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Classic,
    Tournament,
}

impl From<ModeArg> for GameMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Classic => GameMode::Classic,
            ModeArg::Tournament => GameMode::Tournament,
        }
    }
}

fn main() -> Result<()> {
    rpsense_logging::init();

    let cli = Cli::parse();
    let config = RpsenseConfig::init(cli.config.as_deref())?;

    tracing::debug!(environment = RpsenseConfig::environment(), "Configuration loaded");

    match cli.command {
        Commands::Health { transport } => commands::health::run(config, transport)?,
        Commands::Play(args) => commands::play::run(config, args)?,
        Commands::History { player, limit } => commands::history::run(config, player.as_deref(), limit)?,
    }

    Ok(())
}
