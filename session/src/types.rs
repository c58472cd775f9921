use std::fmt;

use chrono::{DateTime, Utc};

use crate::{Scoreboard, SessionError};

/// Smallest and largest round counts a tournament accepts.
pub const MIN_TOURNAMENT_ROUNDS: u32 = 3;
pub const MAX_TOURNAMENT_ROUNDS: u32 = 15;

/// How a session is played.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Exactly one round.
    Classic,

    /// An odd, fixed number of rounds chosen up front.
    Tournament,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Tournament => "tournament",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hand gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Rock,
    Paper,
    Scissors,

    /// No (valid) hand was seen.
    Unknown,
}

impl Move {
    /// Parses the service's labels. Anything that isn't one of the three gestures
    /// (`invalid`, `timeout`, `none`, ...) is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "rock" => Self::Rock,
            "paper" => Self::Paper,
            "scissors" => Self::Scissors,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rock => "rock",
            Self::Paper => "paper",
            Self::Scissors => "scissors",
            Self::Unknown => "unknown",
        }
    }

    /// The gesture this one defeats.
    pub fn beats(self) -> Option<Self> {
        match self {
            Self::Rock => Some(Self::Scissors),
            Self::Scissors => Some(Self::Paper),
            Self::Paper => Some(Self::Rock),
            Self::Unknown => None,
        }
    }

    /// Decides a round. An unrecognized player gesture always loses.
    pub fn play_against(self, computer: Self) -> Winner {
        if !self.is_known() {
            return Winner::Computer;
        }

        if self == computer {
            Winner::Draw
        } else if self.beats() == Some(computer) {
            Winner::Player
        } else {
            Winner::Computer
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who took a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Player,
    Computer,
    Draw,
}

impl Winner {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "player" => Some(Self::Player),
            "computer" => Some(Self::Computer),
            "draw" | "tie" => Some(Self::Draw),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Computer => "computer",
            Self::Draw => "draw",
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative outcome of one round.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundVerdict {
    pub player_move: Move,
    pub computer_move: Move,
    pub winner: Winner,
    pub confidence: f32,
    pub is_fallback: bool,
}

/// An interim per-frame prediction. Only ever used for in-progress feedback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LiveVerdict {
    pub prediction: Move,
    pub confidence: f32,
    pub detected_hand: bool,
}

/// One captured image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub image_data: Vec<u8>,
    pub capture_timestamp: u64,
    pub sequence_index: u32,
}

/// Round information that accompanies a batch to the inference service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchMetadata {
    pub mode: GameMode,
    pub total_rounds: u32,

    /// 1-based, as the service expects.
    pub round_number: u32,

    pub player_id: String,
    pub player_score: u32,
    pub computer_score: u32,
}

/// A sealed capture window, ready to be consumed once by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBatch {
    pub frames: Vec<Frame>,
    pub metadata: BatchMetadata,
}

/// Where the orchestrator is in the round lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Countdown,
    Capturing,
    AwaitingVerdict,
    RoundResult,
    NextRoundPending,
    MatchFinished,
    Aborted,
}

impl SessionState {
    /// No further rounds can be played from a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::MatchFinished | Self::Aborted)
    }
}

/// What a player asked for when starting a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSetup {
    pub mode: GameMode,
    pub total_rounds: u32,
    pub player_id: String,
}

impl MatchSetup {
    /// A single-round match.
    pub fn classic(player_id: &str) -> Self {
        Self {
            mode: GameMode::Classic,
            total_rounds: 1,
            player_id: normalize_player_id(player_id),
        }
    }

    /// A fixed-length match. The round count must be odd so that one side always
    /// ends up ahead (barring draws).
    pub fn tournament(player_id: &str, total_rounds: u32) -> Result<Self, SessionError> {
        let in_range = (MIN_TOURNAMENT_ROUNDS..=MAX_TOURNAMENT_ROUNDS).contains(&total_rounds);

        if !in_range || total_rounds % 2 == 0 {
            return Err(SessionError::InvalidRoundCount(total_rounds));
        }

        Ok(Self {
            mode: GameMode::Tournament,
            total_rounds,
            player_id: normalize_player_id(player_id),
        })
    }

    /// `total_rounds` is ignored for classic matches.
    pub fn new(mode: GameMode, total_rounds: u32, player_id: &str) -> Result<Self, SessionError> {
        match mode {
            GameMode::Classic => Ok(Self::classic(player_id)),
            GameMode::Tournament => Self::tournament(player_id, total_rounds),
        }
    }
}

fn normalize_player_id(player_id: &str) -> String {
    match player_id.trim() {
        "" => String::from("Player"),
        trimmed => trimmed.to_string(),
    }
}

/// The single authoritative view of a match in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub mode: GameMode,
    pub total_rounds: u32,
    pub current_round_index: u32,
    pub score: Scoreboard,
    pub state: SessionState,
}

impl Session {
    pub fn new(setup: &MatchSetup) -> Self {
        Self {
            mode: setup.mode,
            total_rounds: setup.total_rounds,
            current_round_index: 0,
            score: Scoreboard::default(),
            state: SessionState::Idle,
        }
    }

    /// 1-based number of the round currently being played.
    pub fn round_number(&self) -> u32 {
        self.current_round_index + 1
    }

    /// Whether the round that just resolved was the final one.
    pub fn is_final_round(&self) -> bool {
        self.mode == GameMode::Classic || self.current_round_index + 1 >= self.total_rounds
    }
}

/// The immutable summary of a completed match, handed to persistence.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub player_id: String,
    pub model_label: String,
    pub total_rounds: u32,
    pub timestamp: DateTime<Utc>,
    pub player_wins: u32,
    pub computer_wins: u32,
    pub draws: u32,
    pub win_streak: u32,
    pub mode: GameMode,
}

impl MatchRecord {
    pub fn winner(&self) -> Winner {
        match self.player_wins.cmp(&self.computer_wins) {
            std::cmp::Ordering::Greater => Winner::Player,
            std::cmp::Ordering::Less => Winner::Computer,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }
}
