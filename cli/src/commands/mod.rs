use std::path::PathBuf;

use rpsense_config::RpsenseConfig;
use rpsense_history::MatchHistory;

pub mod health;
pub mod history;
pub mod play;

/// Used when the config doesn't name a history file.
const DEFAULT_HISTORY_FILE: &str = "rpsense_history.json";

pub fn open_history(config: &RpsenseConfig) -> MatchHistory {
    let path = config
        .matches
        .history_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_FILE));

    MatchHistory::load(path, config.matches.history_cap)
}
