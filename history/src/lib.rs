//! Match history: every finished match, newest first, kept on disk as JSON.
//!
//! The history is capped; once full, recording a match evicts the oldest one.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rpsense_logging::Log;
use rpsense_session::{MatchRecord, MatchRecorder, RecordError};

/// Number of matches kept when no cap is configured.
pub const DEFAULT_CAP: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Unable to write match history to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to serialize match history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A match as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StoredMatch {
    pub id: u64,

    #[serde(flatten)]
    pub record: MatchRecord,
}

/// The file layout.
#[derive(Debug, Default, serde::Deserialize, serde::Serialize)]
struct HistoryFile {
    matches: Vec<StoredMatch>,
}

/// A handle to the match history. Cheap to clone; all clones share the same list.
#[derive(Clone, Debug)]
pub struct MatchHistory {
    path: Option<Arc<PathBuf>>,
    cap: usize,
    matches: Arc<Mutex<Vec<StoredMatch>>>,
}

impl MatchHistory {
    /// Loads the history stored at `path`. A missing or unreadable file is logged and
    /// treated as an empty history; the file is (re)written on the next change.
    pub fn load(path: PathBuf, cap: usize) -> Self {
        tracing::info!(target: Log::History, ?path, "Loading match history");

        let mut matches = Vec::new();

        match fs::read_to_string(path.as_path()) {
            Ok(contents) => match serde_json::from_str::<HistoryFile>(&contents) {
                Ok(parsed) => {
                    matches = parsed.matches;
                },

                Err(error) => {
                    tracing::error!(target: Log::History, ?error, "Unable to parse match history file");
                },
            },

            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(target: Log::History, "No match history yet");
            },

            Err(error) => {
                tracing::error!(target: Log::History, ?error, "Unable to read match history file");
            },
        }

        let cap = cap.max(1);
        matches.truncate(cap);

        Self {
            path: Some(Arc::new(path)),
            cap,
            matches: Arc::new(Mutex::new(matches)),
        }
    }

    /// A history that is never written to disk.
    pub fn in_memory(cap: usize) -> Self {
        Self {
            path: None,
            cap: cap.max(1),
            matches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredMatch>> {
        self.matches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stores a finished match at the front of the history.
    ///
    /// Every change is written to disk before it is applied, so a failed write leaves
    /// the history as it was.
    pub fn add(&self, record: MatchRecord) -> Result<StoredMatch, HistoryError> {
        let mut matches = self.lock();

        let id = matches.iter().map(|stored| stored.id).max().map_or(1, |max| max + 1);
        let stored = StoredMatch { id, record };

        let mut updated = Vec::with_capacity(matches.len() + 1);
        updated.push(stored.clone());
        updated.extend(matches.iter().cloned());

        if updated.len() > self.cap {
            let evicted = updated.len() - self.cap;
            updated.truncate(self.cap);
            tracing::debug!(target: Log::History, evicted, "Evicted oldest matches");
        }

        self.commit(&mut matches, updated)?;

        tracing::info!(target: Log::History, id, player = %stored.record.player_id, "Match recorded");
        Ok(stored)
    }

    /// Up to `count` of the most recent matches.
    pub fn recent(&self, count: usize) -> Vec<StoredMatch> {
        self.lock().iter().take(count).cloned().collect()
    }

    /// Every stored match played by `player_id`, ignoring case and surrounding spaces.
    pub fn for_player(&self, player_id: &str) -> Vec<StoredMatch> {
        let wanted = player_id.trim().to_lowercase();

        self.lock()
            .iter()
            .filter(|stored| stored.record.player_id.to_lowercase() == wanted)
            .cloned()
            .collect()
    }

    /// Percentage of decided rounds the player won across the whole history.
    pub fn win_rate(&self) -> f64 {
        win_rate(self.lock().iter())
    }

    /// Like [`win_rate`](Self::win_rate), for one player only.
    pub fn player_win_rate(&self, player_id: &str) -> f64 {
        win_rate(self.for_player(player_id).iter())
    }

    /// Removes a match. Returns whether it existed.
    pub fn remove(&self, id: u64) -> Result<bool, HistoryError> {
        let mut matches = self.lock();

        if !matches.iter().any(|stored| stored.id == id) {
            return Ok(false);
        }

        let updated = matches.iter().filter(|stored| stored.id != id).cloned().collect();
        self.commit(&mut matches, updated)?;

        Ok(true)
    }

    /// Removes every match played by `player_id`. Returns how many were removed.
    pub fn remove_player(&self, player_id: &str) -> Result<usize, HistoryError> {
        let wanted = player_id.trim().to_lowercase();
        let mut matches = self.lock();

        let updated: Vec<StoredMatch> = matches
            .iter()
            .filter(|stored| stored.record.player_id.to_lowercase() != wanted)
            .cloned()
            .collect();
        let removed = matches.len() - updated.len();

        if removed > 0 {
            self.commit(&mut matches, updated)?;
        }

        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), HistoryError> {
        let mut matches = self.lock();
        self.commit(&mut matches, Vec::new())
    }

    /// Persists `updated` and, only once that succeeded, makes it the current list.
    fn commit(&self, matches: &mut Vec<StoredMatch>, updated: Vec<StoredMatch>) -> Result<(), HistoryError> {
        self.write_file(&updated)?;
        *matches = updated;

        Ok(())
    }

    /// Serializes `matches` to the history file, if there is one.
    fn write_file(&self, matches: &[StoredMatch]) -> Result<(), HistoryError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let io_error = |source| HistoryError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let file = fs::File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, &HistoryFileRef { matches })?;
        writer.flush().map_err(io_error)?;

        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }
}

/// Borrowed twin of `HistoryFile`, so writing doesn't need to clone the list.
#[derive(serde::Serialize)]
struct HistoryFileRef<'a> {
    matches: &'a [StoredMatch],
}

fn win_rate<'a>(matches: impl Iterator<Item = &'a StoredMatch>) -> f64 {
    let (wins, losses) = matches.fold((0u64, 0u64), |(wins, losses), stored| {
        (
            wins + u64::from(stored.record.player_wins),
            losses + u64::from(stored.record.computer_wins),
        )
    });

    if wins + losses == 0 {
        return 0.0;
    }

    wins as f64 / (wins + losses) as f64 * 100.0
}

impl MatchRecorder for MatchHistory {
    fn record(&mut self, record: &MatchRecord) -> Result<(), RecordError> {
        self.add(record.clone())?;
        Ok(())
    }
}
