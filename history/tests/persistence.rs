//! Match history against real files.

use std::fs;

use chrono::{DateTime, Utc};

use rpsense_history::{MatchHistory, StoredMatch};
use rpsense_session::{GameMode, MatchRecord, MatchRecorder};

fn record(player_id: &str, player_wins: u32) -> MatchRecord {
    MatchRecord {
        player_id: player_id.into(),
        model_label: "MobileNetV2".into(),
        total_rounds: 1,
        timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        player_wins,
        computer_wins: 1 - player_wins,
        draws: 0,
        win_streak: player_wins,
        mode: GameMode::Classic,
    }
}

#[test]
fn survives_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("history.json");

    let history = MatchHistory::load(path.clone(), 100);
    assert!(history.is_empty());

    history.add(record("ana", 1)).unwrap();
    history.add(record("bo", 0)).unwrap();

    let reloaded = MatchHistory::load(path.clone(), 100);
    let matches: Vec<StoredMatch> = reloaded.recent(10);

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].record.player_id, "bo");
    assert_eq!(matches[1].record, record("ana", 1));

    // Ids keep increasing after a reload.
    assert_eq!(reloaded.add(record("carl", 1)).unwrap().id, 3);

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("\"playerWins\""));
}

#[test]
fn corrupt_file_starts_empty_and_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    fs::write(&path, "{ not json").unwrap();

    let history = MatchHistory::load(path.clone(), 100);
    assert!(history.is_empty());

    history.add(record("ana", 1)).unwrap();
    assert_eq!(MatchHistory::load(path, 100).len(), 1);
}

#[test]
fn cap_applies_to_loaded_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let history = MatchHistory::load(path.clone(), 10);
    for _ in 0..5 {
        history.add(record("ana", 1)).unwrap();
    }

    let smaller = MatchHistory::load(path, 2);
    assert_eq!(smaller.len(), 2);
    assert_eq!(smaller.recent(1)[0].id, 5);
}

#[test]
fn records_through_the_session_seam() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let mut recorder = MatchHistory::load(path.clone(), 100);
    recorder.record(&record("ana", 1)).unwrap();

    let history = MatchHistory::load(path, 100);
    assert_eq!(history.for_player("ANA").len(), 1);
    assert_eq!(history.win_rate(), 100.0);
}

#[test]
fn unwritable_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    // A directory can't be opened as a file.
    let history = MatchHistory::load(dir.path().to_path_buf(), 100);

    assert!(history.add(record("ana", 1)).is_err());

    // Nothing that failed to reach the disk shows up in memory.
    assert!(history.is_empty());
    assert!(history.recent(10).is_empty());
}

#[test]
fn failed_removal_keeps_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let history = MatchHistory::load(path.clone(), 100);
    let stored = history.add(record("ana", 1)).unwrap();

    // Swap the file for a directory so the next write fails.
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();

    assert!(history.remove(stored.id).is_err());
    assert!(history.clear().is_err());
    assert_eq!(history.recent(10), vec![stored]);
}
