//! Round tallies and the match summary built from them.

use chrono::{DateTime, Utc};

use crate::{GameMode, MatchRecord, MatchSetup, RoundVerdict, Winner};

/// Running totals. Exactly one counter moves per applied verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scoreboard {
    pub player: u32,
    pub computer: u32,
    pub draws: u32,
}

impl Scoreboard {
    pub fn apply_verdict(&mut self, verdict: &RoundVerdict) {
        match verdict.winner {
            Winner::Player => self.player += 1,
            Winner::Computer => self.computer += 1,
            Winner::Draw => self.draws += 1,
        }
    }

    pub fn rounds_scored(&self) -> u32 {
        self.player + self.computer + self.draws
    }

    /// Streak credit for the match. Derived from the final totals rather than from
    /// consecutive wins: a player who finishes ahead is credited with all of their wins.
    pub fn win_streak(&self) -> u32 {
        if self.player > self.computer {
            self.player
        } else {
            0
        }
    }

    /// Builds the one summary record for a finished match.
    pub fn finalize_match(&self, setup: &MatchSetup, model_label: &str, timestamp: DateTime<Utc>) -> MatchRecord {
        let total_rounds = match setup.mode {
            GameMode::Classic => 1,
            GameMode::Tournament => setup.total_rounds,
        };

        MatchRecord {
            player_id: setup.player_id.clone(),
            model_label: model_label.to_string(),
            total_rounds,
            timestamp,
            player_wins: self.player,
            computer_wins: self.computer,
            draws: self.draws,
            win_streak: self.win_streak(),
            mode: setup.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Move;

    fn verdict(winner: Winner) -> RoundVerdict {
        RoundVerdict {
            player_move: Move::Rock,
            computer_move: Move::Scissors,
            winner,
            confidence: 0.9,
            is_fallback: false,
        }
    }

    #[test]
    fn one_counter_per_verdict() {
        let mut score = Scoreboard::default();

        score.apply_verdict(&verdict(Winner::Draw));
        assert_eq!(score, Scoreboard { player: 0, computer: 0, draws: 1 });

        score.apply_verdict(&verdict(Winner::Computer));
        assert_eq!(score.rounds_scored(), 2);
    }

    #[test]
    fn tournament_summary() {
        let setup = MatchSetup::tournament("ana", 5).unwrap();
        let mut score = Scoreboard::default();

        for winner in [Winner::Player, Winner::Computer, Winner::Draw, Winner::Player, Winner::Player] {
            score.apply_verdict(&verdict(winner));
        }

        let timestamp = Utc::now();
        let record = score.finalize_match(&setup, "MobileNetV2", timestamp);

        assert_eq!(record.player_wins, 3);
        assert_eq!(record.computer_wins, 1);
        assert_eq!(record.draws, 1);
        assert_eq!(record.win_streak, 3);
        assert_eq!(record.total_rounds, 5);
        assert_eq!(record.timestamp, timestamp);
    }

    #[test]
    fn losing_or_tied_match_has_no_streak() {
        let score = Scoreboard { player: 2, computer: 2, draws: 1 };
        assert_eq!(score.win_streak(), 0);

        let score = Scoreboard { player: 0, computer: 1, draws: 0 };
        let record = score.finalize_match(&MatchSetup::classic("ana"), "MobileNetV2", Utc::now());
        assert_eq!(record.total_rounds, 1);
        assert_eq!(record.win_streak, 0);
    }
}
