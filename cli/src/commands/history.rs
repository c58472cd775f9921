use anyhow::Result;

use rpsense_config::RpsenseConfig;

use super::open_history;

pub fn run(config: &RpsenseConfig, player: Option<&str>, limit: usize) -> Result<()> {
    let history = open_history(config);

    let (matches, win_rate) = match player {
        Some(player) => (history.for_player(player), history.player_win_rate(player)),
        None => (history.recent(history.len()), history.win_rate()),
    };

    if matches.is_empty() {
        println!("No matches recorded yet.");
        return Ok(());
    }

    for stored in matches.iter().take(limit) {
        let record = &stored.record;

        println!(
            "#{:<4} {}  {:<12} {:<10} {:>2}-{:<2} ({} draws, {} rounds, streak {})  {}",
            stored.id,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.player_id,
            record.mode,
            record.player_wins,
            record.computer_wins,
            record.draws,
            record.total_rounds,
            record.win_streak,
            record.model_label,
        );
    }

    println!("{} matches, {win_rate:.1}% of decided rounds won", matches.len());

    Ok(())
}
