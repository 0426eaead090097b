use anyhow::Result;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::{create_pool, init_database_with_pool, seed_data, SqliteStore};
use crate::models::{MatchId, PlayerId, SelectedPlayer, TeamId, UserLineup};
use crate::services::{indicator_color, CommunitySignalEngine, SignalRequest, DEFAULT_MOST_WANTED_LIMIT};

async fn open_engine(config: &EngineConfig) -> Result<CommunitySignalEngine<SqliteStore>> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(CommunitySignalEngine::new(Arc::new(SqliteStore::new(pool)), config))
}

pub async fn seed(config: &EngineConfig) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;

    println!("🌱 Seeding crowd lineups and votes...");
    seed_data(&SqliteStore::new(pool)).await?;
    println!("✅ Seed complete! Try: squadsignal signal --match-id 1 --team-id 10 --player-id 9 --position ST");

    Ok(())
}

/// Build a lineup from bare player ids; positions are irrelevant to compatibility.
fn lineup_from_ids(ids: &[PlayerId]) -> UserLineup {
    UserLineup {
        slots: ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                (
                    format!("slot-{:02}", i + 1),
                    SelectedPlayer {
                        player_id: *id,
                        name: None,
                        position: String::new(),
                        number: None,
                        rating: None,
                    },
                )
            })
            .collect(),
    }
}

pub async fn show_signal(
    config: &EngineConfig,
    match_id: MatchId,
    team_id: TeamId,
    player_id: PlayerId,
    position: &str,
    lineup: &[PlayerId],
    formation: &str,
) -> Result<()> {
    let engine = open_engine(config).await?;

    println!("🔍 Community signal for player {} ({}) in match {}...", player_id, position, match_id);

    let signal = engine
        .community_signal(&SignalRequest {
            match_id,
            team_id,
            player_id,
            position: position.to_string(),
            lineup: lineup_from_ids(lineup),
            formation: formation.to_string(),
            available_players: Vec::new(),
        })
        .await;

    let r = &signal.replacement;
    if !r.has_sufficient_data {
        let needed = config.min_sample_size.saturating_sub(r.sample_size);
        println!("📭 Not enough community data yet ({} lineups, {} more needed)", r.sample_size, needed);
        return Ok(());
    }

    println!("   Lineup compatibility:       {}%", signal.lineup_compatibility);
    println!("   Keep-player score:          {}%", r.compatibility_score);
    println!("   Crowd replaced this player: {}% of {} lineups", r.replacement_percentage, r.sample_size);

    if r.top_replacements.is_empty() {
        println!("   No same-position alternative stood out.");
    } else {
        println!("\n🔁 Top replacements:");
        for (i, suggestion) in r.top_replacements.iter().enumerate() {
            println!(
                "{}. {}{} ({}) - {}% ({} lineups)",
                i + 1,
                suggestion.name,
                suggestion.number.map_or(String::new(), |n| format!(" #{}", n)),
                suggestion.position,
                suggestion.percentage,
                suggestion.count
            );
        }
    }

    Ok(())
}

pub async fn show_votes(config: &EngineConfig, match_id: MatchId, team_id: TeamId) -> Result<()> {
    let engine = open_engine(config).await?;

    println!("🗳️  Substitution votes for match {} / team {}:", match_id, team_id);

    let summaries = engine.match_vote_summary(match_id, team_id).await;
    if summaries.is_empty() {
        println!("📭 No votes yet.");
        return Ok(());
    }

    for summary in &summaries {
        let marker = match indicator_color(Some(summary)) {
            Some(crate::models::ColorHint::WantsOut) => "🔴 wants out",
            Some(crate::models::ColorHint::WantsIn) => "🟢 wants in",
            None => "",
        };
        println!(
            "   • Player {}: {} out / {} in (net {:+}) {}",
            summary.player_id, summary.out_votes, summary.in_votes, summary.net_sentiment, marker
        );
    }

    let wanted = engine
        .most_wanted_substitutions(match_id, team_id, DEFAULT_MOST_WANTED_LIMIT)
        .await;
    if !wanted.is_empty() {
        println!("\n🎯 Most-wanted substitutions:");
        for (i, summary) in wanted.iter().enumerate() {
            println!("{}. Player {} (net {:+})", i + 1, summary.player_id, summary.net_sentiment);
        }
    }

    let staged = engine.staged_votes(match_id);
    if !staged.is_empty() {
        println!("\n⏳ {} vote(s) staged locally, flushing...", staged.len());
        let report = engine.flush_staged_votes(match_id).await;
        println!("   {} sent, {} still staged", report.submitted, report.remaining);
    }

    Ok(())
}
