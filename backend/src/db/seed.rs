use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;

use crate::db::{SignalStore, SqliteStore};
use crate::models::{SelectedPlayer, SquadSubmission, SubstitutionVote, VoteType};

pub const SEED_MATCH_ID: i64 = 1;
pub const SEED_TEAM_ID: i64 = 10;

// (id, name, position, shirt number, rating)
const ROSTER: &[(i64, &str, &str, u32, f64)] = &[
    (1, "Alisson Prado", "GK", 1, 7.1),
    (2, "Tomás Reyes", "RB", 2, 6.8),
    (3, "Kofi Mensah", "LB", 3, 6.9),
    (4, "Lars Eriksen", "CB", 4, 7.3),
    (5, "Yusuf Demir", "CB", 5, 7.0),
    (6, "Marco Bellini", "CDM", 6, 7.2),
    (7, "Jadon Price", "RW", 7, 7.4),
    (8, "Hugo Lefebvre", "CM", 8, 7.0),
    (9, "Diego Santos", "ST", 9, 7.8),
    (10, "Ren Takahashi", "CAM", 10, 7.6),
    (11, "Nico Varga", "LW", 11, 7.1),
    (14, "Ola Johansson", "ST", 14, 6.9),
    (16, "Sami Haddad", "CM", 16, 6.7),
    (20, "Elias Brandt", "CAM", 20, 6.6),
];

// formation slot -> player id for the consensus XI
const BASE_XI: &[(&str, i64)] = &[
    ("GK", 1),
    ("RB", 2),
    ("CB1", 4),
    ("CB2", 5),
    ("LB", 3),
    ("CDM", 6),
    ("CM", 8),
    ("CAM", 10),
    ("RW", 7),
    ("ST", 9),
    ("LW", 11),
];

fn roster_player(player_id: i64) -> SelectedPlayer {
    let (id, name, position, number, rating) = ROSTER
        .iter()
        .copied()
        .find(|(id, ..)| *id == player_id)
        .unwrap_or((player_id, "Unknown", "MID", 0, 6.0));
    SelectedPlayer {
        player_id: id,
        name: Some(name.to_string()),
        position: position.to_string(),
        number: Some(number),
        rating: Some(rating),
    }
}

/// Consensus XI with the given (slot, player id) overrides applied.
fn lineup_with(overrides: &[(&str, i64)]) -> BTreeMap<String, SelectedPlayer> {
    BASE_XI
        .iter()
        .map(|(slot, id)| {
            let id = overrides
                .iter()
                .find(|(s, _)| s == slot)
                .map_or(*id, |(_, replacement)| *replacement);
            (slot.to_string(), roster_player(id))
        })
        .collect()
}

pub async fn seed_data(store: &SqliteStore) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM squad_submissions")
        .fetch_one(store.pool())
        .await?;

    if count > 0 {
        tracing::info!("Database already seeded ({} submissions found), skipping.", count);
        return Ok(());
    }

    tracing::info!("Seeding database with crowd lineups for match {}...", SEED_MATCH_ID);

    seed_submissions(store).await?;
    seed_votes(store).await?;

    tracing::info!("Database seeded successfully.");
    Ok(())
}

async fn seed_submissions(store: &SqliteStore) -> Result<()> {
    let now = Utc::now();

    // 7 keep the striker, 3 swap him for the backup striker, 2 drop him for an extra playmaker.
    let mut lineups: Vec<BTreeMap<String, SelectedPlayer>> = Vec::new();
    for i in 0..7 {
        if i % 3 == 0 {
            lineups.push(lineup_with(&[("CM", 16)]));
        } else {
            lineups.push(lineup_with(&[]));
        }
    }
    for _ in 0..3 {
        lineups.push(lineup_with(&[("ST", 14)]));
    }
    for _ in 0..2 {
        lineups.push(lineup_with(&[("ST", 20)]));
    }

    for (i, slots) in lineups.into_iter().enumerate() {
        let submission = SquadSubmission {
            id: format!("seed-{}-{}-{:02}", SEED_MATCH_ID, SEED_TEAM_ID, i),
            match_id: SEED_MATCH_ID,
            team_id: SEED_TEAM_ID,
            user_id: format!("crowd-{:02}", i),
            formation: "4-2-3-1".to_string(),
            slots,
            created_at: now - Duration::minutes(i as i64),
        };
        store.insert_submission(&submission).await?;
    }

    Ok(())
}

async fn seed_votes(store: &SqliteStore) -> Result<()> {
    let now = Utc::now();

    // (user, player, vote type, replacement)
    let votes: &[(&str, i64, VoteType, Option<i64>)] = &[
        ("crowd-01", 9, VoteType::Out, Some(14)),
        ("crowd-02", 9, VoteType::Out, Some(14)),
        ("crowd-03", 9, VoteType::Out, None),
        ("crowd-04", 9, VoteType::In, None),
        ("crowd-05", 8, VoteType::Out, Some(16)),
        ("crowd-06", 16, VoteType::In, None),
        ("crowd-07", 16, VoteType::In, None),
        ("crowd-08", 16, VoteType::In, None),
    ];

    for (user, player_id, vote_type, replacement) in votes {
        store
            .upsert_vote(&SubstitutionVote {
                match_id: SEED_MATCH_ID,
                team_id: SEED_TEAM_ID,
                user_id: user.to_string(),
                player_id: *player_id,
                vote_type: *vote_type,
                replacement_player_id: *replacement,
                updated_at: now,
            })
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_store;
    use crate::services::ReplacementRanker;

    #[tokio::test]
    async fn test_seed_reproduces_crowd_scenario() {
        let store = memory_store().await;
        seed_data(&store).await.unwrap();
        seed_data(&store).await.unwrap(); // second run is a no-op

        let submissions = store.list_squad_submissions(SEED_MATCH_ID, SEED_TEAM_ID).await.unwrap();
        assert_eq!(submissions.len(), 12);

        let signal = ReplacementRanker::new(10).rank_submissions(&submissions, 9, "ST", &[]);
        assert_eq!(signal.replacement_percentage, 42);
        assert_eq!(signal.top_replacements[0].player_id, 14);
        assert_eq!(signal.top_replacements[0].name, "Ola Johansson");
        assert_eq!(signal.top_replacements[0].percentage, 25);
    }
}
