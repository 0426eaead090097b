pub mod seed;
pub use seed::seed_data;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::*;

/// Persistent store holding crowd submissions and substitution votes.
///
/// Everything the engine reads or writes goes through this seam, so the
/// computation layer stays independent of the transport behind it.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn list_squad_submissions(
        &self,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Result<Vec<SquadSubmission>, StoreError>;

    async fn list_votes(&self, match_id: MatchId, team_id: TeamId) -> Result<Vec<SubstitutionVote>, StoreError>;

    async fn list_user_votes(&self, match_id: MatchId, user_id: &str) -> Result<Vec<SubstitutionVote>, StoreError>;

    /// Insert or overwrite the vote identified by `vote.key()`.
    async fn upsert_vote(&self, vote: &SubstitutionVote) -> Result<(), StoreError>;

    async fn delete_vote(&self, key: &VoteKey) -> Result<(), StoreError>;

    /// Server-side tally, if the store offers one. `Ok(None)` means the
    /// caller has to aggregate raw rows itself.
    async fn aggregate_votes(
        &self,
        _match_id: MatchId,
        _team_id: TeamId,
    ) -> Result<Option<Vec<VoteSummary>>, StoreError> {
        Ok(None)
    }
}

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<()> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await
}

/// Called from the server so schema creation shares the main pool.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS squad_submissions (
            id TEXT PRIMARY KEY,
            match_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            formation TEXT NOT NULL,
            slots TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS substitution_votes (
            id TEXT PRIMARY KEY,
            match_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            vote_type TEXT NOT NULL CHECK (vote_type IN ('out', 'in')),
            replacement_player_id INTEGER,
            updated_at TEXT NOT NULL,
            UNIQUE (match_id, user_id, player_id, vote_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_match_team ON squad_submissions(match_id, team_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_match_team ON substitution_votes(match_id, team_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

/// `SignalStore` backed by the local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_submission(&self, submission: &SquadSubmission) -> Result<(), StoreError> {
        let slots = serde_json::to_string(&submission.slots)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO squad_submissions
            (id, match_id, team_id, user_id, formation, slots, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&submission.id)
        .bind(submission.match_id)
        .bind(submission.team_id)
        .bind(&submission.user_id)
        .bind(&submission.formation)
        .bind(slots)
        .bind(submission.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SignalStore for SqliteStore {
    async fn list_squad_submissions(
        &self,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Result<Vec<SquadSubmission>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM squad_submissions WHERE match_id = ? AND team_id = ? ORDER BY created_at, id",
        )
        .bind(match_id)
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        let mut submissions = Vec::with_capacity(rows.len());
        for row in rows {
            submissions.push(SquadSubmission {
                id: row.try_get("id")?,
                match_id: row.try_get("match_id")?,
                team_id: row.try_get("team_id")?,
                user_id: row.try_get("user_id")?,
                formation: row.try_get("formation")?,
                slots: serde_json::from_str(&row.try_get::<String, _>("slots")?)?,
                created_at: parse_timestamp(&row, "created_at")?,
            });
        }

        Ok(submissions)
    }

    async fn list_votes(&self, match_id: MatchId, team_id: TeamId) -> Result<Vec<SubstitutionVote>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM substitution_votes WHERE match_id = ? AND team_id = ? ORDER BY updated_at, id",
        )
        .bind(match_id)
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn list_user_votes(&self, match_id: MatchId, user_id: &str) -> Result<Vec<SubstitutionVote>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM substitution_votes WHERE match_id = ? AND user_id = ? ORDER BY updated_at, id",
        )
        .bind(match_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn upsert_vote(&self, vote: &SubstitutionVote) -> Result<(), StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"INSERT INTO substitution_votes
               (id, match_id, team_id, user_id, player_id, vote_type, replacement_player_id, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(match_id, user_id, player_id, vote_type) DO UPDATE SET
                   team_id               = excluded.team_id,
                   replacement_player_id = excluded.replacement_player_id,
                   updated_at            = excluded.updated_at"#,
        )
        .bind(id)
        .bind(vote.match_id)
        .bind(vote.team_id)
        .bind(&vote.user_id)
        .bind(vote.player_id)
        .bind(vote.vote_type.as_str())
        .bind(vote.replacement_player_id)
        .bind(vote.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_vote(&self, key: &VoteKey) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM substitution_votes WHERE match_id = ? AND user_id = ? AND player_id = ? AND vote_type = ?",
        )
        .bind(key.match_id)
        .bind(&key.user_id)
        .bind(key.player_id)
        .bind(key.vote_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn aggregate_votes(
        &self,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Result<Option<Vec<VoteSummary>>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT player_id,
                      SUM(CASE WHEN vote_type = 'out' THEN 1 ELSE 0 END) AS out_votes,
                      SUM(CASE WHEN vote_type = 'in'  THEN 1 ELSE 0 END) AS in_votes
               FROM substitution_votes
               WHERE match_id = ? AND team_id = ?
               GROUP BY player_id
               ORDER BY player_id"#,
        )
        .bind(match_id)
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(VoteSummary::from_counts(
                row.try_get("player_id")?,
                count_column(&row, "out_votes")?,
                count_column(&row, "in_votes")?,
            ));
        }

        Ok(Some(summaries))
    }
}

fn vote_from_row(row: &SqliteRow) -> Result<SubstitutionVote, StoreError> {
    let raw_type: String = row.try_get("vote_type")?;
    let vote_type = VoteType::parse(&raw_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown vote_type {:?}", raw_type)))?;

    Ok(SubstitutionVote {
        match_id: row.try_get("match_id")?,
        team_id: row.try_get("team_id")?,
        user_id: row.try_get("user_id")?,
        player_id: row.try_get("player_id")?,
        vote_type,
        replacement_player_id: row.try_get("replacement_player_id")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.try_get(column)?;
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

fn count_column(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, raw)))
}

/// Fresh in-memory database with the schema applied, for tests.
#[cfg(test)]
pub async fn memory_store() -> SqliteStore {
    // One connection: every new connection to `sqlite::memory:` is a separate database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_database_with_pool(&pool).await.expect("schema");
    SqliteStore::new(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregate_locally;
    use std::collections::BTreeMap;

    fn vote(user: &str, player: PlayerId, vote_type: VoteType, replacement: Option<PlayerId>) -> SubstitutionVote {
        SubstitutionVote {
            match_id: 1,
            team_id: 10,
            user_id: user.to_string(),
            player_id: player,
            vote_type,
            replacement_player_id: replacement,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_submission_round_trip_keeps_slots() {
        let store = memory_store().await;
        let mut slots = BTreeMap::new();
        slots.insert(
            "ST".to_string(),
            SelectedPlayer {
                player_id: 9,
                name: Some("Striker".to_string()),
                position: "ST".to_string(),
                number: Some(9),
                rating: Some(7.5),
            },
        );
        let submission = SquadSubmission {
            id: "s1".to_string(),
            match_id: 1,
            team_id: 10,
            user_id: "u1".to_string(),
            formation: "4-3-3".to_string(),
            slots,
            created_at: Utc::now(),
        };
        store.insert_submission(&submission).await.unwrap();

        let fetched = store.list_squad_submissions(1, 10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].slots, submission.slots);
        assert!(store.list_squad_submissions(1, 11).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_key() {
        let store = memory_store().await;
        store.upsert_vote(&vote("u1", 9, VoteType::Out, None)).await.unwrap();
        store.upsert_vote(&vote("u1", 9, VoteType::Out, Some(14))).await.unwrap();

        let votes = store.list_votes(1, 10).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].replacement_player_id, Some(14));
    }

    #[tokio::test]
    async fn test_delete_vote_by_key() {
        let store = memory_store().await;
        let v = vote("u1", 9, VoteType::In, None);
        store.upsert_vote(&v).await.unwrap();
        store.upsert_vote(&vote("u2", 9, VoteType::In, None)).await.unwrap();
        store.delete_vote(&v.key()).await.unwrap();

        let remaining = store.list_votes(1, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "u2");
        assert!(store.list_user_votes(1, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_aggregation_matches_local_aggregation() {
        let store = memory_store().await;
        let votes = vec![
            vote("u1", 9, VoteType::Out, Some(14)),
            vote("u2", 9, VoteType::Out, None),
            vote("u3", 9, VoteType::In, None),
            vote("u1", 7, VoteType::In, None),
            vote("u2", 7, VoteType::In, None),
            vote("u4", 11, VoteType::Out, Some(20)),
            vote("u4", 11, VoteType::Out, Some(21)), // overwrite, not a second vote
        ];
        for v in &votes {
            store.upsert_vote(v).await.unwrap();
        }

        let server = store.aggregate_votes(1, 10).await.unwrap().unwrap();
        let local = aggregate_locally(&store.list_votes(1, 10).await.unwrap());
        assert_eq!(server, local);
        assert_eq!(server.len(), 3);
    }
}
