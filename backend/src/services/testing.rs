//! In-memory `SignalStore` doubles and fixture builders for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::db::SignalStore;
use crate::error::StoreError;
use crate::models::*;
use crate::services::aggregate_locally;

#[derive(Default)]
pub struct MemoryStore {
    submissions: Mutex<Vec<SquadSubmission>>,
    votes: Mutex<Vec<SubstitutionVote>>,
    server_aggregation: bool,
    submission_fetches: AtomicUsize,
    aggregation_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn with_aggregation() -> Self {
        Self {
            server_aggregation: true,
            ..Self::default()
        }
    }

    pub fn add_submission(&self, submission: SquadSubmission) {
        self.submissions.lock().unwrap().push(submission);
    }

    pub fn votes(&self) -> Vec<SubstitutionVote> {
        self.votes.lock().unwrap().clone()
    }

    pub fn submission_fetches(&self) -> usize {
        self.submission_fetches.load(Ordering::SeqCst)
    }

    pub fn aggregation_calls(&self) -> usize {
        self.aggregation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn list_squad_submissions(
        &self,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Result<Vec<SquadSubmission>, StoreError> {
        self.submission_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.match_id == match_id && s.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn list_votes(&self, match_id: MatchId, team_id: TeamId) -> Result<Vec<SubstitutionVote>, StoreError> {
        Ok(self
            .votes
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.match_id == match_id && v.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn list_user_votes(&self, match_id: MatchId, user_id: &str) -> Result<Vec<SubstitutionVote>, StoreError> {
        Ok(self
            .votes
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.match_id == match_id && v.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_vote(&self, vote: &SubstitutionVote) -> Result<(), StoreError> {
        let mut votes = self.votes.lock().unwrap();
        let key = vote.key();
        match votes.iter_mut().find(|v| v.key() == key) {
            Some(existing) => *existing = vote.clone(),
            None => votes.push(vote.clone()),
        }
        Ok(())
    }

    async fn delete_vote(&self, key: &VoteKey) -> Result<(), StoreError> {
        self.votes.lock().unwrap().retain(|v| &v.key() != key);
        Ok(())
    }

    async fn aggregate_votes(
        &self,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Result<Option<Vec<VoteSummary>>, StoreError> {
        if !self.server_aggregation {
            return Ok(None);
        }
        self.aggregation_calls.fetch_add(1, Ordering::SeqCst);
        let votes = self.list_votes(match_id, team_id).await?;
        Ok(Some(aggregate_locally(&votes)))
    }
}

/// A store that is never reachable.
pub struct FailingStore;

fn offline() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl SignalStore for FailingStore {
    async fn list_squad_submissions(&self, _: MatchId, _: TeamId) -> Result<Vec<SquadSubmission>, StoreError> {
        Err(offline())
    }

    async fn list_votes(&self, _: MatchId, _: TeamId) -> Result<Vec<SubstitutionVote>, StoreError> {
        Err(offline())
    }

    async fn list_user_votes(&self, _: MatchId, _: &str) -> Result<Vec<SubstitutionVote>, StoreError> {
        Err(offline())
    }

    async fn upsert_vote(&self, _: &SubstitutionVote) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn delete_vote(&self, _: &VoteKey) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn aggregate_votes(&self, _: MatchId, _: TeamId) -> Result<Option<Vec<VoteSummary>>, StoreError> {
        Err(offline())
    }
}

fn selected(player_id: PlayerId, position: &str) -> SelectedPlayer {
    SelectedPlayer {
        player_id,
        name: None,
        position: position.to_string(),
        number: None,
        rating: None,
    }
}

/// Submission for match 1 / team 10 with explicit (player, position) pairs.
pub fn submission_with(index: usize, players: &[(PlayerId, &str)]) -> SquadSubmission {
    let slots: BTreeMap<String, SelectedPlayer> = players
        .iter()
        .enumerate()
        .map(|(slot, (id, position))| (format!("slot-{:02}", slot), selected(*id, position)))
        .collect();
    SquadSubmission {
        id: format!("sub-{}", index),
        match_id: 1,
        team_id: 10,
        user_id: format!("user-{}", index),
        formation: "4-3-3".to_string(),
        slots,
        created_at: Utc::now(),
    }
}

/// Submission where every listed player shares one position label.
pub fn submission(index: usize, ids: &[PlayerId], position: &str) -> SquadSubmission {
    let players: Vec<(PlayerId, &str)> = ids.iter().map(|id| (*id, position)).collect();
    submission_with(index, &players)
}

pub fn lineup(ids: &[PlayerId]) -> UserLineup {
    UserLineup {
        slots: ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (format!("slot-{:02}", slot), selected(*id, "MID")))
            .collect(),
    }
}

pub fn available(player_id: PlayerId, name: &str, position: &str, number: Option<u32>) -> AvailablePlayer {
    AvailablePlayer {
        player_id,
        name: name.to_string(),
        position: position.to_string(),
        number,
        rating: None,
    }
}

/// Vote on match 1 / team 10.
pub fn vote(user: &str, player_id: PlayerId, vote_type: VoteType, replacement: Option<PlayerId>) -> SubstitutionVote {
    SubstitutionVote {
        match_id: 1,
        team_id: 10,
        user_id: user.to_string(),
        player_id,
        vote_type,
        replacement_player_id: replacement,
        updated_at: Utc::now(),
    }
}
