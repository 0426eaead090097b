use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::db::SignalStore;
use crate::error::{StoreError, VoteError};
use crate::models::{
    ColorHint, FlushReport, MatchId, PlayerId, SubstitutionVote, TeamId, VoteKey, VoteOutcome, VoteSummary, VoteType,
};
use crate::services::cache::{vote_summary_key, ResultCache};

/// Fewer total votes than this never light an indicator.
pub const MIN_VOTES_FOR_INDICATOR: u32 = 3;
/// Net sentiment must exceed this magnitude to signal either way.
pub const SENTIMENT_THRESHOLD: i64 = 5;
pub const DEFAULT_MOST_WANTED_LIMIT: usize = 3;

/// Tally raw vote rows per player, ordered by player id.
pub fn aggregate_locally(votes: &[SubstitutionVote]) -> Vec<VoteSummary> {
    let mut counts: BTreeMap<PlayerId, (u32, u32)> = BTreeMap::new();
    for vote in votes {
        let entry = counts.entry(vote.player_id).or_default();
        match vote.vote_type {
            VoteType::Out => entry.0 += 1,
            VoteType::In => entry.1 += 1,
        }
    }
    counts
        .into_iter()
        .map(|(player_id, (out_votes, in_votes))| VoteSummary::from_counts(player_id, out_votes, in_votes))
        .collect()
}

pub fn indicator_color(summary: Option<&VoteSummary>) -> Option<ColorHint> {
    let summary = summary?;
    if summary.total_votes() < MIN_VOTES_FOR_INDICATOR {
        return None;
    }
    if summary.net_sentiment > SENTIMENT_THRESHOLD {
        Some(ColorHint::WantsOut)
    } else if summary.net_sentiment < -SENTIMENT_THRESHOLD {
        Some(ColorHint::WantsIn)
    } else {
        None
    }
}

/// Players the crowd most wants taken off: positive net sentiment, strongest first.
pub fn most_wanted(summaries: &[VoteSummary], limit: usize) -> Vec<VoteSummary> {
    let mut wanted: Vec<VoteSummary> = summaries.iter().filter(|s| s.net_sentiment > 0).cloned().collect();
    wanted.sort_by(|a, b| b.net_sentiment.cmp(&a.net_sentiment));
    wanted.truncate(limit);
    wanted
}

pub fn validate_key(key: &VoteKey) -> Result<(), VoteError> {
    if key.match_id <= 0 {
        return Err(VoteError::Validation(format!("match id must be positive, got {}", key.match_id)));
    }
    if key.player_id <= 0 {
        return Err(VoteError::Validation(format!("player id must be positive, got {}", key.player_id)));
    }
    if key.user_id.trim().is_empty() {
        return Err(VoteError::Validation("user id is required".to_string()));
    }
    Ok(())
}

pub fn validate_vote(vote: &SubstitutionVote) -> Result<(), VoteError> {
    validate_key(&vote.key())?;
    if vote.team_id <= 0 {
        return Err(VoteError::Validation(format!("team id must be positive, got {}", vote.team_id)));
    }
    if let Some(replacement) = vote.replacement_player_id {
        if vote.vote_type != VoteType::Out {
            return Err(VoteError::Validation("only 'out' votes can name a replacement".to_string()));
        }
        if replacement == vote.player_id {
            return Err(VoteError::Validation("a player cannot replace themselves".to_string()));
        }
        if replacement <= 0 {
            return Err(VoteError::Validation(format!("replacement id must be positive, got {}", replacement)));
        }
    }
    Ok(())
}

// ── Local staging ─────────────────────────────────────────────────────────────

type StagedLists = HashMap<MatchId, Vec<SubstitutionVote>>;

/// Per-match list of votes waiting for the store to come back.
///
/// Optionally mirrored to a JSON file so staged votes survive a restart.
pub struct VoteStaging {
    path: Option<PathBuf>,
    lists: Mutex<StagedLists>,
    // Taken before `lists` when mirroring, so file writes land in snapshot order.
    file: Mutex<()>,
}

impl VoteStaging {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            lists: Mutex::new(HashMap::new()),
            file: Mutex::new(()),
        }
    }

    /// Load any previously staged votes from `path`; a missing or unreadable file starts empty.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lists = load_staging_file(&path).unwrap_or_default();
        Self {
            path: Some(path),
            lists: Mutex::new(lists),
            file: Mutex::new(()),
        }
    }

    fn lock_lists(&self) -> std::sync::MutexGuard<'_, StagedLists> {
        self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a vote, replacing any staged vote with the same (player, vote type).
    pub fn stage(&self, vote: SubstitutionVote) {
        {
            let mut lists = self.lock_lists();
            let list = lists.entry(vote.match_id).or_default();
            match list
                .iter_mut()
                .find(|v| v.player_id == vote.player_id && v.vote_type == vote.vote_type)
            {
                Some(existing) => *existing = vote,
                None => list.push(vote),
            }
        }
        self.persist();
    }

    pub fn staged(&self, match_id: MatchId) -> Vec<SubstitutionVote> {
        self.lock_lists().get(&match_id).cloned().unwrap_or_default()
    }

    /// Drop the votes that reached the store. Anything staged after the flush
    /// took its snapshot, or re-staged with new content, is left in place.
    /// Returns how many votes are still staged for the match.
    fn remove_sent(&self, match_id: MatchId, sent: &[SubstitutionVote]) -> usize {
        let remaining = {
            let mut lists = self.lock_lists();
            let remaining = match lists.get_mut(&match_id) {
                Some(list) => {
                    list.retain(|v| !sent.contains(v));
                    list.len()
                }
                None => 0,
            };
            if remaining == 0 {
                lists.remove(&match_id);
            }
            remaining
        };
        self.persist();
        remaining
    }

    fn persist(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let _file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = serde_json::to_string_pretty(&*self.lock_lists());
        let result = snapshot
            .map_err(anyhow::Error::from)
            .and_then(|json| write_staging_file(path, &json));
        if let Err(e) = result {
            tracing::warn!("Failed to persist staged votes to {}: {}", path.display(), e);
        }
    }
}

fn load_staging_file(path: &Path) -> Option<StagedLists> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(lists) => Some(lists),
        Err(e) => {
            tracing::warn!("Ignoring unreadable staging file {}: {}", path.display(), e);
            None
        }
    }
}

fn write_staging_file(path: &Path, json: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, json)?;
    Ok(())
}

// ── Aggregator ────────────────────────────────────────────────────────────────

/// Tallies live substitution votes and owns the vote write path.
pub struct VoteAggregator {
    cache: ResultCache<Vec<VoteSummary>>,
    staging: VoteStaging,
}

impl VoteAggregator {
    pub fn new(cache: ResultCache<Vec<VoteSummary>>, staging: VoteStaging) -> Self {
        Self { cache, staging }
    }

    /// One summary per player with at least one vote. Store failures read as "no votes".
    pub async fn match_vote_summary<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Vec<VoteSummary> {
        let key = vote_summary_key(match_id, team_id);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        match self.fetch_summaries(store, match_id, team_id).await {
            Ok(summaries) => {
                self.cache.set(key, summaries.clone());
                summaries
            }
            Err(e) => {
                tracing::warn!("Vote summary unavailable for match {} team {}: {}", match_id, team_id, e);
                Vec::new()
            }
        }
    }

    async fn fetch_summaries<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        team_id: TeamId,
    ) -> Result<Vec<VoteSummary>, StoreError> {
        match store.aggregate_votes(match_id, team_id).await {
            Ok(Some(summaries)) => return Ok(summaries),
            Ok(None) => {}
            Err(e) => tracing::debug!("Server-side vote aggregation failed, tallying locally: {}", e),
        }
        let votes = store.list_votes(match_id, team_id).await?;
        Ok(aggregate_locally(&votes))
    }

    pub async fn player_vote_summary<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        team_id: TeamId,
        player_id: PlayerId,
    ) -> Option<VoteSummary> {
        self.match_vote_summary(store, match_id, team_id)
            .await
            .into_iter()
            .find(|s| s.player_id == player_id)
    }

    pub async fn most_wanted_substitutions<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        team_id: TeamId,
        limit: usize,
    ) -> Vec<VoteSummary> {
        most_wanted(&self.match_vote_summary(store, match_id, team_id).await, limit)
    }

    pub async fn user_votes<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        user_id: &str,
    ) -> Vec<SubstitutionVote> {
        store.list_user_votes(match_id, user_id).await.unwrap_or_else(|e| {
            tracing::warn!("User votes unavailable for match {}: {}", match_id, e);
            Vec::new()
        })
    }

    pub async fn submit_vote<S: SignalStore + ?Sized>(&self, store: &S, vote: &SubstitutionVote) -> VoteOutcome {
        match self.try_submit(store, vote).await {
            Ok(()) => VoteOutcome::ok(),
            Err(e) => VoteOutcome::failed(e.to_string()),
        }
    }

    async fn try_submit<S: SignalStore + ?Sized>(&self, store: &S, vote: &SubstitutionVote) -> Result<(), VoteError> {
        validate_vote(vote)?;
        store.upsert_vote(vote).await?;
        // Any write can change every cached summary for the match.
        self.cache.clear();
        tracing::info!(
            "Vote stored: match {} player {} {}{}",
            vote.match_id,
            vote.player_id,
            vote.vote_type.as_str(),
            vote.replacement_player_id.map_or(String::new(), |r| format!(" -> {}", r))
        );
        Ok(())
    }

    pub async fn remove_vote<S: SignalStore + ?Sized>(&self, store: &S, key: &VoteKey) -> VoteOutcome {
        let result = async {
            validate_key(key)?;
            store.delete_vote(key).await?;
            Ok::<(), VoteError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.cache.clear();
                tracing::info!(
                    "Vote removed: match {} player {} {}",
                    key.match_id,
                    key.player_id,
                    key.vote_type.as_str()
                );
                VoteOutcome::ok()
            }
            Err(e) => VoteOutcome::failed(e.to_string()),
        }
    }

    /// Submit, or stage locally when the store is unreachable.
    pub async fn submit_or_stage<S: SignalStore + ?Sized>(&self, store: &S, vote: &SubstitutionVote) -> VoteOutcome {
        match self.try_submit(store, vote).await {
            Ok(()) => VoteOutcome::ok(),
            Err(VoteError::Store(e)) => {
                tracing::warn!("Store unavailable, staging vote for match {}: {}", vote.match_id, e);
                self.staging.stage(vote.clone());
                VoteOutcome::staged()
            }
            Err(e) => VoteOutcome::failed(e.to_string()),
        }
    }

    pub fn stage_vote(&self, vote: SubstitutionVote) -> VoteOutcome {
        if let Err(e) = validate_vote(&vote) {
            return VoteOutcome::failed(e.to_string());
        }
        self.staging.stage(vote);
        VoteOutcome::staged()
    }

    pub fn staged_votes(&self, match_id: MatchId) -> Vec<SubstitutionVote> {
        self.staging.staged(match_id)
    }

    /// Send staged votes one by one; anything that fails stays staged, as does
    /// anything staged while the flush is in progress.
    pub async fn flush_staged<S: SignalStore + ?Sized>(&self, store: &S, match_id: MatchId) -> FlushReport {
        let pending = self.staging.staged(match_id);
        let mut sent = Vec::with_capacity(pending.len());
        let mut failed = 0;

        for vote in pending {
            match self.try_submit(store, &vote).await {
                Ok(()) => sent.push(vote),
                Err(e) => {
                    tracing::warn!("Staged vote for player {} not flushed: {}", vote.player_id, e);
                    failed += 1;
                }
            }
        }

        let remaining = self.staging.remove_sent(match_id, &sent);
        let report = FlushReport {
            match_id,
            submitted: sent.len(),
            failed,
            remaining,
        };
        tracing::info!(
            "Flushed staged votes for match {}: {} sent, {} still staged",
            match_id,
            report.submitted,
            report.remaining
        );
        report
    }
}
