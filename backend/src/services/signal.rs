use std::sync::Arc;

use serde::Deserialize;

use crate::config::EngineConfig;
use crate::db::SignalStore;
use crate::models::*;
use crate::services::cache::{signal_key, ResultCache};
use crate::services::{
    CompatibilityCalculator, DemoSignalGenerator, ReplacementRanker, VoteAggregator, VoteStaging,
};

/// Everything the substitution sheet knows when it asks for a signal.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalRequest {
    pub match_id: MatchId,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub position: String,
    #[serde(default)]
    pub lineup: UserLineup,
    #[serde(default)]
    pub formation: String,
    #[serde(default)]
    pub available_players: Vec<AvailablePlayer>,
}

/// Entry point for the community signal and substitution voting features.
///
/// Owns the caches and components; the store is shared with whoever else
/// needs it (seeding, the CLI).
pub struct CommunitySignalEngine<S> {
    store: Arc<S>,
    demo_match_id: MatchId,
    fallback_on_outage: bool,
    signal_cache: ResultCache<CommunitySignal>,
    compatibility: CompatibilityCalculator,
    replacement: ReplacementRanker,
    votes: VoteAggregator,
    demo: DemoSignalGenerator,
}

impl<S: SignalStore> CommunitySignalEngine<S> {
    pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
        let staging = match &config.vote_staging_path {
            Some(path) => VoteStaging::persistent(path.clone()),
            None => VoteStaging::in_memory(),
        };

        Self {
            store,
            demo_match_id: config.demo_match_id,
            fallback_on_outage: config.fallback_on_outage,
            signal_cache: ResultCache::new(config.signal_ttl),
            compatibility: CompatibilityCalculator::new(config.min_sample_size),
            replacement: ReplacementRanker::new(config.min_sample_size),
            votes: VoteAggregator::new(ResultCache::new(config.vote_ttl), staging),
            demo: DemoSignalGenerator::new(config.demo_seed, config.demo_delay),
        }
    }

    pub fn is_demo_match(&self, match_id: MatchId) -> bool {
        match_id == self.demo_match_id
    }

    /// Combined lineup-compatibility and replacement signal for one player.
    pub async fn community_signal(&self, request: &SignalRequest) -> CommunitySignal {
        if self.is_demo_match(request.match_id) {
            return self.demo_signal(request).await;
        }

        let key = signal_key(
            request.match_id,
            request.team_id,
            request.player_id,
            &request.position,
            &request.formation,
            &request.lineup,
            &request.available_players,
        );
        if let Some(cached) = self.signal_cache.get(&key) {
            return cached;
        }

        let store = self.store.as_ref();
        let (compatibility, replacement) = tokio::join!(
            self.compatibility
                .try_calculate(store, request.match_id, request.team_id, &request.lineup),
            self.replacement.try_rank(
                store,
                request.match_id,
                request.team_id,
                request.player_id,
                &request.position,
                &request.available_players,
            ),
        );

        if self.fallback_on_outage && (compatibility.is_err() || replacement.is_err()) {
            tracing::warn!("Store unavailable for match {}, serving degraded-mode signal", request.match_id);
            return self.demo_signal(request).await;
        }

        // Degraded halves are returned but not memoized, so the next read retries the store.
        let cacheable = compatibility.is_ok() && replacement.is_ok();
        let compatibility = compatibility.unwrap_or_else(|e| {
            tracing::warn!("Lineup compatibility degraded for match {}: {}", request.match_id, e);
            CompatibilityScore::insufficient(0)
        });
        let replacement = replacement.unwrap_or_else(|e| {
            tracing::warn!("Replacement ranking degraded for match {}: {}", request.match_id, e);
            ReplacementSignal::insufficient(0)
        });

        let signal = CommunitySignal {
            lineup_compatibility: compatibility.score,
            replacement,
        };
        if cacheable {
            self.signal_cache.set(key, signal.clone());
        }
        signal
    }

    async fn demo_signal(&self, request: &SignalRequest) -> CommunitySignal {
        self.demo
            .generate(request.player_id, &request.position, &request.available_players)
            .await
    }

    // ── Votes ─────────────────────────────────────────────────────────────────

    pub async fn match_vote_summary(&self, match_id: MatchId, team_id: TeamId) -> Vec<VoteSummary> {
        self.votes.match_vote_summary(self.store.as_ref(), match_id, team_id).await
    }

    pub async fn player_vote_summary(
        &self,
        match_id: MatchId,
        team_id: TeamId,
        player_id: PlayerId,
    ) -> Option<VoteSummary> {
        self.votes
            .player_vote_summary(self.store.as_ref(), match_id, team_id, player_id)
            .await
    }

    pub async fn most_wanted_substitutions(&self, match_id: MatchId, team_id: TeamId, limit: usize) -> Vec<VoteSummary> {
        self.votes
            .most_wanted_substitutions(self.store.as_ref(), match_id, team_id, limit)
            .await
    }

    pub async fn user_votes(&self, match_id: MatchId, user_id: &str) -> Vec<SubstitutionVote> {
        self.votes.user_votes(self.store.as_ref(), match_id, user_id).await
    }

    pub async fn submit_vote(&self, vote: &SubstitutionVote) -> VoteOutcome {
        self.votes.submit_vote(self.store.as_ref(), vote).await
    }

    pub async fn remove_vote(&self, key: &VoteKey) -> VoteOutcome {
        self.votes.remove_vote(self.store.as_ref(), key).await
    }

    pub async fn submit_or_stage_vote(&self, vote: &SubstitutionVote) -> VoteOutcome {
        self.votes.submit_or_stage(self.store.as_ref(), vote).await
    }

    pub fn stage_vote(&self, vote: SubstitutionVote) -> VoteOutcome {
        self.votes.stage_vote(vote)
    }

    pub fn staged_votes(&self, match_id: MatchId) -> Vec<SubstitutionVote> {
        self.votes.staged_votes(match_id)
    }

    pub async fn flush_staged_votes(&self, match_id: MatchId) -> FlushReport {
        self.votes.flush_staged(self.store.as_ref(), match_id).await
    }
}
