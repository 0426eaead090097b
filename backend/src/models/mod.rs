use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MatchId = i64;
pub type TeamId = i64;
pub type PlayerId = i64;

/// One player placed in a formation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPlayer {
    pub player_id: PlayerId,
    pub name: Option<String>,
    pub position: String, // raw label, e.g. "CB", "LW", "Goalkeeper"
    pub number: Option<u32>,
    pub rating: Option<f64>,
}

/// A crowd member's predicted lineup for one (match, team).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadSubmission {
    pub id: String,
    pub match_id: MatchId,
    pub team_id: TeamId,
    pub user_id: String,
    pub formation: String, // "4-3-3", "3-5-2", ...
    pub slots: BTreeMap<String, SelectedPlayer>,
    pub created_at: DateTime<Utc>,
}

impl SquadSubmission {
    /// Player ids across every positional group of the lineup.
    pub fn player_ids(&self) -> HashSet<PlayerId> {
        self.slots.values().map(|p| p.player_id).collect()
    }
}

/// The caller's in-progress lineup. Same slot shape as a submission, never persisted here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserLineup {
    pub slots: BTreeMap<String, SelectedPlayer>,
}

impl UserLineup {
    pub fn player_ids(&self) -> HashSet<PlayerId> {
        self.slots.values().map(|p| p.player_id).collect()
    }

    /// Stable fingerprint of the selected players, used in cache keys.
    pub fn fingerprint(&self) -> String {
        let mut ids: Vec<PlayerId> = self.player_ids().into_iter().collect();
        ids.sort_unstable();
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
    }
}

/// Squad member the UI knows about; used to backfill display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailablePlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub position: String,
    pub number: Option<u32>,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Out,
    In,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Out => "out",
            VoteType::In => "in",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "out" => Some(VoteType::Out),
            "in" => Some(VoteType::In),
            _ => None,
        }
    }
}

/// Unique identity of a vote row: (match, user, player, vote type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteKey {
    pub match_id: MatchId,
    pub user_id: String,
    pub player_id: PlayerId,
    pub vote_type: VoteType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionVote {
    pub match_id: MatchId,
    pub team_id: TeamId,
    pub user_id: String,
    pub player_id: PlayerId,
    pub vote_type: VoteType,
    pub replacement_player_id: Option<PlayerId>, // only meaningful on "out" votes
    pub updated_at: DateTime<Utc>,
}

impl SubstitutionVote {
    pub fn key(&self) -> VoteKey {
        VoteKey {
            match_id: self.match_id,
            user_id: self.user_id.clone(),
            player_id: self.player_id,
            vote_type: self.vote_type,
        }
    }
}

/// Per-player tally of live substitution votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub player_id: PlayerId,
    pub out_votes: u32,
    pub in_votes: u32,
    pub net_sentiment: i64, // out - in
}

impl VoteSummary {
    pub fn from_counts(player_id: PlayerId, out_votes: u32, in_votes: u32) -> Self {
        Self {
            player_id,
            out_votes,
            in_votes,
            net_sentiment: i64::from(out_votes) - i64::from(in_votes),
        }
    }

    pub fn total_votes(&self) -> u32 {
        self.out_votes + self.in_votes
    }
}

/// Presentation hint for a player's vote indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorHint {
    WantsOut,
    WantsIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementSuggestion {
    pub player_id: PlayerId,
    pub name: String,
    pub position: String,
    pub number: Option<u32>,
    pub rating: Option<f64>,
    pub percentage: u8,
    pub count: u32,
}

/// Output of the lineup compatibility calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub score: u8,
    pub sample_size: u32,
    pub has_sufficient_data: bool,
}

impl CompatibilityScore {
    pub fn insufficient(sample_size: u32) -> Self {
        Self {
            score: 0,
            sample_size,
            has_sufficient_data: false,
        }
    }
}

/// Output of the replacement ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementSignal {
    pub compatibility_score: u8,
    pub has_sufficient_data: bool,
    pub sample_size: u32,
    pub replacement_percentage: u8,
    pub top_replacements: Vec<ReplacementSuggestion>,
}

impl ReplacementSignal {
    pub fn insufficient(sample_size: u32) -> Self {
        Self {
            compatibility_score: 0,
            has_sufficient_data: false,
            sample_size,
            replacement_percentage: 0,
            top_replacements: Vec::new(),
        }
    }
}

/// Merged result handed to the substitution UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySignal {
    pub lineup_compatibility: u8,
    #[serde(flatten)]
    pub replacement: ReplacementSignal,
}

/// Result object for vote writes; callers branch on `success` instead of catching errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub staged: bool,
}

impl VoteOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            staged: false,
        }
    }

    pub fn staged() -> Self {
        Self {
            success: true,
            error: None,
            staged: true,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            staged: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    pub match_id: MatchId,
    pub submitted: usize,
    pub failed: usize,
    pub remaining: usize,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }
}
