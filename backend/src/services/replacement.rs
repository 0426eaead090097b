use std::collections::{HashMap, HashSet};

use crate::db::SignalStore;
use crate::error::StoreError;
use crate::models::{
    AvailablePlayer, MatchId, PlayerId, ReplacementSignal, ReplacementSuggestion, SelectedPlayer, SquadSubmission,
    TeamId,
};
use crate::utils::{round_percentage, same_position};

pub const MAX_SUGGESTIONS: usize = 3;
pub const UNKNOWN_PLAYER: &str = "Unknown";

/// Ranks the players the crowd picked in place of a given player.
pub struct ReplacementRanker {
    min_sample_size: u32,
}

struct CandidateTally {
    crowd: SelectedPlayer,
    count: u32,
}

impl ReplacementRanker {
    pub fn new(min_sample_size: u32) -> Self {
        Self { min_sample_size }
    }

    pub async fn try_rank<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        team_id: TeamId,
        player_id: PlayerId,
        position: &str,
        available: &[AvailablePlayer],
    ) -> Result<ReplacementSignal, StoreError> {
        let submissions = store.list_squad_submissions(match_id, team_id).await?;
        Ok(self.rank_submissions(&submissions, player_id, position, available))
    }

    pub fn rank_submissions(
        &self,
        submissions: &[SquadSubmission],
        player_id: PlayerId,
        position: &str,
        available: &[AvailablePlayer],
    ) -> ReplacementSignal {
        let sample_size = u32::try_from(submissions.len()).unwrap_or(u32::MAX);
        if sample_size < self.min_sample_size {
            return ReplacementSignal::insufficient(sample_size);
        }

        let mut removed = 0u32;
        // Insertion order doubles as the tie-break: first-encountered wins.
        let mut tallies: Vec<CandidateTally> = Vec::new();
        let mut index: HashMap<PlayerId, usize> = HashMap::new();

        for submission in submissions {
            if submission.player_ids().contains(&player_id) {
                continue;
            }
            removed += 1;

            let mut seen: HashSet<PlayerId> = HashSet::new();
            for picked in submission.slots.values() {
                if picked.player_id == player_id || !same_position(&picked.position, position) {
                    continue;
                }
                if !seen.insert(picked.player_id) {
                    continue;
                }
                match index.get(&picked.player_id) {
                    Some(&i) => {
                        let tally = &mut tallies[i];
                        tally.count += 1;
                        fill_missing(&mut tally.crowd, picked);
                    }
                    None => {
                        index.insert(picked.player_id, tallies.len());
                        tallies.push(CandidateTally {
                            crowd: picked.clone(),
                            count: 1,
                        });
                    }
                }
            }
        }

        // Stable sort keeps first-encountered order among equal counts.
        tallies.sort_by(|a, b| b.count.cmp(&a.count));
        let top_replacements = tallies
            .iter()
            .take(MAX_SUGGESTIONS)
            .map(|tally| {
                let listed = available.iter().find(|p| p.player_id == tally.crowd.player_id);
                reconcile_player(
                    tally.crowd.player_id,
                    Some(&tally.crowd),
                    listed,
                    round_percentage(tally.count, sample_size),
                    tally.count,
                )
            })
            .collect();

        let replacement_percentage = round_percentage(removed, sample_size);
        ReplacementSignal {
            compatibility_score: 100 - replacement_percentage,
            has_sufficient_data: true,
            sample_size,
            replacement_percentage,
            top_replacements,
        }
    }
}

/// Merge display metadata for a suggested player.
///
/// Per field, the first source that has a value wins:
///
/// | field    | 1st        | 2nd               | fallback    |
/// |----------|------------|-------------------|-------------|
/// | name     | crowd data | available players | `"Unknown"` |
/// | position | crowd data | available players | `"Unknown"` |
/// | number   | crowd data | available players | none        |
/// | rating   | crowd data | available players | none        |
pub fn reconcile_player(
    player_id: PlayerId,
    crowd: Option<&SelectedPlayer>,
    listed: Option<&AvailablePlayer>,
    percentage: u8,
    count: u32,
) -> ReplacementSuggestion {
    let non_empty = |s: &String| !s.trim().is_empty();

    let name = crowd
        .and_then(|c| c.name.clone())
        .filter(non_empty)
        .or_else(|| listed.map(|l| l.name.clone()).filter(non_empty))
        .unwrap_or_else(|| UNKNOWN_PLAYER.to_string());
    let position = crowd
        .map(|c| c.position.clone())
        .filter(non_empty)
        .or_else(|| listed.map(|l| l.position.clone()).filter(non_empty))
        .unwrap_or_else(|| UNKNOWN_PLAYER.to_string());

    ReplacementSuggestion {
        player_id,
        name,
        position,
        number: crowd.and_then(|c| c.number).or_else(|| listed.and_then(|l| l.number)),
        rating: crowd.and_then(|c| c.rating).or_else(|| listed.and_then(|l| l.rating)),
        percentage,
        count,
    }
}

fn fill_missing(target: &mut SelectedPlayer, other: &SelectedPlayer) {
    if target.name.is_none() {
        target.name = other.name.clone();
    }
    if target.number.is_none() {
        target.number = other.number;
    }
    if target.rating.is_none() {
        target.rating = other.rating;
    }
}
