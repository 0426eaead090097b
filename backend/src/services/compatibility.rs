use crate::db::SignalStore;
use crate::error::StoreError;
use crate::models::{CompatibilityScore, MatchId, SquadSubmission, TeamId, UserLineup};
use crate::utils::{jaccard_similarity, ratio_to_percentage};

/// Scores how closely a user's lineup matches the crowd's submissions for
/// the same match and team.
pub struct CompatibilityCalculator {
    min_sample_size: u32,
}

impl CompatibilityCalculator {
    pub fn new(min_sample_size: u32) -> Self {
        Self { min_sample_size }
    }

    /// Store errors are returned as-is; the engine decides how to degrade.
    pub async fn try_calculate<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        match_id: MatchId,
        team_id: TeamId,
        lineup: &UserLineup,
    ) -> Result<CompatibilityScore, StoreError> {
        let submissions = store.list_squad_submissions(match_id, team_id).await?;
        Ok(self.score_submissions(lineup, &submissions))
    }

    /// Mean Jaccard similarity between the lineup's player set and each
    /// submission's player set, as a 0-100 integer.
    pub fn score_submissions(&self, lineup: &UserLineup, submissions: &[SquadSubmission]) -> CompatibilityScore {
        let sample_size = u32::try_from(submissions.len()).unwrap_or(u32::MAX);
        if sample_size < self.min_sample_size {
            return CompatibilityScore::insufficient(sample_size);
        }

        let user_players = lineup.player_ids();
        let total: f64 = submissions
            .iter()
            .map(|s| jaccard_similarity(&user_players, &s.player_ids()))
            .sum();
        let mean = total / submissions.len() as f64;

        CompatibilityScore {
            score: ratio_to_percentage(mean),
            sample_size,
            has_sufficient_data: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{lineup, submission, FailingStore, MemoryStore};

    #[test]
    fn test_identical_crowd_scores_100() {
        let calc = CompatibilityCalculator::new(10);
        let subs: Vec<_> = (0..10).map(|i| submission(i, &[1, 2, 3, 4], "ST")).collect();
        let score = calc.score_submissions(&lineup(&[1, 2, 3, 4]), &subs);
        assert_eq!(score.score, 100);
        assert_eq!(score.sample_size, 10);
        assert!(score.has_sufficient_data);
    }

    #[test]
    fn test_mean_of_similarities() {
        let calc = CompatibilityCalculator::new(10);
        // Half the crowd matches exactly (1.0), half shares 2 of 6 ids (2/6).
        let mut subs: Vec<_> = (0..5).map(|i| submission(i, &[1, 2, 3, 4], "ST")).collect();
        subs.extend((5..10).map(|i| submission(i, &[3, 4, 5, 6], "ST")));
        let score = calc.score_submissions(&lineup(&[1, 2, 3, 4]), &subs);
        // (1.0 + 1/3) / 2 = 0.6667
        assert_eq!(score.score, 67);
    }

    #[test]
    fn test_empty_lineup_against_empty_submissions_is_zero() {
        let calc = CompatibilityCalculator::new(10);
        let subs: Vec<_> = (0..12).map(|i| submission(i, &[], "ST")).collect();
        let score = calc.score_submissions(&lineup(&[]), &subs);
        assert_eq!(score.score, 0);
        assert!(score.has_sufficient_data);
    }

    #[test]
    fn test_below_threshold_reports_real_sample_size() {
        let calc = CompatibilityCalculator::new(10);
        let subs: Vec<_> = (0..4).map(|i| submission(i, &[1, 2], "ST")).collect();
        let score = calc.score_submissions(&lineup(&[1, 2]), &subs);
        assert_eq!(score, CompatibilityScore::insufficient(4));
    }

    #[test]
    fn test_sufficiency_boundary_at_ten() {
        let calc = CompatibilityCalculator::new(10);
        let subs: Vec<_> = (0..10).map(|i| submission(i, &[1, 2], "ST")).collect();

        let nine = calc.score_submissions(&lineup(&[1, 2]), &subs[..9]);
        assert_eq!(nine, CompatibilityScore::insufficient(9));

        let ten = calc.score_submissions(&lineup(&[1, 2]), &subs);
        assert!(ten.has_sufficient_data);
        assert_eq!(ten.sample_size, 10);
        assert_eq!(ten.score, 100);
    }

    #[tokio::test]
    async fn test_store_failure_is_returned() {
        let calc = CompatibilityCalculator::new(10);
        let result = calc.try_calculate(&FailingStore, 1, 10, &lineup(&[1])).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_reads_only_requested_team() {
        let store = MemoryStore::default();
        for i in 0..10 {
            store.add_submission(submission(i, &[1, 2, 3], "ST"));
        }
        let mut other = submission(99, &[7, 8], "ST");
        other.team_id = 11;
        store.add_submission(other);

        let calc = CompatibilityCalculator::new(10);
        let score = calc.try_calculate(&store, 1, 10, &lineup(&[1, 2, 3])).await.unwrap();
        assert_eq!(score.sample_size, 10);
        assert_eq!(score.score, 100);
    }
}
