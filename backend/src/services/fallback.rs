use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::models::{AvailablePlayer, CommunitySignal, PlayerId, ReplacementSignal};
use crate::services::replacement::{reconcile_player, MAX_SUGGESTIONS};
use crate::utils::{position_category, round_percentage};

const SAMPLE_RANGE: (u32, u32) = (20, 60);
const LEAD_SHARE_RANGE: (u32, u32) = (20, 35); // % of the sample picking the top candidate
const LINEUP_COMPAT_RANGE: (u8, u8) = (55, 90);

/// Synthesizes plausible community signals for the demo match, without
/// touching the store.
///
/// The generator is seedable so tests can pin its output; the live demo
/// seeds it from the clock.
pub struct DemoSignalGenerator {
    rng: Mutex<StdRng>,
    delay: Duration,
}

impl DemoSignalGenerator {
    pub fn new(seed: Option<u64>, delay: Duration) -> Self {
        let seed = seed.unwrap_or_else(clock_seed);
        tracing::debug!("Demo signal generator seeded with {}", seed);
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            delay,
        }
    }

    /// `synthesize` behind an artificial delay that mimics a network round-trip.
    pub async fn generate(&self, player_id: PlayerId, position: &str, available: &[AvailablePlayer]) -> CommunitySignal {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.synthesize(player_id, position, available)
    }

    pub fn synthesize(&self, player_id: PlayerId, position: &str, available: &[AvailablePlayer]) -> CommunitySignal {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let category = position_category(position);

        let candidates: Vec<&AvailablePlayer> = available
            .iter()
            .filter(|p| p.player_id != player_id && position_category(&p.position) == category)
            .take(MAX_SUGGESTIONS)
            .collect();

        let sample_size = rng.random_range(SAMPLE_RANGE.0..=SAMPLE_RANGE.1);
        let lead_share = rng.random_range(LEAD_SHARE_RANGE.0..=LEAD_SHARE_RANGE.1);

        // Counts only ever shrink down the list so the ranking stays descending.
        let mut counts = Vec::with_capacity(candidates.len());
        let mut count = (sample_size * lead_share / 100).max(1);
        for _ in &candidates {
            counts.push(count);
            let step = rng.random_range(1..=(count / 3).max(1));
            count = count.saturating_sub(step).max(1);
        }

        let unattributed = rng.random_range(0..=sample_size / 10);
        let removed = (counts.iter().sum::<u32>() + unattributed).min(sample_size);
        let replacement_percentage = round_percentage(removed, sample_size);

        let top_replacements = candidates
            .iter()
            .zip(&counts)
            .map(|(player, &count)| {
                reconcile_player(
                    player.player_id,
                    None,
                    Some(*player),
                    round_percentage(count, sample_size),
                    count,
                )
            })
            .collect();

        CommunitySignal {
            lineup_compatibility: rng.random_range(LINEUP_COMPAT_RANGE.0..=LINEUP_COMPAT_RANGE.1),
            replacement: ReplacementSignal {
                compatibility_score: 100 - replacement_percentage,
                has_sufficient_data: true,
                sample_size,
                replacement_percentage,
                top_replacements,
            },
        }
    }
}

fn clock_seed() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default().unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::available;

    fn squad() -> Vec<AvailablePlayer> {
        vec![
            available(1, "Keeper", "GK", Some(1)),
            available(9, "Starter", "ST", Some(9)),
            available(14, "Backup Striker", "CF", Some(14)),
            available(11, "Winger", "LW", Some(11)),
            available(19, "Second Winger", "RW", Some(19)),
            available(21, "Late Sub", "ST", Some(21)),
            available(6, "Holder", "CDM", Some(6)),
        ]
    }

    #[test]
    fn test_same_seed_same_output() {
        let a = DemoSignalGenerator::new(Some(7), Duration::ZERO);
        let b = DemoSignalGenerator::new(Some(7), Duration::ZERO);
        assert_eq!(a.synthesize(9, "ST", &squad()), b.synthesize(9, "ST", &squad()));
    }

    #[test]
    fn test_output_is_self_consistent() {
        let generator = DemoSignalGenerator::new(Some(42), Duration::ZERO);
        for _ in 0..50 {
            let signal = generator.synthesize(9, "ST", &squad());
            let r = &signal.replacement;

            assert!(r.has_sufficient_data);
            assert!((SAMPLE_RANGE.0..=SAMPLE_RANGE.1).contains(&r.sample_size));
            assert!((LINEUP_COMPAT_RANGE.0..=LINEUP_COMPAT_RANGE.1).contains(&signal.lineup_compatibility));
            assert_eq!(r.compatibility_score, 100 - r.replacement_percentage);
            assert!(r.top_replacements.len() <= MAX_SUGGESTIONS);

            let counts: Vec<u32> = r.top_replacements.iter().map(|s| s.count).collect();
            assert!(counts.windows(2).all(|w| w[0] >= w[1]));
            for s in &r.top_replacements {
                assert_ne!(s.player_id, 9);
                assert_eq!(s.percentage, round_percentage(s.count, r.sample_size));
            }
        }
    }

    #[test]
    fn test_candidates_share_position_category() {
        let generator = DemoSignalGenerator::new(Some(3), Duration::ZERO);
        let signal = generator.synthesize(9, "ST", &squad());
        let ids: Vec<_> = signal.replacement.top_replacements.iter().map(|s| s.player_id).collect();
        assert_eq!(ids, vec![14, 11, 19]);
        assert_eq!(signal.replacement.top_replacements[0].name, "Backup Striker");

        let keeper = generator.synthesize(1, "GK", &squad());
        assert!(keeper.replacement.top_replacements.is_empty());
    }
}
