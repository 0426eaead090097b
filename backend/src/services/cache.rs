use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::{AvailablePlayer, MatchId, PlayerId, TeamId, UserLineup};

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Time-bounded memo shared by the signal computations.
///
/// Expiry is lazy: stale entries stay in the map until overwritten or
/// `clear`ed, and are simply reported as absent on read. There is no
/// per-key in-flight tracking, so two concurrent misses both recompute.
pub struct ResultCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Drop every entry, fresh or not.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dropped = entries.len();
        entries.clear();
        tracing::debug!("Cache cleared ({} entries dropped)", dropped);
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.stored_at) < self.ttl {
            tracing::debug!("Cache hit: {}", key);
            Some(entry.value.clone())
        } else {
            tracing::debug!("Cache stale: {}", key);
            None
        }
    }

    fn set_at(&self, key: impl Into<String>, value: V, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.into(), CacheEntry { value, stored_at: now });
    }
}

// ── Cache keys ────────────────────────────────────────────────────────────────

/// Key for a combined community signal request. The lineup fingerprint is part
/// of the key because lineup compatibility depends on the caller's own picks,
/// and the available-player digest because suggestions take display metadata
/// from that list.
pub fn signal_key(
    match_id: MatchId,
    team_id: TeamId,
    player_id: PlayerId,
    position: &str,
    formation: &str,
    lineup: &UserLineup,
    available: &[AvailablePlayer],
) -> String {
    format!(
        "signal:{}:{}:{}:{}:{}:{}:{:016x}",
        match_id,
        team_id,
        player_id,
        position.trim().to_uppercase(),
        formation,
        lineup.fingerprint(),
        available_digest(available)
    )
}

/// Process-local digest of the available-player list, in request order.
fn available_digest(available: &[AvailablePlayer]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for player in available {
        player.player_id.hash(&mut hasher);
        player.name.hash(&mut hasher);
        player.position.hash(&mut hasher);
        player.number.hash(&mut hasher);
        player.rating.map(f64::to_bits).hash(&mut hasher);
    }
    available.len().hash(&mut hasher);
    hasher.finish()
}

pub fn vote_summary_key(match_id: MatchId, team_id: TeamId) -> String {
    format!("votes:{}:{}", match_id, team_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);
    const EPSILON: Duration = Duration::from_millis(1);

    #[test]
    fn test_hit_just_before_ttl() {
        let cache = ResultCache::new(TTL);
        let t0 = Instant::now();
        cache.set_at("k", 42u32, t0);
        assert_eq!(cache.get_at("k", t0 + TTL - EPSILON), Some(42));
    }

    #[test]
    fn test_miss_just_after_ttl() {
        let cache = ResultCache::new(TTL);
        let t0 = Instant::now();
        cache.set_at("k", 42u32, t0);
        assert_eq!(cache.get_at("k", t0 + TTL + EPSILON), None);
        // Lazy expiry: the stale entry is still held until overwritten.
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_overwrite_refreshes_timestamp() {
        let cache = ResultCache::new(Duration::from_secs(30));
        let t0 = Instant::now();
        cache.set_at("k", 1u32, t0);
        cache.set_at("k", 2u32, t0 + Duration::from_secs(20));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(40)), Some(2));
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = ResultCache::new(TTL);
        cache.set("a", 1u32);
        cache.set("b", 2u32);
        cache.clear();
        assert!(cache.entries.lock().unwrap().is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_missing_key() {
        let cache: ResultCache<u32> = ResultCache::new(TTL);
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_signal_key_depends_on_lineup() {
        let empty = UserLineup::default();
        let mut picked = UserLineup::default();
        picked.slots.insert(
            "ST".to_string(),
            crate::models::SelectedPlayer {
                player_id: 9,
                name: None,
                position: "ST".to_string(),
                number: None,
                rating: None,
            },
        );
        let a = signal_key(1, 10, 9, "st", "4-3-3", &empty, &[]);
        let b = signal_key(1, 10, 9, "ST", "4-3-3", &picked, &[]);
        assert_ne!(a, b);
        assert_eq!(a, signal_key(1, 10, 9, "ST", "4-3-3", &empty, &[]));
    }

    #[test]
    fn test_signal_key_depends_on_available_players() {
        let listed = |name: &str| AvailablePlayer {
            player_id: 14,
            name: name.to_string(),
            position: "ST".to_string(),
            number: Some(14),
            rating: None,
        };
        let lineup = UserLineup::default();
        let original = signal_key(1, 10, 9, "ST", "4-3-3", &lineup, &[listed("Backup")]);
        let renamed = signal_key(1, 10, 9, "ST", "4-3-3", &lineup, &[listed("Renamed")]);
        assert_ne!(original, renamed);
        assert_ne!(original, signal_key(1, 10, 9, "ST", "4-3-3", &lineup, &[]));
        assert_eq!(original, signal_key(1, 10, 9, "ST", "4-3-3", &lineup, &[listed("Backup")]));
    }
}
