use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`. Two empty sets score 0.
pub fn jaccard_similarity<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// `round(part / whole * 100)` clamped to [0, 100]; a zero denominator yields 0.
pub fn round_percentage(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    ratio_to_percentage(f64::from(part) / f64::from(whole))
}

/// Convert a [0, 1] ratio to an integer percentage.
pub fn ratio_to_percentage(ratio: f64) -> u8 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Coarse position group used by the demo-mode generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionCategory {
    Gk,
    Def,
    Mid,
    Att,
}

const GK_MARKERS: &[&str] = &["GK", "GOAL", "KEEPER"];
const DEF_MARKERS: &[&str] = &["DEF", "CB", "LB", "RB", "WB", "BACK", "SW"];
const ATT_MARKERS: &[&str] = &["ATT", "ST", "CF", "FW", "LW", "RW", "FORWARD", "STRIKER", "WING"];

/// Group a raw position label by substring match. Unknown labels land in MID.
///
/// Defender markers are checked before attacker markers so that wing-backs
/// ("LWB", "RWB") are not swallowed by "LW"/"RW".
pub fn position_category(label: &str) -> PositionCategory {
    let upper = label.trim().to_uppercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| upper.contains(m));

    if contains_any(GK_MARKERS) {
        PositionCategory::Gk
    } else if contains_any(DEF_MARKERS) {
        PositionCategory::Def
    } else if contains_any(ATT_MARKERS) {
        PositionCategory::Att
    } else {
        PositionCategory::Mid
    }
}

/// Position labels compare case-insensitively, ignoring surrounding whitespace.
pub fn same_position(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
