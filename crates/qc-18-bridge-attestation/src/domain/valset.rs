//! Validator-set change detection.

use crate::domain::entities::BridgeValidatorSet;
use std::collections::BTreeMap;

/// Below this relative power change (parts per million) no new checkpoint is needed.
pub const POWER_DIFF_THRESHOLD_PPM: u64 = 50_000;

/// A checkpoint older than this is refreshed even without a power change.
pub const VALSET_STALE_AFTER_MS: u64 = 14 * 24 * 60 * 60 * 1_000;

/// `Σ|Δpower| × 10⁶ / previous total`, keyed by EVM address.
///
/// Members missing on either side count with power zero.
pub fn power_diff_ppm(previous: &BridgeValidatorSet, current: &BridgeValidatorSet) -> u64 {
    let previous_total = previous.total_power();
    if previous_total == 0 {
        return u64::MAX;
    }

    let mut powers: BTreeMap<[u8; 20], (u64, u64)> = BTreeMap::new();
    for v in &previous.validators {
        powers.entry(v.ethereum_address).or_default().0 = v.power;
    }
    for v in &current.validators {
        powers.entry(v.ethereum_address).or_default().1 = v.power;
    }

    let diff: u128 = powers
        .values()
        .map(|(before, after)| u128::from(before.abs_diff(*after)))
        .sum();
    let ppm = diff * 1_000_000 / u128::from(previous_total);
    u64::try_from(ppm).unwrap_or(u64::MAX)
}

/// What to do with a freshly built validator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValsetChange {
    /// Nothing saved yet.
    Initial,
    /// Identical, or below the power-diff threshold with a fresh checkpoint.
    Unchanged,
    /// Power moved enough to need a new checkpoint.
    Changed { diff_ppm: u64 },
    /// Same set, but the last checkpoint has gone stale.
    Stale,
}

impl ValsetChange {
    /// Whether a checkpoint should be recorded.
    pub fn needs_checkpoint(&self) -> bool {
        !matches!(self, ValsetChange::Unchanged)
    }
}

/// Classify `current` against the last saved set.
pub fn classify(
    saved: Option<&BridgeValidatorSet>,
    current: &BridgeValidatorSet,
    saved_is_stale: bool,
) -> ValsetChange {
    let Some(saved) = saved else {
        return ValsetChange::Initial;
    };
    if saved != current {
        let diff_ppm = power_diff_ppm(saved, current);
        if diff_ppm >= POWER_DIFF_THRESHOLD_PPM {
            return ValsetChange::Changed { diff_ppm };
        }
    }
    if saved_is_stale {
        ValsetChange::Stale
    } else {
        ValsetChange::Unchanged
    }
}
