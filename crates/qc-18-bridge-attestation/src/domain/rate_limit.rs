//! Evidence rate limiting.
//!
//! Evidence for one operator must be at least a window apart from every
//! other accepted evidence for the same operator, on both sides.

use crate::domain::errors::{BridgeError, BridgeResult};
use shared_types::OperatorAddress;

/// Check `timestamp` against the nearest recorded evidence on each side.
///
/// `before` is the latest recorded timestamp `< timestamp`, `after` the
/// earliest `> timestamp`. An exact duplicate is reported by the caller.
pub fn check_window(
    operator: &OperatorAddress,
    timestamp: u64,
    window_ms: u64,
    before: Option<u64>,
    after: Option<u64>,
) -> BridgeResult<()> {
    for existing in [before, after].into_iter().flatten() {
        if existing.abs_diff(timestamp) < window_ms {
            return Err(BridgeError::RateLimited {
                operator: operator.to_string(),
                timestamp,
                existing,
                window_ms,
            });
        }
    }
    Ok(())
}
