//! Per-block hook: checkpoint the validator set, then snapshot new reports.

use super::BridgeKeeper;
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use shared_types::BlockContext;

impl<S, K, O> BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    /// Run the end-of-block work for `ctx`.
    ///
    /// Genesis and the first block are skipped. A chain without registered
    /// bridge validators is not an error; it simply produces no checkpoint.
    pub fn end_block(&mut self, ctx: &BlockContext) -> BridgeResult<()> {
        if ctx.height <= 1 {
            return Ok(());
        }

        match self.atomically(|k| k.compare_and_set_bridge_validators(ctx)) {
            Ok(true) => tracing::debug!("[qc-18] Checkpoint recorded at height {}", ctx.height),
            Ok(false) => {}
            Err(BridgeError::NoValidators) => {
                tracing::debug!("[qc-18] No bridge validators at height {}", ctx.height)
            }
            Err(e) => {
                tracing::error!("[qc-18] Validator set update failed: {}", e);
                return Err(e);
            }
        }

        let created = self.create_new_report_snapshots(ctx)?;
        if created > 0 {
            tracing::info!(
                "[qc-18] Created {} snapshots at height {}",
                created,
                ctx.height
            );
        }
        Ok(())
    }
}
