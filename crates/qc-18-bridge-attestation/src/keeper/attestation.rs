//! Report snapshots and oracle attestation signatures.

use super::{oracle_error, BridgeKeeper};
use crate::domain::abi::right_padded_bytes32;
use crate::domain::encoding::{
    decode_hex, encode_oracle_attestation_data, report_key, signature_matches,
    OracleAttestationData,
};
use crate::domain::entities::{AttestationSnapshotData, PositionalSignatures};
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::events::BridgeEvent;
use crate::ports::outbound::{CollaboratorError, KeyValueStore, OracleKeeper, StakingKeeper};
use crate::store::schema;
use shared_types::{Address, BlockContext, Hash, OperatorAddress};

/// Report contents a snapshot commits to.
struct ReportView {
    value: String,
    aggregate_power: u64,
    flagged: bool,
}

impl<S, K, O> BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    // =========================================================================
    // SNAPSHOT CREATION
    // =========================================================================

    /// Snapshot every aggregate finalized at this height, up to the snapshot limit.
    ///
    /// A report that cannot be snapshotted is logged and skipped. Returns the
    /// number of snapshots created.
    pub fn create_new_report_snapshots(&mut self, ctx: &BlockContext) -> BridgeResult<usize> {
        let reports = self.oracle.aggregated_reports_at_height(ctx.height);
        let mut created = 0;
        for report in reports {
            let result = self.atomically(|k| {
                k.create_snapshot(ctx, &report.query_id, report.timestamp_ms, false)
            });
            match result {
                Ok(Some(_)) => created += 1,
                Ok(None) => break,
                Err(e) => tracing::warn!(
                    "[qc-18] Snapshot of {}@{} failed: {}",
                    hex::encode(&report.query_id),
                    report.timestamp_ms,
                    e
                ),
            }
        }
        Ok(created)
    }

    /// Snapshot the report `(query_id, timestamp)` against the current checkpoint.
    ///
    /// Returns `None` when this block already reached the snapshot limit.
    pub fn create_snapshot(
        &mut self,
        ctx: &BlockContext,
        query_id: &[u8],
        timestamp: u64,
        external: bool,
    ) -> BridgeResult<Option<Hash>> {
        let mut requests = schema::ATTEST_REQUESTS_BY_HEIGHT
            .get(&self.store, &ctx.height)?
            .unwrap_or_default();
        let limit = self.snapshot_limit()?;
        if requests.len() as u64 >= limit {
            tracing::warn!(
                "[qc-18] Snapshot limit {} reached at height {}, dropping {}@{}",
                limit,
                ctx.height,
                hex::encode(query_id),
                timestamp
            );
            return Ok(None);
        }

        let report = self.report_view(query_id, timestamp)?;
        if external && report.flagged {
            return Err(BridgeError::ReportFlagged);
        }

        let checkpoint = self.validator_checkpoint()?;
        let previous_timestamp = self.neighbour_timestamp(self.oracle.timestamp_before(query_id, timestamp))?;
        let next_timestamp = self.neighbour_timestamp(self.oracle.timestamp_after(query_id, timestamp))?;
        let last_consensus_timestamp =
            self.last_consensus_timestamp(query_id, timestamp, report.aggregate_power, external)?;

        let data = OracleAttestationData {
            query_id: right_padded_bytes32("query_id", query_id)?,
            value: decode_hex("aggregate_value", &report.value)?,
            timestamp,
            aggregate_power: report.aggregate_power,
            previous_timestamp,
            next_timestamp,
            checkpoint,
            attestation_timestamp: ctx.time_ms,
            last_consensus_timestamp,
        };
        let snapshot = encode_oracle_attestation_data(&data);

        let key = report_key(query_id, timestamp);
        let mut snapshots = schema::SNAPSHOTS_BY_REPORT
            .get(&self.store, &key)?
            .unwrap_or_default();
        if !snapshots.contains(&snapshot) {
            snapshots.push(snapshot);
            schema::SNAPSHOTS_BY_REPORT.set(&mut self.store, &key, &snapshots)?;
        }

        schema::SNAPSHOT_DATA.set(
            &mut self.store,
            &snapshot,
            &AttestationSnapshotData {
                validator_checkpoint: checkpoint,
                attestation_timestamp: ctx.time_ms,
                prev_report_timestamp: previous_timestamp,
                next_report_timestamp: next_timestamp,
                query_id: query_id.to_vec(),
                timestamp,
                last_consensus_timestamp,
            },
        )?;

        if !schema::SNAPSHOT_ATTESTATIONS.has(&self.store, &snapshot)? {
            let slots = self.valset_for_checkpoint(&checkpoint)?.len();
            schema::SNAPSHOT_ATTESTATIONS.set(
                &mut self.store,
                &snapshot,
                &PositionalSignatures::new(slots),
            )?;
        }

        if !requests.contains(&snapshot) {
            requests.push(snapshot);
            schema::ATTEST_REQUESTS_BY_HEIGHT.set(&mut self.store, &ctx.height, &requests)?;
        }

        tracing::info!(
            "[qc-18] Snapshot {} for {}@{}",
            hex::encode(snapshot),
            hex::encode(query_id),
            timestamp
        );
        self.emit(BridgeEvent::SnapshotCreated {
            snapshot,
            query_id: query_id.to_vec(),
            timestamp,
            external,
        });
        Ok(Some(snapshot))
    }

    /// Aggregate at `timestamp`, or the no-stake report when there is none.
    fn report_view(&self, query_id: &[u8], timestamp: u64) -> BridgeResult<ReportView> {
        match self.oracle.aggregate_by_timestamp(query_id, timestamp) {
            Ok(aggregate) => Ok(ReportView {
                value: aggregate.aggregate_value,
                aggregate_power: aggregate.aggregate_power,
                flagged: aggregate.flagged,
            }),
            Err(CollaboratorError::NotFound(_)) => {
                let report = self
                    .oracle
                    .no_stake_report_by_timestamp(query_id, timestamp)
                    .map_err(|e| oracle_error("report", e))?;
                Ok(ReportView {
                    value: report.value,
                    aggregate_power: 0,
                    flagged: false,
                })
            }
            Err(e) => Err(oracle_error("aggregate report", e)),
        }
    }

    /// Missing neighbours read as 0.
    fn neighbour_timestamp(&self, lookup: Result<u64, CollaboratorError>) -> BridgeResult<u64> {
        match lookup {
            Ok(timestamp) => Ok(timestamp),
            Err(CollaboratorError::NotFound(_)) => Ok(0),
            Err(e) => Err(oracle_error("report timestamp", e)),
        }
    }

    /// Timestamp of the most recent report that reached consensus power.
    pub fn last_consensus_timestamp(
        &self,
        query_id: &[u8],
        timestamp: u64,
        aggregate_power: u64,
        external: bool,
    ) -> BridgeResult<u64> {
        let past_report = if external {
            match self.oracle.current_aggregate_report(query_id) {
                Ok((_, reported_at)) => reported_at,
                Err(CollaboratorError::NotFound(_)) => return Ok(0),
                Err(e) => return Err(oracle_error("current aggregate", e)),
            }
        } else {
            let threshold = self
                .checkpoint_params(self.current_validator_set_timestamp()?)?
                .power_threshold;
            if aggregate_power >= threshold {
                return Ok(timestamp);
            }
            match self.oracle.timestamp_before(query_id, timestamp) {
                Ok(before) => before,
                Err(CollaboratorError::NotFound(_)) => return Ok(0),
                Err(e) => return Err(oracle_error("report timestamp", e)),
            }
        };

        let snapshots = schema::SNAPSHOTS_BY_REPORT
            .get(&self.store, &report_key(query_id, past_report))?
            .unwrap_or_default();
        let Some(first) = snapshots.first() else {
            return Ok(0);
        };
        Ok(self.attestation_data_by_snapshot(first)?.last_consensus_timestamp)
    }

    // =========================================================================
    // ATTESTATIONS
    // =========================================================================

    pub fn attestation_data_by_snapshot(&self, snapshot: &Hash) -> BridgeResult<AttestationSnapshotData> {
        schema::SNAPSHOT_DATA
            .get(&self.store, snapshot)?
            .ok_or_else(|| BridgeError::not_found("snapshot", hex::encode(snapshot)))
    }

    pub fn oracle_attestations(&self, snapshot: &Hash) -> BridgeResult<PositionalSignatures> {
        schema::SNAPSHOT_ATTESTATIONS
            .get(&self.store, snapshot)?
            .ok_or_else(|| BridgeError::not_found("snapshot", hex::encode(snapshot)))
    }

    /// Snapshot hashes generated for a report, oldest first.
    pub fn snapshots_by_report(&self, query_id: &[u8], timestamp: u64) -> BridgeResult<Vec<Hash>> {
        schema::SNAPSHOTS_BY_REPORT
            .get(&self.store, &report_key(query_id, timestamp))?
            .ok_or_else(|| {
                BridgeError::not_found("report snapshots", format!("{}@{timestamp}", hex::encode(query_id)))
            })
    }

    pub fn attestation_requests_by_height(&self, height: u64) -> BridgeResult<Vec<Hash>> {
        Ok(schema::ATTEST_REQUESTS_BY_HEIGHT
            .get(&self.store, &height)?
            .unwrap_or_default())
    }

    /// Check that `signature` is `evm_address`'s signature over `snapshot`,
    /// and that the snapshot describes `(query_id, timestamp)`.
    pub fn verify_oracle_attestation(
        &self,
        evm_address: &Address,
        query_id: &[u8],
        timestamp: u64,
        snapshot: &Hash,
        signature: &[u8],
    ) -> BridgeResult<()> {
        let data = self.attestation_data_by_snapshot(snapshot)?;
        if data.query_id != query_id || data.timestamp != timestamp {
            return Err(BridgeError::InvalidRequest(format!(
                "snapshot {} does not describe {}@{}",
                hex::encode(snapshot),
                hex::encode(query_id),
                timestamp
            )));
        }
        if !signature_matches(snapshot, signature, evm_address)? {
            return Err(BridgeError::SignerMismatch {
                operator: hex::encode(evm_address),
            });
        }
        Ok(())
    }

    /// Store `signature` in the operator's slot of `snapshot`.
    ///
    /// The slot is the operator's index in the valset of the snapshot's checkpoint.
    pub fn record_oracle_attestation(
        &mut self,
        operator: &OperatorAddress,
        snapshot: &Hash,
        signature: Vec<u8>,
    ) -> BridgeResult<()> {
        let evm_address = self.evm_address_by_operator(operator)?;
        let data = self.attestation_data_by_snapshot(snapshot)?;
        let signers = self.valset_for_checkpoint(&data.validator_checkpoint)?;
        let slot = signers
            .position(&evm_address)
            .ok_or_else(|| BridgeError::not_found("signer slot", operator))?;

        let mut attestations = self.oracle_attestations(snapshot)?;
        attestations.set(slot, signature)?;
        schema::SNAPSHOT_ATTESTATIONS.set(&mut self.store, snapshot, &attestations)?;
        tracing::debug!(
            "[qc-18] Attestation from {} for snapshot {} in slot {}",
            operator,
            hex::encode(snapshot),
            slot
        );
        Ok(())
    }
}
