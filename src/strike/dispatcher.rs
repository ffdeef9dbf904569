use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, TxKind, B256, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::composer::StrikePayload;
use crate::custody::KeyCustody;
use crate::error::MeshError;
use crate::graph::Signal;
use crate::metrics::WorkerStats;
use crate::network::{ChainConnectivity, ExecutionRelay, RelayBundle, RelaySubmission};

/// Externally configured fee/gas constants, sized for the worst-case hop
/// count. Never derived from an individual payload.
#[derive(Debug, Clone)]
pub struct GasPolicy {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            gas_limit: 850_000,
            max_fee_per_gas: 60_000_000_000,
            max_priority_fee_per_gas: 25_000_000_000,
        }
    }
}

/// Per-worker nonce counter, primed once from the pending nonce at worker
/// start. Owned by the dispatcher, never process-global.
pub struct NonceCounter {
    next: AtomicU64,
}

impl NonceCounter {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// What happened to the single dispatch attempt for one signal.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    RelayAccepted {
        target_block: u64,
        bundle_hash: Option<String>,
    },
    RelayRejected {
        target_block: u64,
        reason: String,
    },
    Broadcast {
        tx_hash: B256,
    },
    /// Transport-level failure after the mesh's own fallback was
    /// exhausted. Logged and counted; a later event supersedes it.
    Failed {
        reason: String,
    },
    /// The signal outlived its deadline before dispatch; nothing was sent.
    Stale,
    DryRun,
}

/// Delivers exactly one composed transaction per signal, over the private
/// relay when the chain supports one, otherwise straight into the public
/// transaction pool.
///
/// Every failure mode below custody is contained here: the caller only
/// ever sees `Err` for a custody fault, which is worker-fatal.
pub struct StrikeDispatcher {
    chain_id: u64,
    executor: Address,
    gas: GasPolicy,
    dry_run: bool,
    connectivity: Arc<dyn ChainConnectivity>,
    custody: Arc<dyn KeyCustody>,
    relay: Option<Arc<dyn ExecutionRelay>>,
    stats: Arc<WorkerStats>,
    nonces: NonceCounter,
}

impl StrikeDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: u64,
        executor: Address,
        gas: GasPolicy,
        dry_run: bool,
        connectivity: Arc<dyn ChainConnectivity>,
        custody: Arc<dyn KeyCustody>,
        relay: Option<Arc<dyn ExecutionRelay>>,
        stats: Arc<WorkerStats>,
        start_nonce: u64,
    ) -> Self {
        Self {
            chain_id,
            executor,
            gas,
            dry_run,
            connectivity,
            custody,
            relay,
            stats,
            nonces: NonceCounter::new(start_nonce),
        }
    }

    pub async fn dispatch(
        &self,
        signal: &Signal,
        payload: &StrikePayload,
    ) -> Result<DispatchOutcome, MeshError> {
        let now_unix = chrono::Utc::now().timestamp().max(0) as u64;
        if now_unix > payload.deadline_unix {
            WorkerStats::bump(&self.stats.stale_signals);
            tracing::debug!(
                target: "strike",
                seq = signal.event.seq,
                deadline = payload.deadline_unix,
                "signal expired before dispatch"
            );
            return Ok(DispatchOutcome::Stale);
        }

        let envelope = TxEip1559 {
            chain_id: self.chain_id,
            nonce: self.nonces.next(),
            max_priority_fee_per_gas: self.gas.max_priority_fee_per_gas,
            max_fee_per_gas: self.gas.max_fee_per_gas,
            gas_limit: self.gas.gas_limit,
            to: TxKind::Call(self.executor),
            value: U256::ZERO,
            access_list: Default::default(),
            input: payload.calldata.clone(),
        };

        if self.dry_run {
            tracing::info!(
                target: "strike",
                seq = signal.event.seq,
                hops = payload.hops.len(),
                "dry-run: would dispatch strike"
            );
            return Ok(DispatchOutcome::DryRun);
        }

        let outcome = match &self.relay {
            Some(relay) => self.dispatch_bundle(signal, payload, envelope, relay).await?,
            None => self.dispatch_public(signal, payload, envelope).await?,
        };
        Ok(outcome)
    }

    async fn dispatch_bundle(
        &self,
        signal: &Signal,
        payload: &StrikePayload,
        envelope: TxEip1559,
        relay: &Arc<dyn ExecutionRelay>,
    ) -> Result<DispatchOutcome, MeshError> {
        // Custody errors propagate: worker-fatal.
        let raw_txs = self.custody.sign_bundle(vec![envelope])?;

        let head = match self.connectivity.block_height().await {
            Ok(height) => height,
            Err(e) => return Ok(self.fail(signal, format!("head query: {e}"))),
        };
        let bundle = RelayBundle {
            raw_txs,
            target_block: head + 1,
        };

        match relay.submit_bundle(&bundle).await {
            Ok(RelaySubmission::Accepted { bundle_hash }) => {
                self.celebrate(signal, payload, &format!("bundle@{}", bundle.target_block));
                Ok(DispatchOutcome::RelayAccepted {
                    target_block: bundle.target_block,
                    bundle_hash,
                })
            }
            Ok(RelaySubmission::Rejected { reason }) => {
                WorkerStats::bump(&self.stats.dispatch_failures);
                tracing::warn!(
                    target: "strike",
                    seq = signal.event.seq,
                    target_block = bundle.target_block,
                    reason = %reason,
                    "relay rejected bundle; no retry"
                );
                Ok(DispatchOutcome::RelayRejected {
                    target_block: bundle.target_block,
                    reason,
                })
            }
            Err(e) => Ok(self.fail(signal, format!("relay transport: {e}"))),
        }
    }

    async fn dispatch_public(
        &self,
        signal: &Signal,
        payload: &StrikePayload,
        envelope: TxEip1559,
    ) -> Result<DispatchOutcome, MeshError> {
        let raw = self.custody.sign_transaction(envelope)?;
        match self.connectivity.broadcast_raw(&raw).await {
            Ok(tx_hash) => {
                self.celebrate(signal, payload, &format!("tx {tx_hash:#x}"));
                Ok(DispatchOutcome::Broadcast { tx_hash })
            }
            Err(e) => Ok(self.fail(signal, format!("broadcast: {e}"))),
        }
    }

    fn fail(&self, signal: &Signal, reason: String) -> DispatchOutcome {
        WorkerStats::bump(&self.stats.dispatch_failures);
        tracing::warn!(
            target: "strike",
            seq = signal.event.seq,
            reason = %reason,
            "dispatch failed; a fresh signal supersedes it"
        );
        DispatchOutcome::Failed { reason }
    }

    fn celebrate(&self, signal: &Signal, payload: &StrikePayload, via: &str) {
        WorkerStats::bump(&self.stats.strikes_dispatched);
        let multiplier = signal
            .cycle
            .as_ref()
            .map(|c| c.multiplier())
            .unwrap_or(1.0);
        tracing::info!(
            target: "strike",
            seq = signal.event.seq,
            hops = payload.hops.len(),
            multiplier,
            latency_ms = signal.event.observed_at.elapsed().as_secs_f64() * 1e3,
            via,
            "strike dispatched"
        );
    }
}
