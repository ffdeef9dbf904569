#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;

use arb_mesh::config::ChainConfig;
use arb_mesh::error::MeshError;
use arb_mesh::graph::DetectionPolicy;
use arb_mesh::network::{ChainConnectivity, ExecutionRelay, RelayBundle, RelaySubmission};
use arb_mesh::registry::PoolRecord;
use arb_mesh::strike::GasPolicy;

pub fn addr(marker: u8) -> Address {
    Address::from([marker; 20])
}

/// Connectivity stub: fixed head, recorded broadcasts, canned nonce.
pub struct FakeConnectivity {
    pub height: u64,
    pub broadcasts: Mutex<Vec<Vec<u8>>>,
}

impl FakeConnectivity {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            broadcasts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainConnectivity for FakeConnectivity {
    async fn block_height(&self) -> Result<u64, MeshError> {
        Ok(self.height)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, MeshError> {
        Ok(5)
    }

    async fn broadcast_raw(&self, raw: &[u8]) -> Result<B256, MeshError> {
        self.broadcasts.lock().push(raw.to_vec());
        Ok(B256::from([0xabu8; 32]))
    }
}

/// Relay stub recording every submission, with a configurable verdict.
pub struct RecordingRelay {
    reject_reason: Option<String>,
    pub bundles: Mutex<Vec<RelayBundle>>,
}

impl RecordingRelay {
    pub fn accepting() -> Self {
        Self {
            reject_reason: None,
            bundles: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_reason: Some(reason.to_string()),
            bundles: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> usize {
        self.bundles.lock().len()
    }
}

#[async_trait]
impl ExecutionRelay for RecordingRelay {
    async fn submit_bundle(&self, bundle: &RelayBundle) -> Result<RelaySubmission, MeshError> {
        self.bundles.lock().push(bundle.clone());
        match &self.reject_reason {
            Some(reason) => Ok(RelaySubmission::Rejected {
                reason: reason.clone(),
            }),
            None => Ok(RelaySubmission::Accepted { bundle_hash: None }),
        }
    }
}

/// Worker configuration with an unlimited detection budget, suitable for
/// deterministic tests.
pub fn test_chain_config(chain_id: u64) -> ChainConfig {
    ChainConfig {
        name: format!("test-{chain_id}"),
        chain_id,
        key_env: "UNUSED_TEST_KEY".into(),
        executor: addr(0xee),
        endpoints: Vec::new(),
        relay_url: Some("http://relay.invalid".into()),
        registry_path: None,
        detection: DetectionPolicy {
            max_hops: 12,
            min_profit_threshold: 0.0,
            time_budget: Duration::from_secs(3600),
            min_hop_capacity: 1.0,
            signal_ttl: Duration::from_secs(12),
        },
        gas: GasPolicy::default(),
        slippage_bps: 30,
        backlog_capacity: 16,
        detection_parallelism: 2,
        event_buffer: 64,
    }
}

/// The three pools of the canonical A->B->C->A test triangle.
pub fn triangle_records(chain_id: u64) -> Vec<PoolRecord> {
    [(11u8, 1u8, 2u8), (12, 2, 3), (13, 3, 1)]
        .into_iter()
        .map(|(pool, t0, t1)| PoolRecord {
            pool: addr(pool),
            token0: addr(t0),
            token1: addr(t1),
            fee_ppm: 3000,
            chain_id,
        })
        .collect()
}

pub fn quote(seq: u64, pool: Address, token_in: Address, token_out: Address, rate: f64) -> Value {
    json!({
        "kind": "quote",
        "seq": seq,
        "pool": format!("{pool:#x}"),
        "token_in": format!("{token_in:#x}"),
        "token_out": format!("{token_out:#x}"),
        "rate": rate,
        "capacity": 100.0,
    })
}
