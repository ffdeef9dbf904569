//! Pool registry boundary: the records that bound the graph's vertex and
//! edge universe.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MeshError;
use crate::graph::MarketGraph;

/// One registered liquidity pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolRecord {
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    /// Fee in parts per million (3000 ppm = 0.30%).
    pub fee_ppm: u32,
    pub chain_id: u64,
}

#[async_trait]
pub trait PoolRegistry: Send + Sync {
    async fn load(&self, chain_id: u64) -> Result<Vec<PoolRecord>, MeshError>;
}

/// Registry backed by a fixed record set, typically a JSON file shipped
/// with the deployment.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    records: Vec<PoolRecord>,
}

impl StaticRegistry {
    pub fn new(records: Vec<PoolRecord>) -> Self {
        Self { records }
    }

    pub fn from_file(path: &Path) -> Result<Self, MeshError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MeshError::Config(format!("registry {}: {e}", path.display())))?;
        let records: Vec<PoolRecord> = serde_json::from_str(&raw)
            .map_err(|e| MeshError::Config(format!("registry {}: {e}", path.display())))?;
        Ok(Self { records })
    }
}

#[async_trait]
impl PoolRegistry for StaticRegistry {
    async fn load(&self, chain_id: u64) -> Result<Vec<PoolRecord>, MeshError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.chain_id == chain_id)
            .cloned()
            .collect())
    }
}

/// Seed the graph universe from registry records: both directions of every
/// pool at its fee-discounted neutral rate, with zero capacity so the
/// capacity gate keeps a pool out of cycles until its first live quote.
pub fn seed_graph(graph: &MarketGraph, records: &[PoolRecord]) -> usize {
    let mut seeded = 0;
    for record in records {
        let fee = record.fee_ppm as f64 / 1_000_000.0;
        let weight = -(1.0 - fee).ln();
        for (from, to) in [
            (record.token0, record.token1),
            (record.token1, record.token0),
        ] {
            match graph.upsert_edge(from, to, weight, 0.0, record.pool) {
                Ok(()) => seeded += 1,
                Err(e) => {
                    tracing::warn!(target: "graph", pool = %record.pool, error = %e, "seed rejected");
                }
            }
        }
    }
    seeded
}
