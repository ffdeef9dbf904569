//! Environment-driven configuration.
//!
//! `TARGET_CHAINS` names the chains to run, one isolated worker each.
//! Every knob reads `{CHAIN}_{KEY}` first and falls back to the global
//! `{KEY}`, so fleet-wide defaults live beside per-chain overrides.

use alloy::primitives::Address;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::graph::DetectionPolicy;
use crate::network::EndpointConfig;
use crate::strike::GasPolicy;

const GWEI: u128 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    /// Name of the environment variable holding this worker's signing key.
    /// The key itself is only ever read inside custody.
    pub key_env: String,
    /// On-chain cycle executor contract.
    pub executor: Address,
    pub endpoints: Vec<EndpointConfig>,
    /// Present iff this chain has a private relay; selects dispatch mode.
    pub relay_url: Option<String>,
    pub registry_path: Option<PathBuf>,
    pub detection: DetectionPolicy,
    pub gas: GasPolicy,
    pub slippage_bps: u32,
    pub backlog_capacity: usize,
    pub detection_parallelism: usize,
    pub event_buffer: usize,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        dotenvy::dotenv().ok();

        let names = env::var("TARGET_CHAINS").unwrap_or_else(|_| "ETHEREUM".to_string());
        let mut chains = Vec::new();
        for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            chains.push(ChainConfig::from_env(name)?);
        }
        if chains.is_empty() {
            eyre::bail!("TARGET_CHAINS resolved to an empty chain list");
        }
        Ok(Self { chains })
    }
}

impl ChainConfig {
    pub fn from_env(name: &str) -> eyre::Result<Self> {
        let upper = name.to_uppercase();

        let chain_id: u64 = require(&upper, "CHAIN_ID")?.parse()?;
        let executor = Address::from_str(&require(&upper, "EXECUTOR")?)?;

        let urls = require(&upper, "RPC_URLS")?;
        let stalls: Vec<u64> = lookup(&upper, "STALL_TIMEOUTS_MS")
            .map(|list| {
                list.split(',')
                    .filter_map(|v| v.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        let default_stall = parse_or(&upper, "STALL_TIMEOUT_MS", 100u64);
        let endpoints: Vec<EndpointConfig> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .enumerate()
            .map(|(i, url)| EndpointConfig {
                url: url.to_string(),
                priority: (i + 1) as u8,
                weight: 1,
                stall_timeout: Duration::from_millis(
                    stalls.get(i).copied().unwrap_or(default_stall),
                ),
            })
            .collect();
        if endpoints.is_empty() {
            eyre::bail!("{upper}_RPC_URLS resolved to no endpoints");
        }

        let detection = DetectionPolicy {
            max_hops: parse_or(&upper, "MAX_HOPS", 12usize),
            min_profit_threshold: parse_or(&upper, "MIN_PROFIT_THRESHOLD", 0.0f64),
            time_budget: Duration::from_millis(parse_or(&upper, "DETECTION_BUDGET_MS", 25u64)),
            min_hop_capacity: parse_or(&upper, "MIN_HOP_CAPACITY", 0.0f64),
            signal_ttl: Duration::from_secs(parse_or(&upper, "SIGNAL_TTL_SECS", 12u64)),
        };

        let gas = GasPolicy {
            gas_limit: parse_or(&upper, "GAS_LIMIT", 850_000u64),
            max_fee_per_gas: parse_or(&upper, "MAX_FEE_GWEI", 60u128) * GWEI,
            max_priority_fee_per_gas: parse_or(&upper, "PRIORITY_FEE_GWEI", 25u128) * GWEI,
        };

        Ok(Self {
            name: name.to_string(),
            chain_id,
            key_env: format!("{upper}_PRIVATE_KEY"),
            executor,
            endpoints,
            relay_url: lookup(&upper, "RELAY_URL"),
            registry_path: lookup(&upper, "REGISTRY").map(PathBuf::from),
            detection,
            gas,
            slippage_bps: parse_or(&upper, "SLIPPAGE_BPS", 30u32),
            backlog_capacity: parse_or(&upper, "BACKLOG_CAPACITY", 256usize),
            detection_parallelism: parse_or(&upper, "DETECTION_PARALLELISM", 2usize),
            event_buffer: parse_or(&upper, "EVENT_BUFFER", 1024usize),
        })
    }
}

/// Chain-scoped variable first, global fallback second.
fn lookup(upper: &str, key: &str) -> Option<String> {
    env::var(format!("{upper}_{key}"))
        .or_else(|_| env::var(key))
        .ok()
}

fn require(upper: &str, key: &str) -> eyre::Result<String> {
    lookup(upper, key).ok_or_else(|| eyre::eyre!("{upper}_{key} must be set"))
}

fn parse_or<T: FromStr + Copy>(upper: &str, key: &str, default: T) -> T {
    lookup(upper, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
