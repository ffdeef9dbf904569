use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use futures::future::{join_all, select_ok};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::error::MeshError;

/// Hard per-request cap, independent of the race stagger.
const REQUEST_TIMEOUT: Duration = Duration::from_millis(2_000);

/// One redundant JSON-RPC endpoint. Lower `priority` starts earlier in the
/// read race; `weight` breaks priority ties; `stall_timeout` is how long
/// the race waits on this endpoint before also starting the next one.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub priority: u8,
    pub weight: u8,
    pub stall_timeout: Duration,
}

/// Chain connectivity as seen by the core: height and nonce reads, raw
/// transaction broadcast, and the push stream of market-event
/// notifications.
#[async_trait]
pub trait ChainConnectivity: Send + Sync {
    async fn block_height(&self) -> Result<u64, MeshError>;
    async fn transaction_count(&self, address: Address) -> Result<u64, MeshError>;
    /// Fan the raw transaction out to every endpoint; the first accepted
    /// hash wins. Errors only when every endpoint failed.
    async fn broadcast_raw(&self, raw: &[u8]) -> Result<B256, MeshError>;
}

/// Racing/fan-out JSON-RPC mesh over redundant endpoints.
///
/// Reads start endpoints in priority order, staggered by the accumulated
/// stall timeouts, and take the first successful response. Writes go to
/// every endpoint at once for reliability rather than speed.
pub struct RpcMesh {
    endpoints: Vec<EndpointConfig>,
    client: Client,
    events_tx: mpsc::Sender<Value>,
    events_rx: Mutex<Option<mpsc::Receiver<Value>>>,
}

impl RpcMesh {
    pub fn new(mut endpoints: Vec<EndpointConfig>, event_buffer: usize) -> Self {
        endpoints.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)));
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        Self {
            endpoints,
            client: Client::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Sender half for whatever adapter feeds raw market-event
    /// notifications into this worker.
    pub fn event_sender(&self) -> mpsc::Sender<Value> {
        self.events_tx.clone()
    }

    /// Receiver half of the subscription. Taken exactly once, by the
    /// worker's ingestion task.
    pub fn take_event_stream(&self) -> Option<mpsc::Receiver<Value>> {
        self.events_rx.lock().take()
    }

    async fn call_endpoint(
        &self,
        endpoint: &EndpointConfig,
        method: &str,
        params: Value,
    ) -> Result<Value, MeshError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&endpoint.url)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MeshError::Transient(format!("{}: {e}", endpoint.url)))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| MeshError::Transient(format!("{}: {e}", endpoint.url)))?;
        if let Some(err) = payload.get("error") {
            return Err(MeshError::Transient(format!(
                "{}: {method} returned {err}",
                endpoint.url
            )));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| MeshError::Transient(format!("{}: empty result", endpoint.url)))
    }

    async fn race_read(&self, method: &str, params: Value) -> Result<Value, MeshError> {
        if self.endpoints.is_empty() {
            return Err(MeshError::Transient("no endpoints configured".into()));
        }
        let mut start_after = Duration::ZERO;
        let mut attempts = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let delay = start_after;
            start_after += endpoint.stall_timeout;
            let params = params.clone();
            attempts.push(Box::pin(async move {
                sleep(delay).await;
                match timeout(REQUEST_TIMEOUT, self.call_endpoint(endpoint, method, params)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(MeshError::Transient(format!(
                        "{}: {method} stalled",
                        endpoint.url
                    ))),
                }
            }));
        }
        match select_ok(attempts).await {
            Ok((value, _)) => Ok(value),
            Err(last) => {
                tracing::warn!(target: "mesh", method, error = %last, "every endpoint failed");
                Err(last)
            }
        }
    }
}

fn hex_to_u64(value: &Value) -> Result<u64, MeshError> {
    let text = value
        .as_str()
        .ok_or_else(|| MeshError::Transient(format!("expected hex string, got {value}")))?;
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|e| MeshError::Transient(format!("bad hex quantity {text}: {e}")))
}

#[async_trait]
impl ChainConnectivity for RpcMesh {
    async fn block_height(&self) -> Result<u64, MeshError> {
        let result = self.race_read("eth_blockNumber", json!([])).await?;
        hex_to_u64(&result)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, MeshError> {
        let result = self
            .race_read(
                "eth_getTransactionCount",
                json!([format!("{address:#x}"), "pending"]),
            )
            .await?;
        hex_to_u64(&result)
    }

    async fn broadcast_raw(&self, raw: &[u8]) -> Result<B256, MeshError> {
        if self.endpoints.is_empty() {
            return Err(MeshError::Transient("no endpoints configured".into()));
        }
        let encoded = format!("0x{}", hex::encode(raw));
        let sends = self.endpoints.iter().map(|endpoint| {
            self.call_endpoint(endpoint, "eth_sendRawTransaction", json!([encoded.clone()]))
        });

        let mut last_err = MeshError::Transient("no endpoint answered".into());
        let mut accepted: Option<B256> = None;
        for outcome in join_all(sends).await {
            match outcome {
                Ok(value) => {
                    let hash = value
                        .as_str()
                        .and_then(|s| B256::from_str(s).ok())
                        .unwrap_or_default();
                    if accepted.is_none() {
                        accepted = Some(hash);
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "mesh", error = %e, "broadcast endpoint failed");
                    last_err = e;
                }
            }
        }
        accepted.ok_or(last_err)
    }
}
