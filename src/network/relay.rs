use alloy::primitives::keccak256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::error::MeshError;

const RELAY_TIMEOUT: Duration = Duration::from_millis(2_500);

/// Signed transactions targeting one specific upcoming block.
#[derive(Debug, Clone)]
pub struct RelayBundle {
    pub raw_txs: Vec<Vec<u8>>,
    pub target_block: u64,
}

/// Relay verdict. A rejection carries the relay's diagnostics, including
/// simulation failures; it is an outcome for the dispatcher to log, not a
/// transport error.
#[derive(Debug, Clone)]
pub enum RelaySubmission {
    Accepted { bundle_hash: Option<String> },
    Rejected { reason: String },
}

#[async_trait]
pub trait ExecutionRelay: Send + Sync {
    async fn submit_bundle(&self, bundle: &RelayBundle) -> Result<RelaySubmission, MeshError>;
}

/// `eth_sendBundle` over HTTP with a flashbots-style signature header.
///
/// The header identity is an ephemeral key minted per worker; it
/// authenticates the searcher to the relay and is unrelated to the custody
/// credential that signs the transactions themselves.
pub struct HttpRelay {
    url: String,
    client: Client,
    identity: PrivateKeySigner,
}

impl HttpRelay {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            identity: PrivateKeySigner::random(),
        }
    }

    /// EIP-191 signature over the keccak256(body) hex string, the header
    /// scheme flashbots-compatible relays expect.
    fn sign_request(&self, body: &[u8]) -> Result<String, MeshError> {
        let message_hash = keccak256(body).to_string();
        let signature = self
            .identity
            .sign_message_sync(message_hash.as_bytes())
            .map_err(|e| MeshError::Custody(format!("relay header signing failed: {e}")))?;

        let mut sig_bytes = [0u8; 65];
        sig_bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        sig_bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        sig_bytes[64] = signature.v() as u8;
        Ok(format!(
            "{}:0x{}",
            self.identity.address(),
            hex::encode(sig_bytes)
        ))
    }
}

#[async_trait]
impl ExecutionRelay for HttpRelay {
    async fn submit_bundle(&self, bundle: &RelayBundle) -> Result<RelaySubmission, MeshError> {
        let txs: Vec<String> = bundle
            .raw_txs
            .iter()
            .map(|raw| format!("0x{}", hex::encode(raw)))
            .collect();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendBundle",
            "params": [{
                "txs": txs,
                "blockNumber": format!("0x{:x}", bundle.target_block),
            }],
        });
        let body_bytes = serde_json::to_vec(&payload)
            .map_err(|e| MeshError::Encoding(format!("bundle body: {e}")))?;
        let signature = self.sign_request(&body_bytes)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(
                "X-Flashbots-Signature",
                HeaderValue::from_str(&signature)
                    .map_err(|e| MeshError::Encoding(format!("signature header: {e}")))?,
            )
            .body(body_bytes)
            .timeout(RELAY_TIMEOUT)
            .send()
            .await
            .map_err(|e| MeshError::Transient(format!("relay {}: {e}", self.url)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(RelaySubmission::Rejected {
                reason: format!("{status}: {text}"),
            });
        }
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap_or(json!({}));
        if let Some(err) = parsed.get("error") {
            return Ok(RelaySubmission::Rejected {
                reason: err.to_string(),
            });
        }
        let bundle_hash = parsed
            .get("result")
            .and_then(|r| r.get("bundleHash"))
            .and_then(|h| h.as_str())
            .map(str::to_string);
        Ok(RelaySubmission::Accepted { bundle_hash })
    }
}
