//! Key custody boundary.
//!
//! The core hands unsigned envelopes across this seam and gets raw signed
//! bytes back; the private credential never crosses it. A custody failure
//! is worker-fatal and handled by external supervision.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::str::FromStr;

use crate::error::MeshError;

pub trait KeyCustody: Send + Sync {
    fn address(&self) -> Address;
    fn sign_transaction(&self, tx: TxEip1559) -> Result<Vec<u8>, MeshError>;
    fn sign_bundle(&self, txs: Vec<TxEip1559>) -> Result<Vec<Vec<u8>>, MeshError>;
}

/// Custody over a locally held private key, resolved from an environment
/// variable named by configuration.
pub struct LocalKeyCustody {
    signer: PrivateKeySigner,
}

impl LocalKeyCustody {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn from_env_ref(var: &str) -> Result<Self, MeshError> {
        let key = std::env::var(var)
            .map_err(|_| MeshError::Custody(format!("credential variable {var} is not set")))?;
        let signer = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| MeshError::Custody(format!("credential in {var} is invalid: {e}")))?;
        Ok(Self { signer })
    }
}

impl KeyCustody for LocalKeyCustody {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_transaction(&self, mut tx: TxEip1559) -> Result<Vec<u8>, MeshError> {
        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| MeshError::Custody(format!("signing failed: {e}")))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok(signed.encoded_2718())
    }

    fn sign_bundle(&self, txs: Vec<TxEip1559>) -> Result<Vec<Vec<u8>>, MeshError> {
        txs.into_iter()
            .map(|tx| self.sign_transaction(tx))
            .collect()
    }
}
