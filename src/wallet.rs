//! Wallet records and keypair encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::str::FromStr;
use tracing::debug;

use crate::errors::{PoolError, PoolResult};

/// A generated wallet as the store keeps it.
///
/// `funded` and `balance` are only changed by the store after a confirmed
/// transfer or a balance refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub public_key: String,
    /// Base58 encoded 64-byte secret key.
    pub private_key: String,
    pub index: u32,
    pub funded: bool,
    /// Lamports at last observation.
    pub balance: u64,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Generate a fresh random keypair for slot `index`.
    pub fn generate(index: u32) -> Self {
        let keypair = Keypair::new();
        debug!(index, pubkey = %keypair.pubkey(), "generated wallet");
        Self::from_keypair(&keypair, index)
    }

    pub fn from_keypair(keypair: &Keypair, index: u32) -> Self {
        Self {
            public_key: keypair.pubkey().to_string(),
            private_key: keypair.to_base58_string(),
            index,
            funded: false,
            balance: 0,
            created_at: Utc::now(),
        }
    }

    pub fn pubkey(&self) -> PoolResult<Pubkey> {
        parse_pubkey(&self.public_key)
    }

    pub fn keypair(&self) -> PoolResult<Keypair> {
        let keypair = parse_keypair(&self.private_key)?;
        if keypair.pubkey().to_string() != self.public_key {
            return Err(PoolError::validation(
                "privateKey",
                format!("secret key does not belong to {}", self.public_key),
            ));
        }
        Ok(keypair)
    }

    /// Export as the `[publicKey, privateKey]` pair users paste elsewhere.
    pub fn export_line(&self) -> String {
        format!("{},{}", self.public_key, self.private_key)
    }
}

/// One row per (wallet, mint): what a wallet holds and what it paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub wallet: String,
    pub mint: String,
    /// Raw token units.
    pub token_balance: u64,
    pub sol_spent: u64,
    /// Lamports per raw token unit at purchase.
    pub buy_price: f64,
    pub buy_time: DateTime<Utc>,
}

/// Totals derived from the holdings rows of one mint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HoldingsSummary {
    pub wallets: usize,
    pub token_balance: u64,
    pub sol_spent: u64,
}

pub fn parse_pubkey(s: &str) -> PoolResult<Pubkey> {
    Pubkey::from_str(s.trim())
        .map_err(|e| PoolError::validation("address", format!("invalid address {}: {}", s, e)))
}

/// Parse a secret key (supports both JSON array and base58 formats)
pub fn parse_keypair(data: &str) -> PoolResult<Keypair> {
    let data = data.trim();

    // JSON array format, as written by the Solana CLI
    if data.starts_with('[') && data.ends_with(']') {
        let bytes: Vec<u8> = serde_json::from_str(data).map_err(|e| {
            PoolError::validation("privateKey", format!("bad keypair JSON array: {}", e))
        })?;
        return keypair_from_bytes(&bytes);
    }

    let bytes = bs58::decode(data)
        .into_vec()
        .map_err(|e| PoolError::validation("privateKey", format!("bad base58: {}", e)))?;
    keypair_from_bytes(&bytes)
}

fn keypair_from_bytes(bytes: &[u8]) -> PoolResult<Keypair> {
    if bytes.len() != 64 {
        return Err(PoolError::validation(
            "privateKey",
            format!("expected 64 bytes, got {}", bytes.len()),
        ));
    }
    Keypair::from_bytes(bytes)
        .map_err(|e| PoolError::validation("privateKey", format!("invalid keypair: {}", e)))
}
