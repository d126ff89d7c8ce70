//! Swap aggregator client (Jupiter v6 quote/swap API).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use tracing::debug;

use crate::errors::{PoolError, PoolResult};

/// A quote as returned by the aggregator. The raw body is kept because the
/// swap endpoint wants it back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub raw: Value,
}

impl Quote {
    pub fn from_value(raw: Value) -> PoolResult<Self> {
        let field = |name: &str| -> PoolResult<u64> {
            raw.get(name)
                .and_then(|v| match v {
                    Value::String(s) => s.parse().ok(),
                    Value::Number(n) => n.as_u64(),
                    _ => None,
                })
                .ok_or_else(|| PoolError::network(format!("quote missing {}", name)))
        };
        Ok(Self {
            in_amount: field("inAmount")?,
            out_amount: field("outAmount")?,
            raw,
        })
    }
}

#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> PoolResult<Quote>;

    /// Unsigned swap transaction for `user` executing `quote`.
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> PoolResult<VersionedTransaction>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    dynamic_compute_unit_limit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

#[derive(Debug, Clone)]
pub struct JupiterClient {
    client: Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Turn a non-2xx response into a network error carrying the status and body.
pub(crate) async fn error_for_status(resp: reqwest::Response, what: &str) -> PoolResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(PoolError::http_status(
        status.as_u16(),
        format!("{} failed with {}: {}", what, status, body),
    ))
}

pub fn decode_transaction(b64: &str) -> PoolResult<VersionedTransaction> {
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| PoolError::transaction(format!("swap transaction is not base64: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| PoolError::transaction(format!("swap transaction does not decode: {}", e)))
}

#[async_trait]
impl SwapApi for JupiterClient {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> PoolResult<Quote> {
        let resp = self
            .client
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", input_mint.to_string()),
                ("outputMint", output_mint.to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", slippage_bps.to_string()),
            ])
            .send()
            .await?;
        let resp = error_for_status(resp, "quote").await?;
        let quote = Quote::from_value(resp.json().await?)?;
        debug!(input_mint, output_mint, amount, out = quote.out_amount, "quote received");
        Ok(quote)
    }

    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> PoolResult<VersionedTransaction> {
        let body = SwapRequest {
            quote_response: &quote.raw,
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
        };
        let resp = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await?;
        let resp = error_for_status(resp, "swap").await?;
        let parsed: SwapResponse = resp.json().await?;
        decode_transaction(&parsed.swap_transaction)
    }
}
