//! Token metadata lookup with a mirror fallback, plus a bonding-curve
//! estimate of how many tokens a given SOL amount buys.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PoolError, PoolResult};
use crate::swap::error_for_status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub virtual_sol_reserves: u64,
    #[serde(default)]
    pub virtual_token_reserves: u64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub complete: bool,
}

impl TokenInfo {
    /// Expected raw token output for `lamports_in` against the virtual
    /// reserves (constant product, fees ignored). Zero when reserves are unknown.
    pub fn estimate_tokens_out(&self, lamports_in: u64) -> u64 {
        let sol = self.virtual_sol_reserves as u128;
        let tokens = self.virtual_token_reserves as u128;
        if sol == 0 || tokens == 0 {
            return 0;
        }
        let k = sol * tokens;
        let new_tokens = k / (sol + lamports_in as u128) + 1;
        tokens.saturating_sub(new_tokens) as u64
    }

    /// Lamports per raw token unit implied by the reserves.
    pub fn spot_price(&self) -> f64 {
        if self.virtual_token_reserves == 0 {
            return 0.0;
        }
        self.virtual_sol_reserves as f64 / self.virtual_token_reserves as f64
    }
}

#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    hosts: Vec<String>,
}

impl MetadataClient {
    pub fn new(primary: &str, fallback: &str) -> Self {
        Self {
            client: Client::new(),
            hosts: vec![
                primary.trim_end_matches('/').to_string(),
                fallback.trim_end_matches('/').to_string(),
            ],
        }
    }

    /// `GET coins/{mint}` on the primary host, then on the mirror when the
    /// primary answers non-2xx or is unreachable.
    pub async fn coin(&self, mint: &str) -> PoolResult<TokenInfo> {
        crate::wallet::parse_pubkey(mint)?;
        let mut last_err = PoolError::network("no metadata hosts configured");
        for host in &self.hosts {
            let url = format!("{}/coins/{}", host, mint);
            let attempt = async {
                let resp = self.client.get(&url).send().await?;
                let resp = error_for_status(resp, "coin metadata").await?;
                Ok::<TokenInfo, PoolError>(resp.json().await?)
            };
            match attempt.await {
                Ok(info) => {
                    debug!(%url, symbol = %info.symbol, "token metadata fetched");
                    return Ok(info);
                }
                Err(e) => {
                    warn!(%url, error = %e, "metadata host failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
