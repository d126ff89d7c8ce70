use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

pub const MIN_SLIPPAGE_BPS: u16 = 100;
pub const MAX_SLIPPAGE_BPS: u16 = 5_000;
pub const MIN_BUY_DELAY_MS: u64 = 1_000;

/// User-editable settings. Loaded from `config.toml`, then overridden from
/// the environment, then validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Base58 secret key of the funding wallet.
    #[serde(default)]
    pub master_private_key: Option<String>,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    #[serde(default = "default_buy_delay_min_ms")]
    pub buy_delay_min_ms: u64,
    #[serde(default = "default_buy_delay_max_ms")]
    pub buy_delay_max_ms: u64,

    // Transfer tuning
    #[serde(default = "default_fee_estimate_lamports")]
    pub fee_estimate_lamports: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_sell_delay_ms")]
    pub sell_delay_ms: u64,

    // External services
    #[serde(default = "default_swap_api_url")]
    pub swap_api_url: String,
    #[serde(default = "default_metadata_api_url")]
    pub metadata_api_url: String,
    #[serde(default = "default_metadata_fallback_url")]
    pub metadata_fallback_url: String,
    /// Wallet persistence service. When unset or unreachable the local file is used.
    #[serde(default)]
    pub wallet_api_url: Option<String>,
    #[serde(default = "default_wallet_file")]
    pub wallet_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            master_private_key: None,
            slippage_bps: default_slippage_bps(),
            buy_delay_min_ms: default_buy_delay_min_ms(),
            buy_delay_max_ms: default_buy_delay_max_ms(),
            fee_estimate_lamports: default_fee_estimate_lamports(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            sell_delay_ms: default_sell_delay_ms(),
            swap_api_url: default_swap_api_url(),
            metadata_api_url: default_metadata_api_url(),
            metadata_fallback_url: default_metadata_fallback_url(),
            wallet_api_url: None,
            wallet_file: default_wallet_file(),
        }
    }
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_slippage_bps() -> u16 {
    1_000
}
fn default_buy_delay_min_ms() -> u64 {
    2_000
}
fn default_buy_delay_max_ms() -> u64 {
    5_000
}
fn default_fee_estimate_lamports() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_sell_delay_ms() -> u64 {
    500
}
fn default_swap_api_url() -> String {
    "https://quote-api.jup.ag/v6".to_string()
}
fn default_metadata_api_url() -> String {
    "https://frontend-api.pump.fun".to_string()
}
fn default_metadata_fallback_url() -> String {
    "https://frontend-api-v3.pump.fun".to_string()
}
fn default_wallet_file() -> String {
    "wallets.json".to_string()
}

impl Settings {
    /// Load settings from `path` if present, otherwise defaults.
    /// ENV overrides have priority:
    /// - WALLET_POOL_RPC_URL
    /// - WALLET_POOL_MASTER_KEY
    pub fn load<P: AsRef<Path>>(path: P) -> PoolResult<Self> {
        let path = path.as_ref();
        let mut settings = match fs::read_to_string(path) {
            Ok(s) => toml::from_str::<Settings>(&s).map_err(|e| {
                PoolError::config(format!("failed to parse {}: {}", path.display(), e))
            })?,
            Err(_) => Settings::default(),
        };

        if let Ok(v) = std::env::var("WALLET_POOL_RPC_URL") {
            if !v.trim().is_empty() {
                settings.rpc_url = v;
            }
        }
        if let Ok(v) = std::env::var("WALLET_POOL_MASTER_KEY") {
            if !v.trim().is_empty() {
                settings.master_private_key = Some(v);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(PoolError::validation("rpcUrl", "must not be empty"));
        }
        if !(MIN_SLIPPAGE_BPS..=MAX_SLIPPAGE_BPS).contains(&self.slippage_bps) {
            return Err(PoolError::validation(
                "slippageBps",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS, self.slippage_bps
                ),
            ));
        }
        if self.buy_delay_min_ms < MIN_BUY_DELAY_MS {
            return Err(PoolError::validation(
                "buyDelayMinMs",
                format!("must be at least {}", MIN_BUY_DELAY_MS),
            ));
        }
        if self.buy_delay_max_ms < self.buy_delay_min_ms {
            return Err(PoolError::validation(
                "buyDelayMaxMs",
                "cannot be less than buyDelayMinMs",
            ));
        }
        if self.max_retries == 0 {
            return Err(PoolError::validation("maxRetries", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// The funding wallet, parsed from `masterPrivateKey`.
    pub fn master_keypair(&self) -> PoolResult<solana_sdk::signature::Keypair> {
        let key = self
            .master_private_key
            .as_deref()
            .ok_or_else(|| PoolError::config("masterPrivateKey is not set"))?;
        crate::wallet::parse_keypair(key)
    }
}
