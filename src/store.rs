//! Wallet store: the single owner of wallet records and holdings.
//!
//! Funding and trading code borrow the store and go through its methods;
//! nothing else mutates a [`Wallet`]. Changes are queued in memory and
//! written to the persistence backend on [`WalletStore::flush`].

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{PoolError, PoolResult};
use crate::ledger::Ledger;
use crate::wallet::{parse_keypair, Holding, HoldingsSummary, Wallet};

/// Field changes for one wallet, as sent in `PATCH /wallets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletUpdate {
    pub public_key: String,
    pub funded: bool,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WalletsBody<T> {
    wallets: T,
}

#[derive(Debug, Serialize)]
struct UpdatesBody<'a> {
    updates: &'a [WalletUpdate],
}

/// Where wallet records live between runs.
#[async_trait]
pub trait WalletBackend: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> PoolResult<Vec<Wallet>>;
    async fn insert(&self, wallets: &[Wallet]) -> PoolResult<()>;
    async fn update(&self, updates: &[WalletUpdate]) -> PoolResult<()>;
    /// Delete one wallet, or all of them when `public_key` is `None`.
    async fn delete(&self, public_key: Option<&str>) -> PoolResult<()>;
}

/// Local JSON file mirroring the wallet list.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    async fn write_all(&self, wallets: &[Wallet]) -> PoolResult<()> {
        let json = serde_json::to_string_pretty(wallets)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), count = wallets.len(), "wallet file written");
        Ok(())
    }
}

#[async_trait]
impl WalletBackend for FileBackend {
    async fn load(&self) -> PoolResult<Vec<Wallet>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(Vec::new()),
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, wallets: &[Wallet]) -> PoolResult<()> {
        let mut all = self.load().await?;
        all.extend(wallets.iter().cloned());
        self.write_all(&all).await
    }

    async fn update(&self, updates: &[WalletUpdate]) -> PoolResult<()> {
        let mut all = self.load().await?;
        for u in updates {
            if let Some(w) = all.iter_mut().find(|w| w.public_key == u.public_key) {
                w.funded = u.funded;
                w.balance = u.balance;
            }
        }
        self.write_all(&all).await
    }

    async fn delete(&self, public_key: Option<&str>) -> PoolResult<()> {
        let all = match public_key {
            Some(pk) => self
                .load()
                .await?
                .into_iter()
                .filter(|w| w.public_key != pk)
                .collect(),
            None => Vec::new(),
        };
        self.write_all(&all).await
    }
}

/// Remote wallet table behind `GET/POST/PATCH/DELETE /wallets`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}/wallets", self.base_url)
    }

    fn check(resp: reqwest::Response) -> PoolResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(PoolError::http_status(
                status.as_u16(),
                format!("wallet api returned {}", status),
            ))
        }
    }
}

#[async_trait]
impl WalletBackend for HttpBackend {
    async fn load(&self) -> PoolResult<Vec<Wallet>> {
        let resp = Self::check(self.client.get(self.url()).send().await?)?;
        let body: WalletsBody<Vec<Wallet>> = resp.json().await?;
        Ok(body.wallets)
    }

    async fn insert(&self, wallets: &[Wallet]) -> PoolResult<()> {
        let resp = self
            .client
            .post(self.url())
            .json(&WalletsBody { wallets })
            .send()
            .await?;
        Self::check(resp).map(|_| ())
    }

    async fn update(&self, updates: &[WalletUpdate]) -> PoolResult<()> {
        let resp = self
            .client
            .patch(self.url())
            .json(&UpdatesBody { updates })
            .send()
            .await?;
        Self::check(resp).map(|_| ())
    }

    async fn delete(&self, public_key: Option<&str>) -> PoolResult<()> {
        let mut req = self.client.delete(self.url());
        if let Some(pk) = public_key {
            req = req.query(&[("publicKey", pk)]);
        }
        Self::check(req.send().await?).map(|_| ())
    }
}

/// Tries `primary` first and falls back to the local mirror when it fails.
/// Writes always reach the mirror so it stays usable offline.
#[derive(Debug)]
pub struct FallbackBackend {
    primary: Arc<dyn WalletBackend>,
    mirror: Arc<dyn WalletBackend>,
}

impl FallbackBackend {
    pub fn new(primary: Arc<dyn WalletBackend>, mirror: Arc<dyn WalletBackend>) -> Self {
        Self { primary, mirror }
    }
}

#[async_trait]
impl WalletBackend for FallbackBackend {
    async fn load(&self) -> PoolResult<Vec<Wallet>> {
        match self.primary.load().await {
            Ok(w) => Ok(w),
            Err(e) => {
                warn!(error = %e, "wallet api unavailable, loading local mirror");
                self.mirror.load().await
            }
        }
    }

    async fn insert(&self, wallets: &[Wallet]) -> PoolResult<()> {
        if let Err(e) = self.primary.insert(wallets).await {
            warn!(error = %e, "wallet api insert failed, kept in local mirror");
        }
        self.mirror.insert(wallets).await
    }

    async fn update(&self, updates: &[WalletUpdate]) -> PoolResult<()> {
        if let Err(e) = self.primary.update(updates).await {
            warn!(error = %e, "wallet api update failed, kept in local mirror");
        }
        self.mirror.update(updates).await
    }

    async fn delete(&self, public_key: Option<&str>) -> PoolResult<()> {
        if let Err(e) = self.primary.delete(public_key).await {
            warn!(error = %e, "wallet api delete failed");
        }
        self.mirror.delete(public_key).await
    }
}

#[derive(Debug, Default)]
pub struct WalletStore {
    wallets: Vec<Wallet>,
    holdings: HashMap<(String, String), Holding>,
    backend: Option<Arc<dyn WalletBackend>>,
    pending_inserts: Vec<Wallet>,
    pending_updates: BTreeMap<String, WalletUpdate>,
}

impl WalletStore {
    /// A store with no persistence, for tests and one-off runs.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store and load whatever the backend already holds.
    pub async fn open(backend: Arc<dyn WalletBackend>) -> PoolResult<Self> {
        let mut wallets = backend.load().await?;
        wallets.sort_by_key(|w| w.index);
        info!(count = wallets.len(), "wallet store loaded");
        Ok(Self {
            wallets,
            backend: Some(backend),
            ..Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.wallets
    }

    pub fn get(&self, public_key: &str) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.public_key == public_key)
    }

    pub fn funded(&self) -> Vec<&Wallet> {
        self.wallets.iter().filter(|w| w.funded).collect()
    }

    fn next_index(&self) -> u32 {
        self.wallets.iter().map(|w| w.index + 1).max().unwrap_or(0)
    }

    /// Generate `count` new wallets, numbered after the existing ones.
    pub fn generate(&mut self, count: usize) -> Vec<Wallet> {
        let start = self.next_index();
        let created: Vec<Wallet> = (0..count as u32).map(|i| Wallet::generate(start + i)).collect();
        self.wallets.extend(created.iter().cloned());
        self.pending_inserts.extend(created.iter().cloned());
        info!(count, first_index = start, "generated wallets");
        created
    }

    fn set_state(&mut self, public_key: &str, funded: bool, balance: u64) -> PoolResult<()> {
        let wallet = self
            .wallets
            .iter_mut()
            .find(|w| w.public_key == public_key)
            .ok_or_else(|| PoolError::validation("publicKey", format!("unknown wallet {}", public_key)))?;
        if wallet.funded == funded && wallet.balance == balance {
            return Ok(());
        }
        wallet.funded = funded;
        wallet.balance = balance;
        self.pending_updates.insert(
            public_key.to_string(),
            WalletUpdate {
                public_key: public_key.to_string(),
                funded,
                balance,
            },
        );
        Ok(())
    }

    /// Record a confirmed funding transfer.
    pub fn mark_funded(&mut self, public_key: &str, balance: u64) -> PoolResult<()> {
        self.set_state(public_key, true, balance)
    }

    /// Record an observed on-chain balance; `funded` follows `balance > 0`.
    pub fn set_balance(&mut self, public_key: &str, balance: u64) -> PoolResult<()> {
        self.set_state(public_key, balance > 0, balance)
    }

    /// Re-read every wallet's balance from the ledger. Wallets whose lookup
    /// fails keep their last known balance.
    pub async fn refresh_balances(&mut self, ledger: &dyn Ledger) -> PoolResult<usize> {
        let mut refreshed = 0;
        let keys: Vec<String> = self.wallets.iter().map(|w| w.public_key.clone()).collect();
        for pk in keys {
            let pubkey = crate::wallet::parse_pubkey(&pk)?;
            match ledger.balance(&pubkey).await {
                Ok(lamports) => {
                    self.set_balance(&pk, lamports)?;
                    refreshed += 1;
                }
                Err(e) => warn!(wallet = %pk, error = %e, "balance refresh failed"),
            }
        }
        debug!(refreshed, "balances refreshed");
        Ok(refreshed)
    }

    /// Export all wallets as a JSON array.
    pub fn export_json(&self) -> PoolResult<String> {
        Ok(serde_json::to_string_pretty(&self.wallets)?)
    }

    /// Import wallets from a JSON export, or from a list of secret keys
    /// (one per line, base58 or JSON array). Known keys are skipped.
    pub fn import(&mut self, data: &str) -> PoolResult<Vec<Wallet>> {
        let trimmed = data.trim();
        let candidates: Vec<Wallet> = match serde_json::from_str::<Vec<Wallet>>(trimmed) {
            Ok(parsed) => {
                for w in &parsed {
                    w.keypair()?;
                }
                parsed
            }
            Err(_) => {
                let mut out = Vec::new();
                for line in trimmed.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    let secret = line.rsplit(',').next().unwrap_or(line);
                    out.push(Wallet::from_keypair(&parse_keypair(secret)?, 0));
                }
                out
            }
        };

        let mut added = Vec::new();
        for mut w in candidates {
            if self.get(&w.public_key).is_some() {
                debug!(wallet = %w.public_key, "import skipped, already known");
                continue;
            }
            w.index = self.next_index();
            self.wallets.push(w.clone());
            self.pending_inserts.push(w.clone());
            added.push(w);
        }
        info!(count = added.len(), "imported wallets");
        Ok(added)
    }

    pub async fn remove(&mut self, public_key: &str) -> PoolResult<()> {
        self.wallets.retain(|w| w.public_key != public_key);
        self.pending_inserts.retain(|w| w.public_key != public_key);
        self.pending_updates.remove(public_key);
        self.holdings.retain(|(wallet, _), _| wallet != public_key);
        if let Some(backend) = &self.backend {
            backend.delete(Some(public_key)).await?;
        }
        Ok(())
    }

    pub async fn clear(&mut self) -> PoolResult<()> {
        self.wallets.clear();
        self.holdings.clear();
        self.pending_inserts.clear();
        self.pending_updates.clear();
        if let Some(backend) = &self.backend {
            backend.delete(None).await?;
        }
        Ok(())
    }

    /// Write queued inserts and updates to the backend.
    pub async fn flush(&mut self) -> PoolResult<()> {
        let Some(backend) = &self.backend else {
            self.pending_inserts.clear();
            self.pending_updates.clear();
            return Ok(());
        };
        if !self.pending_inserts.is_empty() {
            backend.insert(&self.pending_inserts).await?;
            self.pending_inserts.clear();
        }
        if !self.pending_updates.is_empty() {
            let updates: Vec<WalletUpdate> = self.pending_updates.values().cloned().collect();
            backend.update(&updates).await?;
            self.pending_updates.clear();
        }
        Ok(())
    }

    /// Add a purchase to the (wallet, mint) row, creating it if needed.
    pub fn upsert_holding(&mut self, wallet: &str, mint: &str, tokens: u64, sol_spent: u64) {
        let row = self
            .holdings
            .entry((wallet.to_string(), mint.to_string()))
            .or_insert_with(|| Holding {
                wallet: wallet.to_string(),
                mint: mint.to_string(),
                token_balance: 0,
                sol_spent: 0,
                buy_price: 0.0,
                buy_time: Utc::now(),
            });
        row.token_balance = row.token_balance.saturating_add(tokens);
        row.sol_spent = row.sol_spent.saturating_add(sol_spent);
        row.buy_price = if row.token_balance == 0 {
            0.0
        } else {
            row.sol_spent as f64 / row.token_balance as f64
        };
        row.buy_time = Utc::now();
    }

    pub fn remove_holding(&mut self, wallet: &str, mint: &str) -> Option<Holding> {
        self.holdings.remove(&(wallet.to_string(), mint.to_string()))
    }

    pub fn holding(&self, wallet: &str, mint: &str) -> Option<&Holding> {
        self.holdings.get(&(wallet.to_string(), mint.to_string()))
    }

    pub fn holdings_for(&self, mint: &str) -> Vec<&Holding> {
        let mut rows: Vec<&Holding> = self.holdings.values().filter(|h| h.mint == mint).collect();
        rows.sort_by(|a, b| a.wallet.cmp(&b.wallet));
        rows
    }

    /// Summary recomputed from the rows on every call.
    pub fn holdings_summary(&self, mint: &str) -> HoldingsSummary {
        self.holdings_for(mint)
            .into_iter()
            .fold(HoldingsSummary::default(), |mut acc, h| {
                acc.wallets += 1;
                acc.token_balance += h.token_balance;
                acc.sol_spent += h.sol_spent;
                acc
            })
    }
}
