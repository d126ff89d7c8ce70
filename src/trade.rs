//! Swap execution for pool wallets: buy a token with SOL, or sell a token
//! position back to SOL.
//!
//! Every swap goes quote -> prebuilt transaction -> local signature ->
//! simulation -> submission. One wallet failing never stops the batch.

use std::time::Duration;

use solana_sdk::signature::{Keypair, Signature, Signer};
use tokio::time::sleep;
use tracing::{info, instrument};

use crate::config::SOL_MINT;
use crate::errors::{PoolError, PoolResult};
use crate::ledger::{sign_prebuilt, submit_checked, Ledger};
use crate::progress::{BatchReport, ProgressEvent, ProgressLog, Stage};
use crate::retry::{with_retry, Attempted, RetryPolicy};
use crate::store::WalletStore;
use crate::swap::{Quote, SwapApi};
use crate::wallet::parse_pubkey;

/// Pause bounds between consecutive swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn pause(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = (self.max - self.min).as_millis() as u64;
        self.min + Duration::from_millis(fastrand::u64(0..=span))
    }
}

#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub signature: Signature,
    pub quote: Quote,
}

/// Quote, build, sign and submit one swap for `owner`.
pub async fn execute_swap(
    ledger: &dyn Ledger,
    swap: &dyn SwapApi,
    owner: &Keypair,
    input_mint: &str,
    output_mint: &str,
    amount: u64,
    slippage_bps: u16,
) -> PoolResult<SwapOutcome> {
    let quote = swap.quote(input_mint, output_mint, amount, slippage_bps).await?;
    let unsigned = swap.swap_transaction(&quote, &owner.pubkey()).await?;
    let tx = sign_prebuilt(unsigned, owner)?;
    let signature = submit_checked(ledger, &tx).await?;
    Ok(SwapOutcome { signature, quote })
}

#[derive(Debug, Clone)]
pub struct BuyPlan {
    pub mint: String,
    /// Lamports spent across all wallets.
    pub total_lamports: u64,
    /// How many funded wallets take part.
    pub wallet_count: usize,
    pub slippage_bps: u16,
}

impl BuyPlan {
    pub fn per_wallet(&self) -> u64 {
        if self.wallet_count == 0 {
            return 0;
        }
        self.total_lamports / self.wallet_count as u64
    }

    pub fn validate(&self, store: &WalletStore) -> PoolResult<()> {
        parse_pubkey(&self.mint)?;
        if self.wallet_count == 0 {
            return Err(PoolError::validation("walletCount", "must be at least 1"));
        }
        if self.per_wallet() == 0 {
            return Err(PoolError::validation("amount", "total is too small to split"));
        }
        let funded = store.funded().len();
        if funded < self.wallet_count {
            return Err(PoolError::validation(
                "walletCount",
                format!("{} funded wallets available, {} requested", funded, self.wallet_count),
            ));
        }
        Ok(())
    }
}

/// Buy `plan.mint` with an equal share of the total from each of the first
/// `wallet_count` funded wallets, in store order.
#[instrument(skip_all, fields(mint = %plan.mint, wallets = plan.wallet_count))]
pub async fn buy(
    store: &mut WalletStore,
    ledger: &dyn Ledger,
    swap: &dyn SwapApi,
    plan: &BuyPlan,
    policy: &RetryPolicy,
    pacing: Pacing,
    mut progress: ProgressLog,
) -> PoolResult<BatchReport> {
    plan.validate(store)?;

    let amount = plan.per_wallet();
    let wallets: Vec<_> = store
        .funded()
        .into_iter()
        .take(plan.wallet_count)
        .cloned()
        .collect();
    let total = wallets.len();

    for (i, wallet) in wallets.iter().enumerate() {
        let out = match wallet.keypair() {
            Ok(owner) => {
                with_retry(policy, "buy", || {
                    execute_swap(ledger, swap, &owner, SOL_MINT, &plan.mint, amount, plan.slippage_bps)
                })
                .await
            }
            Err(e) => Attempted { result: Err(e), attempts: 0 },
        };

        let (success, signature, error) = match out.result {
            Ok(done) => {
                store.upsert_holding(&wallet.public_key, &plan.mint, done.quote.out_amount, amount);
                (true, Some(done.signature.to_string()), None)
            }
            Err(e) => (false, None, Some(e.to_string())),
        };
        progress.record(ProgressEvent {
            stage: Stage::Buy,
            step: i + 1,
            total,
            wallet: wallet.public_key.clone(),
            success,
            signature,
            attempts: out.attempts,
            error,
        });

        if i + 1 < total {
            sleep(pacing.pause()).await;
        }
    }

    let report = progress.finish();
    info!(bought = report.succeeded(), failed = report.failed(), "buy finished");
    Ok(report)
}

/// Sell every wallet's full on-chain balance of `mint` back to SOL.
///
/// Wallets holding none of the token are skipped without an event. A
/// wallet's holding row is removed only when its sell confirms.
#[instrument(skip_all, fields(mint = %mint))]
pub async fn sell_all(
    store: &mut WalletStore,
    ledger: &dyn Ledger,
    swap: &dyn SwapApi,
    mint: &str,
    slippage_bps: u16,
    policy: &RetryPolicy,
    pacing: Pacing,
    mut progress: ProgressLog,
) -> PoolResult<BatchReport> {
    let mint_key = parse_pubkey(mint)?;

    let mut positions = Vec::new();
    for wallet in store.wallets() {
        let owner = wallet.pubkey()?;
        match ledger.token_balance(&owner, &mint_key).await {
            Ok(0) => {}
            Ok(balance) => positions.push((wallet.clone(), balance)),
            Err(e) => progress.record(ProgressEvent {
                stage: Stage::Sell,
                step: 0,
                total: 0,
                wallet: wallet.public_key.clone(),
                success: false,
                signature: None,
                attempts: 1,
                error: Some(format!("balance lookup failed: {}", e)),
            }),
        }
    }

    let total = positions.len();
    for (i, (wallet, balance)) in positions.iter().enumerate() {
        let out = match wallet.keypair() {
            Ok(owner) => {
                with_retry(policy, "sell", || {
                    execute_swap(ledger, swap, &owner, mint, SOL_MINT, *balance, slippage_bps)
                })
                .await
            }
            Err(e) => Attempted { result: Err(e), attempts: 0 },
        };

        let (success, signature, error) = match out.result {
            Ok(done) => {
                store.remove_holding(&wallet.public_key, mint);
                (true, Some(done.signature.to_string()), None)
            }
            Err(e) => (false, None, Some(e.to_string())),
        };
        progress.record(ProgressEvent {
            stage: Stage::Sell,
            step: i + 1,
            total,
            wallet: wallet.public_key.clone(),
            success,
            signature,
            attempts: out.attempts,
            error,
        });

        if i + 1 < total {
            sleep(pacing.pause()).await;
        }
    }

    let report = progress.finish();
    info!(sold = report.succeeded(), failed = report.failed(), "sell finished");
    Ok(report)
}
