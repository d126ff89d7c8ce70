//! Direct funding: the master wallet pays each target wallet in turn.

use solana_sdk::signature::{Keypair, Signer};
use tracing::{info, instrument};

use crate::errors::{PoolError, PoolResult};
use crate::ledger::{transfer, Ledger};
use crate::progress::{BatchReport, ProgressEvent, ProgressLog, Stage};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::WalletStore;
use crate::wallet::parse_pubkey;

#[derive(Debug, Clone)]
pub struct FundingPlan {
    pub targets: Vec<String>,
    /// Lamports each target receives.
    pub amount_per_target: u64,
    /// Per-transfer fee estimate used for the up-front balance check.
    pub fee_estimate: u64,
}

impl FundingPlan {
    /// Lamports the master needs to cover every transfer and its fee.
    pub fn required_lamports(&self) -> u64 {
        (self.targets.len() as u64).saturating_mul(self.amount_per_target.saturating_add(self.fee_estimate))
    }

    /// Reject bad input before touching the network.
    pub fn validate(&self, store: &WalletStore) -> PoolResult<()> {
        if self.targets.is_empty() {
            return Err(PoolError::validation("targets", "at least one target wallet is required"));
        }
        if self.amount_per_target == 0 {
            return Err(PoolError::validation("amount", "amount per target must be positive"));
        }
        for (i, t) in self.targets.iter().enumerate() {
            parse_pubkey(t)?;
            if store.get(t).is_none() {
                return Err(PoolError::validation("targets", format!("{} is not in the wallet store", t)));
            }
            if self.targets[..i].contains(t) {
                return Err(PoolError::validation("targets", format!("{} is listed twice", t)));
            }
        }
        Ok(())
    }
}

/// Fund every target from `master`, one transfer at a time.
///
/// A target is marked funded with `balance == amount_per_target` only after
/// its transfer confirms. A failed target is reported and skipped; the batch
/// keeps going.
#[instrument(skip_all, fields(targets = plan.targets.len(), amount = plan.amount_per_target))]
pub async fn direct_fund(
    store: &mut WalletStore,
    ledger: &dyn Ledger,
    master: &Keypair,
    plan: &FundingPlan,
    policy: &RetryPolicy,
    mut progress: ProgressLog,
) -> PoolResult<BatchReport> {
    plan.validate(store)?;

    let available = ledger.balance(&master.pubkey()).await?;
    let required = plan.required_lamports();
    if available < required {
        return Err(PoolError::validation(
            "amount",
            format!(
                "master {} holds {} lamports, {} needed",
                master.pubkey(),
                available,
                required
            ),
        ));
    }

    let total = plan.targets.len();
    for (i, target) in plan.targets.iter().enumerate() {
        let to = parse_pubkey(target)?;
        let out = with_retry(policy, "fund", || {
            transfer(ledger, master, &to, plan.amount_per_target)
        })
        .await;

        let (success, signature, error) = match out.result {
            Ok(sig) => {
                store.mark_funded(target, plan.amount_per_target)?;
                (true, Some(sig.to_string()), None)
            }
            Err(e) => (false, None, Some(e.to_string())),
        };
        progress.record(ProgressEvent {
            stage: Stage::Fund,
            step: i + 1,
            total,
            wallet: target.clone(),
            success,
            signature,
            attempts: out.attempts,
            error,
        });
    }

    let report = progress.finish();
    info!(funded = report.succeeded(), failed = report.failed(), "direct funding finished");
    Ok(report)
}
