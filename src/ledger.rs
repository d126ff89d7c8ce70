//! Ledger access: balances, blockhashes, simulation and submission.
//!
//! [`Ledger`] is the seam the funding and trading code talk through, so tests
//! can inject an in-memory chain. [`RpcLedger`] is the production client.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use tracing::{debug, info, warn};

use crate::errors::{PoolError, PoolResult};

/// Result of a pre-submission simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    /// Failure reason, `None` when the transaction would succeed.
    pub err: Option<String>,
    pub logs: Vec<String>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Lamport balance of an account; zero for accounts that do not exist.
    async fn balance(&self, pubkey: &Pubkey) -> PoolResult<u64>;

    /// Raw token balance `owner` holds of `mint`; zero without a token account.
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> PoolResult<u64>;

    async fn latest_blockhash(&self) -> PoolResult<Hash>;

    async fn simulate(&self, tx: &VersionedTransaction) -> PoolResult<SimulationOutcome>;

    /// Submit and wait for confirmation.
    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> PoolResult<Signature>;
}

pub struct RpcLedger {
    client: RpcClient,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("url", &self.client.url())
            .finish()
    }
}

impl RpcLedger {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed()),
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn balance(&self, pubkey: &Pubkey) -> PoolResult<u64> {
        Ok(self.client.get_balance(pubkey).await?)
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> PoolResult<u64> {
        let ata = get_associated_token_address(owner, mint);
        match self.client.get_token_account_balance(&ata).await {
            Ok(amount) => amount
                .amount
                .parse::<u64>()
                .map_err(|e| PoolError::network(format!("bad token amount {}: {}", amount.amount, e))),
            Err(e) => {
                // a missing token account is an empty balance, not a failure
                let msg = e.to_string();
                if msg.contains("could not find account") || msg.contains("Invalid param") {
                    debug!(%owner, %mint, "no token account");
                    Ok(0)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn latest_blockhash(&self) -> PoolResult<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> PoolResult<SimulationOutcome> {
        let resp = self.client.simulate_transaction(tx).await?;
        Ok(SimulationOutcome {
            err: resp.value.err.map(|e| format!("{:?}", e)),
            logs: resp.value.logs.unwrap_or_default(),
        })
    }

    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> PoolResult<Signature> {
        self.client
            .send_and_confirm_transaction(tx)
            .await
            .map_err(|e| PoolError::transaction(format!("send/confirm failed: {}", e)))
    }
}

/// Simulate `tx`, and only submit it if the simulation passes.
///
/// A rejected simulation becomes [`PoolError::Simulation`] with the program
/// logs attached; the transaction is never sent.
pub async fn submit_checked(ledger: &dyn Ledger, tx: &VersionedTransaction) -> PoolResult<Signature> {
    let sim = ledger.simulate(tx).await?;
    if let Some(reason) = sim.err {
        warn!(%reason, logs = sim.logs.len(), "simulation rejected transaction");
        return Err(PoolError::simulation(reason, sim.logs));
    }
    let sig = ledger.send_and_confirm(tx).await?;
    debug!(%sig, "transaction confirmed");
    Ok(sig)
}

/// Build and sign a plain SOL transfer.
pub fn build_transfer(
    from: &Keypair,
    to: &Pubkey,
    lamports: u64,
    blockhash: Hash,
) -> PoolResult<VersionedTransaction> {
    let ix = system_instruction::transfer(&from.pubkey(), to, lamports);
    let mut message = Message::new(&[ix], Some(&from.pubkey()));
    message.recent_blockhash = blockhash;
    VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[from])
        .map_err(|e| PoolError::transaction(format!("signing transfer failed: {}", e)))
}

/// Send `lamports` from `from` to `to`: fetch a blockhash, sign, simulate, submit.
pub async fn transfer(
    ledger: &dyn Ledger,
    from: &Keypair,
    to: &Pubkey,
    lamports: u64,
) -> PoolResult<Signature> {
    if lamports == 0 {
        return Err(PoolError::validation("amount", "transfer amount must be positive"));
    }
    let blockhash = ledger.latest_blockhash().await?;
    let tx = build_transfer(from, to, lamports, blockhash)?;
    let sig = submit_checked(ledger, &tx).await?;
    info!(from = %from.pubkey(), %to, lamports, %sig, "transfer confirmed");
    Ok(sig)
}

/// Re-sign a prebuilt transaction (e.g. from the swap API) with `signer`.
pub fn sign_prebuilt(tx: VersionedTransaction, signer: &Keypair) -> PoolResult<VersionedTransaction> {
    VersionedTransaction::try_new(tx.message, &[signer])
        .map_err(|e| PoolError::transaction(format!("signing swap failed: {}", e)))
}
