#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::{
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    system_instruction, system_program,
    transaction::VersionedTransaction,
};

use wallet_pool::errors::{PoolError, PoolResult};
use wallet_pool::ledger::{Ledger, SimulationOutcome};
use wallet_pool::swap::{Quote, SwapApi};

/// In-memory chain: applies system transfers to a balance map.
#[derive(Default)]
pub struct MockLedger {
    pub balances: Mutex<HashMap<Pubkey, u64>>,
    pub token_balances: Mutex<HashMap<(Pubkey, Pubkey), u64>>,
    /// Remaining send failures per destination account.
    pub send_failures: Mutex<HashMap<Pubkey, u32>>,
    /// Simulation rejects any transaction touching these accounts.
    pub rejected: Mutex<HashSet<Pubkey>>,
    pub sent: Mutex<Vec<VersionedTransaction>>,
    pub calls: Mutex<u32>,
}

impl MockLedger {
    pub fn with_balance(pubkey: Pubkey, lamports: u64) -> Self {
        let ledger = Self::default();
        ledger.balances.lock().unwrap().insert(pubkey, lamports);
        ledger
    }

    pub fn fail_sends_to(&self, dest: Pubkey, times: u32) {
        self.send_failures.lock().unwrap().insert(dest, times);
    }

    pub fn reject(&self, account: Pubkey) {
        self.rejected.lock().unwrap().insert(account);
    }

    pub fn set_token_balance(&self, owner: Pubkey, mint: Pubkey, amount: u64) {
        self.token_balances.lock().unwrap().insert((owner, mint), amount);
    }

    pub fn balance_of(&self, pubkey: &Pubkey) -> u64 {
        self.balances.lock().unwrap().get(pubkey).copied().unwrap_or(0)
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    /// Accounts that paid for submitted transactions.
    pub fn sent_payers(&self) -> Vec<Pubkey> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|tx| tx.message.static_account_keys()[0])
            .collect()
    }

    fn touch(&self) {
        *self.calls.lock().unwrap() += 1;
    }

    fn apply_transfers(&self, tx: &VersionedTransaction) {
        let keys = tx.message.static_account_keys();
        let mut balances = self.balances.lock().unwrap();
        for ix in tx.message.instructions() {
            let program = keys[ix.program_id_index as usize];
            if program != system_program::id() || ix.data.len() < 12 || ix.data[0] != 2 {
                continue;
            }
            let lamports = u64::from_le_bytes(ix.data[4..12].try_into().unwrap());
            let from = keys[ix.accounts[0] as usize];
            let to = keys[ix.accounts[1] as usize];
            let src = balances.entry(from).or_insert(0);
            *src = src.saturating_sub(lamports);
            *balances.entry(to).or_insert(0) += lamports;
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn balance(&self, pubkey: &Pubkey) -> PoolResult<u64> {
        self.touch();
        Ok(self.balance_of(pubkey))
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> PoolResult<u64> {
        self.touch();
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&(*owner, *mint))
            .copied()
            .unwrap_or(0))
    }

    async fn latest_blockhash(&self) -> PoolResult<Hash> {
        self.touch();
        Ok(Hash::new_unique())
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> PoolResult<SimulationOutcome> {
        self.touch();
        let rejected = self.rejected.lock().unwrap();
        if tx.message.static_account_keys().iter().any(|k| rejected.contains(k)) {
            return Ok(SimulationOutcome {
                err: Some("InstructionError(0, Custom(1))".to_string()),
                logs: vec!["Program log: Error: insufficient funds".to_string()],
            });
        }
        Ok(SimulationOutcome::default())
    }

    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> PoolResult<Signature> {
        self.touch();
        let keys = tx.message.static_account_keys();
        if let Some(dest) = keys.get(1) {
            let mut failures = self.send_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(dest) {
                if *left > 0 {
                    *left -= 1;
                    return Err(PoolError::network("node is behind"));
                }
            }
        }
        self.apply_transfers(tx);
        self.sent.lock().unwrap().push(tx.clone());
        Ok(tx.signatures[0])
    }
}

/// Account receiving the mock "swap" payment.
pub fn pool_account() -> Pubkey {
    Pubkey::new_from_array([7u8; 32])
}

/// Aggregator stub: quotes 1000 token units per lamport.
#[derive(Default)]
pub struct MockSwap {
    /// The next N quotes answer 404.
    pub quote_404s: Mutex<u32>,
    pub quotes: Mutex<Vec<(String, String, u64)>>,
}

impl MockSwap {
    pub fn failing_next(n: u32) -> Self {
        let swap = Self::default();
        *swap.quote_404s.lock().unwrap() = n;
        swap
    }
}

#[async_trait]
impl SwapApi for MockSwap {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        _slippage_bps: u16,
    ) -> PoolResult<Quote> {
        {
            let mut n = self.quote_404s.lock().unwrap();
            if *n > 0 {
                *n -= 1;
                return Err(PoolError::http_status(404, "quote failed with 404: token not found"));
            }
        }
        self.quotes
            .lock()
            .unwrap()
            .push((input_mint.to_string(), output_mint.to_string(), amount));
        Quote::from_value(json!({
            "inAmount": amount.to_string(),
            "outAmount": (amount * 1_000).to_string(),
        }))
    }

    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> PoolResult<VersionedTransaction> {
        let ix = system_instruction::transfer(user, &pool_account(), quote.in_amount.max(1));
        let message = Message::new_with_blockhash(&[ix], Some(user), &Hash::new_unique());
        Ok(VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        })
    }
}
