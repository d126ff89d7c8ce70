mod common;

use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use common::{MockLedger, MockSwap};
use wallet_pool::config::SOL_MINT;
use wallet_pool::errors::ErrorCategory;
use wallet_pool::progress::{ProgressLog, Stage};
use wallet_pool::retry::RetryPolicy;
use wallet_pool::store::WalletStore;
use wallet_pool::trade::{buy, sell_all, BuyPlan, Pacing};
use wallet_pool::wallet::parse_pubkey;

fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

fn funded_store(n: usize) -> (WalletStore, Vec<String>) {
    let mut store = WalletStore::in_memory();
    let keys: Vec<String> = store.generate(n).into_iter().map(|w| w.public_key).collect();
    for k in &keys {
        store.mark_funded(k, 100_000_000).unwrap();
    }
    (store, keys)
}

fn buy_plan(mint: &Pubkey, total: u64, wallets: usize) -> BuyPlan {
    BuyPlan {
        mint: mint.to_string(),
        total_lamports: total,
        wallet_count: wallets,
        slippage_bps: 500,
    }
}

#[tokio::test]
async fn buy_splits_total_evenly_and_records_holdings() {
    let (mut store, keys) = funded_store(4);
    let ledger = MockLedger::default();
    let swap = MockSwap::default();
    let mint = Pubkey::new_unique();

    let report = buy(
        &mut store,
        &ledger,
        &swap,
        &buy_plan(&mint, 90_000_000, 3),
        &policy(),
        Pacing::none(),
        ProgressLog::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded(), 3);
    assert!(report.events().all(|e| e.stage == Stage::Buy));
    let quotes = swap.quotes.lock().unwrap().clone();
    assert_eq!(quotes.len(), 3);
    for (input, output, amount) in &quotes {
        assert_eq!(input, SOL_MINT);
        assert_eq!(output, &mint.to_string());
        assert_eq!(*amount, 30_000_000);
    }

    let summary = store.holdings_summary(&mint.to_string());
    assert_eq!(summary.wallets, 3);
    assert_eq!(summary.sol_spent, 90_000_000);
    assert_eq!(summary.token_balance, 90_000_000_000);
    let rows = store.holdings_for(&mint.to_string());
    let total: u64 = rows.iter().map(|h| h.token_balance).sum();
    assert_eq!(total, summary.token_balance);
    // fourth wallet was not used
    assert!(store.holding(&keys[3], &mint.to_string()).is_none());
}

#[tokio::test]
async fn quote_404_fails_that_wallet_and_moves_on() {
    let (mut store, keys) = funded_store(3);
    let ledger = MockLedger::default();
    let swap = MockSwap::failing_next(1);
    let mint = Pubkey::new_unique();

    let report = buy(
        &mut store,
        &ledger,
        &swap,
        &buy_plan(&mint, 3_000_000, 3),
        &policy(),
        Pacing::none(),
        ProgressLog::new(),
    )
    .await
    .expect("a failed quote must not abort the batch");

    assert_eq!(report.total(), 3);
    let first = &report.events[0];
    assert_eq!(first.wallet, keys[0]);
    assert!(!first.success);
    assert_eq!(first.attempts, 1);
    assert!(first.error.as_deref().unwrap().contains("404"));
    assert!(report.events[1].success);
    assert!(report.events[2].success);
    assert!(store.holding(&keys[0], &mint.to_string()).is_none());
    assert_eq!(ledger.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn simulation_failure_skips_submit_and_reports_logs() {
    let (mut store, keys) = funded_store(3);
    let ledger = MockLedger::default();
    let rejected = parse_pubkey(&keys[1]).unwrap();
    ledger.reject(rejected);
    let swap = MockSwap::default();
    let mint = Pubkey::new_unique();

    let report = buy(
        &mut store,
        &ledger,
        &swap,
        &buy_plan(&mint, 3_000_000, 3),
        &policy(),
        Pacing::none(),
        ProgressLog::new(),
    )
    .await
    .unwrap();

    let ev = &report.events[1];
    assert!(!ev.success);
    assert_eq!(ev.attempts, 1);
    assert!(ev.error.as_deref().unwrap().contains("Program log: Error: insufficient funds"));
    assert!(!ledger.sent_payers().contains(&rejected));
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test]
async fn buy_rejects_bad_plans_before_network() {
    let (mut store, _) = funded_store(2);
    let ledger = MockLedger::default();
    let swap = MockSwap::default();
    let mint = Pubkey::new_unique();

    for plan in [
        buy_plan(&mint, 1_000, 3),
        buy_plan(&mint, 1_000, 0),
        buy_plan(&mint, 1, 2),
        BuyPlan {
            mint: "bogus".into(),
            ..buy_plan(&mint, 1_000, 1)
        },
    ] {
        let err = buy(&mut store, &ledger, &swap, &plan, &policy(), Pacing::none(), ProgressLog::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
    assert_eq!(ledger.call_count(), 0);
    assert!(swap.quotes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sell_only_touches_wallets_holding_the_token() {
    let (mut store, keys) = funded_store(3);
    let ledger = MockLedger::default();
    let swap = MockSwap::default();
    let mint = Pubkey::new_unique();
    let m = mint.to_string();

    for k in &keys {
        store.upsert_holding(k, &m, 5_000, 5);
    }
    ledger.set_token_balance(parse_pubkey(&keys[0]).unwrap(), mint, 5_000);
    ledger.set_token_balance(parse_pubkey(&keys[2]).unwrap(), mint, 7_000);

    let report = sell_all(
        &mut store,
        &ledger,
        &swap,
        &m,
        500,
        &policy(),
        Pacing::none(),
        ProgressLog::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.total(), 2);
    assert_eq!(report.succeeded(), 2);
    assert!(report.events().all(|e| e.stage == Stage::Sell));

    let quotes = swap.quotes.lock().unwrap().clone();
    assert_eq!(quotes, vec![(m.clone(), SOL_MINT.to_string(), 5_000), (m.clone(), SOL_MINT.to_string(), 7_000)]);

    assert!(store.holding(&keys[0], &m).is_none());
    assert!(store.holding(&keys[2], &m).is_none());
    // no on-chain balance, so its row is left alone
    assert!(store.holding(&keys[1], &m).is_some());
}

#[tokio::test]
async fn failed_sell_keeps_the_holding() {
    let (mut store, keys) = funded_store(2);
    let ledger = MockLedger::default();
    let swap = MockSwap::default();
    let mint = Pubkey::new_unique();
    let m = mint.to_string();

    for k in &keys {
        store.upsert_holding(k, &m, 1_000, 1);
        ledger.set_token_balance(parse_pubkey(k).unwrap(), mint, 1_000);
    }
    ledger.reject(parse_pubkey(&keys[0]).unwrap());

    let report = sell_all(
        &mut store,
        &ledger,
        &swap,
        &m,
        500,
        &policy(),
        Pacing::none(),
        ProgressLog::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert!(store.holding(&keys[0], &m).is_some());
    assert!(store.holding(&keys[1], &m).is_none());
    assert_eq!(store.holdings_summary(&m).token_balance, 1_000);
}
