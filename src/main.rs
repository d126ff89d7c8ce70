//! Command-line entry: manage the wallet pool, fund it, and trade with it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wallet_pool::config::{Settings, LAMPORTS_PER_SOL};
use wallet_pool::funding::{direct_fund, FundingPlan};
use wallet_pool::ledger::RpcLedger;
use wallet_pool::metadata::MetadataClient;
use wallet_pool::progress::{BatchReport, ProgressLog, ProgressReceiver};
use wallet_pool::store::{FallbackBackend, FileBackend, HttpBackend, WalletBackend, WalletStore};
use wallet_pool::swap::JupiterClient;
use wallet_pool::trade::{buy, sell_all, BuyPlan, Pacing};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate new wallets
    Generate {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// List wallets with their last known balances
    List,
    /// Re-read every wallet balance from the ledger
    Refresh,
    /// Print all wallets as JSON
    Export,
    /// Import wallets from a JSON export or a file of secret keys
    Import { path: String },
    /// Delete one wallet, or all of them
    Delete {
        #[arg(long)]
        public_key: Option<String>,
    },
    /// Send SOL from the master wallet to unfunded wallets
    Fund {
        /// SOL per wallet
        #[arg(long)]
        amount: f64,
        /// How many unfunded wallets to fund
        #[arg(long)]
        count: usize,
    },
    /// Buy a token, splitting the total evenly over funded wallets
    Buy {
        #[arg(long)]
        mint: String,
        /// Total SOL to spend
        #[arg(long)]
        total: f64,
        #[arg(long)]
        wallets: usize,
    },
    /// Sell every wallet's balance of a token
    Sell {
        #[arg(long)]
        mint: String,
    },
    /// Show token metadata and a price estimate
    Token {
        #[arg(long)]
        mint: String,
        /// SOL to estimate the token output for
        #[arg(long, default_value_t = 0.1)]
        sol: f64,
    },
}

fn sol_to_lamports(sol: f64) -> anyhow::Result<u64> {
    anyhow::ensure!(sol.is_finite() && sol > 0.0, "amount must be a positive number of SOL");
    Ok((sol * LAMPORTS_PER_SOL as f64).round() as u64)
}

async fn open_store(settings: &Settings) -> anyhow::Result<WalletStore> {
    let file: Arc<dyn WalletBackend> = Arc::new(FileBackend::new(&settings.wallet_file));
    let backend: Arc<dyn WalletBackend> = match &settings.wallet_api_url {
        Some(url) => Arc::new(FallbackBackend::new(Arc::new(HttpBackend::new(url)), file)),
        None => file,
    };
    Ok(WalletStore::open(backend).await?)
}

fn live_progress() -> (ProgressLog, tokio::task::JoinHandle<()>) {
    let (tx, mut rx): (_, ProgressReceiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let status = if ev.success { "ok" } else { "FAILED" };
            let detail = ev.signature.as_ref().or(ev.error.as_ref()).cloned().unwrap_or_default();
            println!(
                "[{}/{}] {:?} {} {} {}",
                ev.step, ev.total, ev.stage, ev.wallet, status, detail
            );
        }
    });
    (ProgressLog::with_channel(tx), printer)
}

fn summarize(label: &str, report: &BatchReport) {
    println!("{}: {}/{} succeeded", label, report.succeeded(), report.total());
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).context("loading settings")?;
    info!(
        rpc = %settings.rpc_url,
        slippage_bps = settings.slippage_bps,
        wallet_file = %settings.wallet_file,
        "settings loaded"
    );

    let mut store = open_store(&settings).await?;
    let ledger = RpcLedger::new(&settings.rpc_url);
    let policy = settings.retry_policy();

    match cli.command {
        Command::Generate { count } => {
            for w in store.generate(count) {
                println!("{:>4} {}", w.index, w.public_key);
            }
        }
        Command::List => {
            for w in store.wallets() {
                println!(
                    "{:>4} {} funded={} {:.6} SOL",
                    w.index,
                    w.public_key,
                    w.funded,
                    w.balance as f64 / LAMPORTS_PER_SOL as f64
                );
            }
        }
        Command::Refresh => {
            let n = store.refresh_balances(&ledger).await?;
            println!("refreshed {} of {} wallets", n, store.len());
        }
        Command::Export => println!("{}", store.export_json()?),
        Command::Import { path } => {
            let data = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path))?;
            let added = store.import(&data)?;
            println!("imported {} wallets", added.len());
        }
        Command::Delete { public_key } => match public_key {
            Some(pk) => store.remove(&pk).await?,
            None => store.clear().await?,
        },
        Command::Fund { amount, count } => {
            let master = settings.master_keypair()?;
            let targets: Vec<String> = store
                .wallets()
                .iter()
                .filter(|w| !w.funded)
                .take(count)
                .map(|w| w.public_key.clone())
                .collect();
            let plan = FundingPlan {
                targets,
                amount_per_target: sol_to_lamports(amount)?,
                fee_estimate: settings.fee_estimate_lamports,
            };
            let (progress, printer) = live_progress();
            let report = direct_fund(&mut store, &ledger, &master, &plan, &policy, progress).await;
            printer.await.ok();
            summarize("funded", &report?);
        }
        Command::Buy { mint, total, wallets } => {
            let swap = JupiterClient::new(&settings.swap_api_url);
            let plan = BuyPlan {
                mint,
                total_lamports: sol_to_lamports(total)?,
                wallet_count: wallets,
                slippage_bps: settings.slippage_bps,
            };
            let pacing = Pacing {
                min: Duration::from_millis(settings.buy_delay_min_ms),
                max: Duration::from_millis(settings.buy_delay_max_ms),
            };
            let (progress, printer) = live_progress();
            let report = buy(&mut store, &ledger, &swap, &plan, &policy, pacing, progress).await;
            printer.await.ok();
            summarize("bought", &report?);
        }
        Command::Sell { mint } => {
            let swap = JupiterClient::new(&settings.swap_api_url);
            let pacing = Pacing::fixed(Duration::from_millis(settings.sell_delay_ms));
            let (progress, printer) = live_progress();
            let report = sell_all(
                &mut store,
                &ledger,
                &swap,
                &mint,
                settings.slippage_bps,
                &policy,
                pacing,
                progress,
            )
            .await;
            printer.await.ok();
            summarize("sold", &report?);
        }
        Command::Token { mint, sol } => {
            let client = MetadataClient::new(&settings.metadata_api_url, &settings.metadata_fallback_url);
            let info = client.coin(&mint).await?;
            let lamports = sol_to_lamports(sol)?;
            println!("{} ({})", info.name, info.symbol);
            println!("market cap: {:.2} SOL", info.market_cap);
            println!("price: {:.12} lamports/unit", info.spot_price());
            println!("{} SOL buys ~{} units", sol, info.estimate_tokens_out(lamports));
        }
    }

    store.flush().await?;
    Ok(())
}
