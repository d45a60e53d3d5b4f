//! sigil-cli — Command-line front end for the Sigil testnet wallet.
//!
//! Derives the wallet from a BIP-39 mnemonic read from `SIGIL_MNEMONIC` or a
//! hidden prompt, talks to an Esplora indexer, and sends, consolidates or
//! inspects transactions.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bitcoin::{Network, Txid};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;

use crate::config::CliConfig;
use sigil_core::constants::DERIVATION_PATH;
use sigil_esplora::EsploraClient;
use sigil_wallet::{BuiltTransaction, SendAmount, SendReceipt, Wallet, WalletEngine};

const MNEMONIC_ENV: &str = "SIGIL_MNEMONIC";
const CLI_USER: &str = "cli";

/// Sigil command-line wallet.
#[derive(Parser)]
#[command(name = "sigil-cli")]
#[command(version, about = "Single-key BIP-84 testnet wallet with spell inspection.")]
struct Cli {
    /// Config file (default: ~/.sigil/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Esplora REST base URL.
    #[arg(long, global = true)]
    esplora_url: Option<String>,

    /// Network (testnet, signet or regtest).
    #[arg(long, global = true)]
    network: Option<String>,

    /// Fee rate in sat/vB.
    #[arg(long, global = true)]
    fee_rate: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new 12-word mnemonic and show its address.
    Generate,
    /// Derive the wallet key from a mnemonic.
    Derive(DeriveArgs),
    /// Show the wallet's receive address.
    Address,
    /// Query the wallet balance from the indexer.
    Balance,
    /// List unspent outputs.
    Utxos,
    /// List recent transactions, newest first.
    History(HistoryArgs),
    /// Send a payment, spending every UTXO.
    Send(SendArgs),
    /// Sweep every UTXO back to the wallet's own address.
    Consolidate(ConsolidateArgs),
    /// Decode a transaction and look for a spell.
    Inspect(InspectArgs),
}

#[derive(Args)]
struct DeriveArgs {
    /// Also print the private key (hex).
    #[arg(long)]
    show_private: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// Maximum number of transactions.
    #[arg(short, long, default_value = "10")]
    limit: usize,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in satoshis.
    #[arg(short, long, conflicts_with = "max", required_unless_present = "max")]
    amount: Option<u64>,

    /// Send everything minus the fee.
    #[arg(long)]
    max: bool,

    /// Build and sign without broadcasting.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ConsolidateArgs {
    /// Build and sign without broadcasting.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Transaction id.
    txid: String,

    /// Print only the spell payload.
    #[arg(long)]
    spell: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = CliConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cfg.apply_overrides(cli.esplora_url.clone(), cli.network.clone(), cli.fee_rate)
        .context("Invalid command-line options")?;
    init_logging(cfg.log_json);
    debug!(esplora = %cfg.esplora_url, network = %cfg.network, fee_rate = cfg.fee_rate, "configuration loaded");

    let network = cfg.network()?;
    match cli.command {
        Commands::Generate => generate(network),
        Commands::Derive(args) => derive(network, args),
        Commands::Address => {
            let wallet = load_wallet(network)?;
            println!("{}", wallet.address());
            Ok(())
        }
        Commands::Balance => balance(&cfg).await,
        Commands::Utxos => utxos(&cfg).await,
        Commands::History(args) => history(&cfg, args).await,
        Commands::Send(args) => send(&cfg, args).await,
        Commands::Consolidate(args) => consolidate(&cfg, args).await,
        Commands::Inspect(args) => inspect(&cfg, args).await,
    }
}

/// Logs go to stderr so command output stays clean on stdout.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn generate(network: Network) -> Result<()> {
    let wallet = Wallet::generate(CLI_USER, network).context("Failed to generate wallet")?;

    println!("\n=== WALLET GENERATED ===");
    println!("Network: {network}");
    println!("Address: {}", wallet.address());
    println!("\nMNEMONIC (BACKUP THIS, 12 WORDS):");
    println!("  {}", wallet.mnemonic());
    println!("\nWARNING: This mnemonic will NOT be shown again.");
    println!("Anyone with it can spend the wallet's funds.");
    Ok(())
}

fn derive(network: Network, args: DeriveArgs) -> Result<()> {
    let wallet = load_wallet(network)?;
    let keys = wallet.keys();

    println!("Path:       {DERIVATION_PATH}");
    println!("Address:    {}", wallet.address());
    println!("Public key: {}", keys.public_key());
    if args.show_private {
        println!("Private key: {}", keys.private_key_hex());
    }
    Ok(())
}

async fn balance(cfg: &CliConfig) -> Result<()> {
    let wallet = load_wallet(cfg.network()?)?;
    let engine = build_engine(cfg)?;
    let balance = engine.balance(&wallet).await.context("Balance lookup failed")?;

    println!("\n=== WALLET BALANCE ===");
    println!("Address:     {}", wallet.address());
    println!("Confirmed:   {} sats", balance.confirmed_sats);
    println!("Unconfirmed: {} sats", balance.unconfirmed_sats);
    println!("Total:       {} sats", balance.total());
    Ok(())
}

async fn utxos(cfg: &CliConfig) -> Result<()> {
    let wallet = load_wallet(cfg.network()?)?;
    let engine = build_engine(cfg)?;
    let utxos = engine.utxos(&wallet).await.context("UTXO lookup failed")?;

    if utxos.is_empty() {
        println!("No UTXOs for {}", wallet.address());
        return Ok(());
    }
    for utxo in &utxos {
        let state = if utxo.confirmed { "confirmed" } else { "unconfirmed" };
        println!("{}:{}  {} sats  {state}", utxo.txid, utxo.vout, utxo.value);
    }
    Ok(())
}

async fn history(cfg: &CliConfig, args: HistoryArgs) -> Result<()> {
    let wallet = load_wallet(cfg.network()?)?;
    let engine = build_engine(cfg)?;
    let txs = engine
        .history(&wallet, args.limit)
        .await
        .context("History lookup failed")?;

    for tx in &txs {
        let height = tx
            .status
            .block_height
            .map_or_else(|| "mempool".to_string(), |h| h.to_string());
        println!("{}  {height:>8}  {} sats out", tx.txid, tx.total_output_value);
    }
    Ok(())
}

async fn send(cfg: &CliConfig, args: SendArgs) -> Result<()> {
    let amount = match (args.max, args.amount) {
        (true, _) => SendAmount::Max,
        (false, Some(sats)) => SendAmount::Exact(sats),
        (false, None) => bail!("Either --amount or --max is required"),
    };
    let wallet = load_wallet(cfg.network()?)?;
    let engine = build_engine(cfg)?;

    if args.dry_run {
        let built = engine
            .build_transaction(&wallet, &args.to, amount)
            .await
            .context("Failed to build transaction")?;
        print_built(&built);
        return Ok(());
    }

    let receipt = engine
        .build_and_send(&wallet, &args.to, amount)
        .await
        .context("Send failed")?;
    print_receipt("TRANSACTION SENT", &args.to, &receipt);
    Ok(())
}

async fn consolidate(cfg: &CliConfig, args: ConsolidateArgs) -> Result<()> {
    let wallet = load_wallet(cfg.network()?)?;
    let engine = build_engine(cfg)?;

    if args.dry_run {
        let own = wallet.address().to_string();
        let built = engine
            .build_transaction(&wallet, &own, SendAmount::Max)
            .await
            .context("Failed to build consolidation")?;
        print_built(&built);
        return Ok(());
    }

    let receipt = engine
        .self_transfer(&wallet)
        .await
        .context("Consolidation failed")?;
    print_receipt("UTXOS CONSOLIDATED", &wallet.address().to_string(), &receipt);
    Ok(())
}

async fn inspect(cfg: &CliConfig, args: InspectArgs) -> Result<()> {
    let txid = Txid::from_str(args.txid.trim()).context("Invalid txid")?;
    let engine = build_engine(cfg)?;
    let parsed = engine
        .inspect_transaction(&txid)
        .await
        .context("Inspection failed")?;

    if args.spell {
        let spell = parsed.require_spell().context("No spell in transaction")?;
        println!("{}", serde_json::to_string_pretty(spell.as_value())?);
    } else {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    }
    Ok(())
}

fn print_built(built: &BuiltTransaction) {
    let signed = &built.signed;
    println!("\n=== TRANSACTION BUILT (NOT BROADCAST) ===");
    println!("TxID:   {}", signed.txid());
    println!("Inputs: {}", built.selection.selected.len());
    println!("Amount: {} sats", built.selection.send_amount);
    println!("Fee:    {} sats ({} vB)", signed.fee(), signed.vsize());
    if built.selection.has_change() {
        println!("Change: {} sats", built.selection.change);
    }
    println!("\n{}", signed.raw_hex());
}

fn print_receipt(title: &str, to: &str, receipt: &SendReceipt) {
    println!("\n=== {title} ===");
    println!("TxID:   {}", receipt.txid);
    println!("To:     {to}");
    println!("Amount: {} sats", receipt.sent_amount);
    println!("Fee:    {} sats ({} vB)", receipt.fee, receipt.vsize);
    if receipt.change > 0 {
        println!("Change: {} sats", receipt.change);
    }
}

fn build_engine(cfg: &CliConfig) -> Result<WalletEngine> {
    let client = Arc::new(
        EsploraClient::new(&cfg.esplora_url, cfg.timeout()).context("Failed to create HTTP client")?,
    );
    Ok(WalletEngine::new(client.clone(), client, cfg.engine_config()?))
}

/// Restore the wallet from `SIGIL_MNEMONIC`, or prompt for the phrase.
fn load_wallet(network: Network) -> Result<Wallet> {
    let phrase = match std::env::var(MNEMONIC_ENV) {
        Ok(phrase) if !phrase.trim().is_empty() => phrase,
        _ => rpassword::prompt_password("Mnemonic: ").context("Failed to read mnemonic")?,
    };
    Wallet::import(CLI_USER, &phrase, network).context("Invalid mnemonic")
}
