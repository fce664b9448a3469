use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{
    commit_pending,
    constants::{DEFAULT_CHAIN_NAME, DEFAULT_DIFFICULTY, DEFAULT_MAX_MINING_MS},
    Chain, ChainConfig, ChainSummary, Record,
};
use ledger_storage::SledStore;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger")]
#[command(about = "Tamper-evident record ledger sealed by proof of work")]
struct Cli {
    /// Data directory for sled
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Display name of the chain
    #[arg(long, global = true, default_value = DEFAULT_CHAIN_NAME)]
    name: String,

    /// Leading zero hex digits required of new blocks
    #[arg(long, global = true, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Give up sealing a block after this many milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_MINING_MS)]
    max_mining_ms: u64,

    /// Search nonces on all cores
    #[arg(long, global = true)]
    parallel: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the chain, mining a genesis block if the store is empty
    Init,
    /// Queue records from a JSON array of flat rows
    Ingest {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Seal every pending record into its own block
    Commit {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the chain
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-derive every block hash and link
    Verify,
}

impl Cli {
    fn config(&self) -> ChainConfig {
        ChainConfig {
            name: self.name.clone(),
            difficulty: self.difficulty,
            max_mining_ms: self.max_mining_ms,
            parallel: self.parallel,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    // mining is CPU bound; keep it off the async workers
    tokio::task::spawn_blocking(move || run(cli)).await?
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    let store = Arc::new(SledStore::open(&cli.data_dir)?);

    match cli.cmd {
        Command::Init => {
            let chain = Chain::init(store, config)?;
            print_summary(&chain.summary());
        }
        Command::Ingest { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let records: Vec<Record> = serde_json::from_str(&text)
                .with_context(|| format!("parsing records from {}", file.display()))?;
            let inserted = store.put_records(&records)?;
            info!(file = %file.display(), total = records.len(), inserted, "records queued");
            println!("queued {inserted} of {} records", records.len());
        }
        Command::Commit { json } => {
            let mut chain = Chain::init(store.clone(), config)?;
            let report = commit_pending(&mut chain, store.as_ref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for (id, index) in &report.committed {
                    println!("record {id} -> block {index}");
                }
                for (id, reason) in &report.skipped {
                    println!("record {id} skipped: {reason}");
                }
                print_summary(&chain.summary());
            }
        }
        Command::Show { json } => {
            let chain = Chain::load(store, config)?;
            let summary = chain.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Command::Verify => {
            let chain = Chain::load(store, config)?;
            chain.verify_integrity()?;
            println!("chain ok: {} blocks", chain.len());
        }
    }
    Ok(())
}

fn print_summary(summary: &ChainSummary) {
    println!("Blockchain Name: {}", summary.name);
    println!("Total Blocks: {}", summary.length);
    println!("Chain:");
    for block in &summary.blocks {
        match serde_json::to_string_pretty(block) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{block:?}"),
        }
    }
}
