//! ledgerdb CLI
//!
//! Maintenance and sync front-end for a ledgerdb data directory.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ledgerdb::sync::LocalStore;
use ledgerdb::{Config, Database, DirectoryRemote, PullMode, Result, SyncOutcome, Synchronizer};
use tracing_subscriber::{fmt, EnvFilter};

/// ledgerdb CLI
#[derive(Parser, Debug)]
#[command(name = "ledgerdb-cli")]
#[command(about = "Inspect, maintain and synchronize a ledgerdb store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./ledgerdb_data")]
    data_dir: String,

    /// Records per partition file
    #[arg(short = 'p', long, default_value = "256")]
    partition_size: usize,

    /// Remote store directory (sync commands)
    #[arg(short, long)]
    remote: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show table sizes
    Stats,

    /// List invoices, newest first
    Invoices {
        /// Only invoices dated YYYY-MM-DD
        #[arg(long)]
        on: Option<NaiveDate>,
    },

    /// Verify counters and joins
    Check,

    /// Compact every table into full partitions
    Repartition,

    /// Record local file changes in the manifest
    Commit,

    /// Compare local and remote manifests
    Status,

    /// Upload local changes
    Push {
        /// Overwrite the remote even on conflict
        #[arg(long)]
        force: bool,
    },

    /// Download remote changes
    Pull {
        /// Overwrite local state even on conflict
        #[arg(long, conflicts_with = "keep_base")]
        force: bool,

        /// Force, but keep the local base version
        #[arg(long)]
        keep_base: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    tracing::debug!("ledgerdb CLI v{}", ledgerdb::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_partition_size(args.partition_size)
        .build();

    if let Err(e) = run(&args, config) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: Config) -> Result<()> {
    match &args.command {
        Commands::Stats => {
            let mut db = Database::open(config)?;
            let stats = db.stats()?;
            println!("invoices (counter): {}", stats.invoice_count);
            for table in stats.tables {
                println!(
                    "{:<24} {:>8} records {:>6} partitions",
                    table.table, table.records, table.partitions
                );
            }
        }
        Commands::Invoices { on } => {
            let mut db = Database::open(config)?;
            let invoices = match on {
                Some(date) => db.invoices_on(*date)?,
                None => db.invoices()?,
            };
            for invoice in invoices {
                println!(
                    "#{:<6} {} {:<32} {:>10.2}",
                    invoice.id,
                    invoice.date,
                    invoice.address,
                    invoice.gross_total()
                );
            }
        }
        Commands::Check => {
            let mut db = Database::open(config)?;
            db.test_data_corrupted()?;
            println!("OK");
        }
        Commands::Repartition => {
            let mut db = Database::open(config)?;
            db.repartition()?;
            println!("OK");
        }
        Commands::Commit => {
            let index = LocalStore::open(&config)?.commit(config.version_increment)?;
            println!(
                "version {} (base {}), {} files",
                index.version,
                index.base_version,
                index.files.len()
            );
        }
        Commands::Status => {
            let sync = synchronizer(args, &config)?;
            println!("{:?}", sync.status()?);
        }
        Commands::Push { force } => {
            let mut sync = synchronizer(args, &config)?;
            let outcome = sync.push(*force, &mut progress_bar)?;
            print_outcome(outcome);
        }
        Commands::Pull { force, keep_base } => {
            let mode = match (force, keep_base) {
                (_, true) => PullMode::KeepBaseVersion,
                (true, false) => PullMode::Force,
                (false, false) => PullMode::Normal,
            };
            let mut sync = synchronizer(args, &config)?;
            let outcome = sync.pull(mode, &mut progress_bar)?;
            print_outcome(outcome);
        }
    }
    Ok(())
}

fn synchronizer(args: &Args, config: &Config) -> Result<Synchronizer<DirectoryRemote>> {
    let root = args.remote.as_deref().ok_or_else(|| {
        ledgerdb::LedgerError::Config("sync commands need --remote <dir>".to_string())
    })?;
    let remote = DirectoryRemote::open(root, &config.manifest_filename)?;
    Synchronizer::new(config, remote)
}

fn progress_bar(fraction: f64) {
    tracing::debug!("transfer {:>3.0}%", fraction * 100.0);
}

fn print_outcome(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => println!(
            "version {}: {} copied, {} updated, {} removed, {} unchanged, {} bytes",
            report.version,
            report.copied.len(),
            report.updated.len(),
            report.removed.len(),
            report.ignored,
            report.bytes
        ),
        SyncOutcome::Rejected(status) => {
            println!("rejected: {:?} (use --force to override)", status)
        }
    }
}
