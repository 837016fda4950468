//! kvlog CLI
//!
//! Opens the transaction log, replays it, runs one command and shuts down.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kvlog::config::SyncStrategy;
use kvlog::{wal, Config, KvService};
use tracing_subscriber::{fmt, EnvFilter};

/// kvlog
#[derive(Parser, Debug)]
#[command(name = "kvlog")]
#[command(about = "Durable key-value store backed by a transaction log")]
#[command(version)]
struct Args {
    /// Transaction log file (file backend)
    #[arg(short, long, env = "KVLOG_FILE", default_value = "./transaction.log")]
    log_file: PathBuf,

    /// SQLite database; selects the relational backend when given
    #[arg(long, env = "KVLOG_SQLITE")]
    sqlite: Option<PathBuf>,

    /// Events buffered before writers block
    #[arg(short, long, default_value = "16")]
    queue_capacity: usize,

    /// fsync the log file after every event
    #[arg(long)]
    sync_every_write: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// Print every live key-value pair
    Dump,

    /// Replay the log without applying it and report what it holds
    Verify,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("kvlog v{}", kvlog::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> kvlog::Result<()> {
    let mut builder = Config::builder()
        .log_file(&args.log_file)
        .queue_capacity(args.queue_capacity);
    if let Some(path) = &args.sqlite {
        builder = builder.sqlite(path);
    }
    if args.sync_every_write {
        builder = builder.sync_strategy(SyncStrategy::EveryWrite);
    }
    let config = builder.build();

    if let Commands::Verify = args.command {
        let mut log = wal::open_log(&config)?;
        let report = wal::verify(log.as_mut())?;
        println!(
            "ok: {} events ({} puts, {} deletes), last sequence {}",
            report.events_replayed, report.puts, report.deletes, report.last_sequence
        );
        return log.close();
    }

    let service = KvService::open(config)?;
    let outcome = match &args.command {
        Commands::Get { key } => service.get(key).map(|value| println!("{}", value)),
        Commands::Put { key, value } => service.put(key, value),
        Commands::Delete { key } => service.delete(key),
        Commands::Dump => {
            for (key, value) in service.store().snapshot() {
                println!("{}\t{}", wal::escape(&key), wal::escape(&value));
            }
            Ok(())
        }
        Commands::Verify => Ok(()),
    };

    // Always drain so a failed read never loses earlier buffered writes
    let closed = service.shutdown().map(|failures| {
        if failures > 0 {
            tracing::warn!(failures, "some writes did not reach the transaction log");
        }
    });
    outcome.and(closed)
}
