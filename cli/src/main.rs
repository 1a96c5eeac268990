//! hiveindex CLI: sync a Steem node into SQLite, or report how far behind it is.
//!
//! Usage:
//! ```bash
//! hiveindex sync   --steemd-url https://api.steemit.com --database hive.db
//! hiveindex sync   --checkpoints ./checkpoints --stop-at 5000000
//! hiveindex status --database hive.db
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use hiveindex_core::{head_state, IndexerConfig, NameOnlyCommunities, SyncOrchestrator, SyncPolicy};
use hiveindex_steem::{SteemClient, SteemClientConfig};
use hiveindex_storage::{SqlitePostCache, SqliteStorage};

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "hiveindex",
    about = "Steem blockchain indexer: accounts, posts, follows and reblogs in SQLite",
    long_about = "
hiveindex replays checkpoint files, catches up to the last irreversible block
in batches, then follows the chain head block by block.

ENVIRONMENT VARIABLES:
  STEEMD_URL           JSON-RPC endpoint of the steemd node
  HIVEINDEX_DATABASE   Path of the SQLite database file
  HIVEINDEX_LOG        Global log level (trace, debug, info, warn, error)
",
    version
)]
struct Cli {
    #[command(flatten)]
    conn: Connection,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Connection {
    /// JSON-RPC endpoint of the steemd node
    #[arg(long, global = true, env = "STEEMD_URL", default_value = "https://api.steemit.com")]
    steemd_url: String,

    /// SQLite database file (created if missing)
    #[arg(long, global = true, env = "HIVEINDEX_DATABASE", default_value = "hiveindex.db")]
    database: String,
}

#[derive(Args)]
struct LogArgs {
    /// Global log level
    #[arg(long, global = true, env = "HIVEINDEX_LOG", default_value = "info")]
    log_level: String,

    /// Per-crate override, e.g. `hiveindex-steem=debug` (repeatable)
    #[arg(long = "log-component", global = true)]
    log_components: Vec<String>,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the chain: checkpoint replay, batch catch-up, then live tail
    Sync {
        /// Directory of `<last_block>.json.lst` checkpoint files to replay first
        #[arg(long, env = "HIVEINDEX_CHECKPOINTS")]
        checkpoints: Option<PathBuf>,

        /// Stay this many blocks behind the head in live mode
        #[arg(long, default_value_t = SyncPolicy::default().trail_blocks)]
        trail_blocks: u64,

        /// Milliseconds between head polls in live mode
        #[arg(long, default_value_t = SyncPolicy::default().poll_interval_ms)]
        poll_interval_ms: u64,

        /// Blocks fetched and committed together during catch-up
        #[arg(long, default_value_t = SyncPolicy::default().catchup_window)]
        catchup_window: u64,

        /// Stop once this block has been applied
        #[arg(long)]
        stop_at: Option<u64>,

        /// Blocks requested per JSON-RPC batch
        #[arg(long, default_value_t = SteemClientConfig::default().batch_size)]
        rpc_batch_size: usize,
    },

    /// Print the node's irreversible head, the applied head and the lag as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log = LogConfig {
        level: cli.log.log_level.clone(),
        json: cli.log.log_json,
        ..LogConfig::default()
    }
    .with_overrides(cli.log.log_components.iter().map(String::as_str));
    init_tracing(&log);

    match cli.command {
        Commands::Sync {
            checkpoints,
            trail_blocks,
            poll_interval_ms,
            catchup_window,
            stop_at,
            rpc_batch_size,
        } => {
            let config = IndexerConfig {
                sync: SyncPolicy {
                    poll_interval_ms,
                    trail_blocks,
                    catchup_window,
                    ..SyncPolicy::default()
                },
                checkpoint_dir: checkpoints,
                stop_at,
                ..IndexerConfig::default()
            };
            let client = SteemClientConfig {
                batch_size: rpc_batch_size,
                ..SteemClientConfig::default()
            };
            cmd_sync(&cli.conn, config, client).await
        }
        Commands::Status => cmd_status(&cli.conn).await,
    }
}

async fn cmd_sync(conn: &Connection, config: IndexerConfig, client: SteemClientConfig) -> Result<()> {
    let storage = open_storage(&conn.database).await?;
    let cache = Arc::new(SqlitePostCache::new(&storage));
    let chain = SteemClient::new(&conn.steemd_url, client).context("building steemd client")?;

    tracing::info!(
        steemd = %conn.steemd_url,
        database = %conn.database,
        stop_at = ?config.stop_at,
        "starting sync"
    );

    let mut orchestrator = SyncOrchestrator::new(
        config,
        chain,
        Arc::new(storage),
        cache,
        Arc::new(NameOnlyCommunities),
    );

    let outcome = tokio::select! {
        result = orchestrator.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(result) => {
            result.context("sync failed")?;
            tracing::info!(phase = %orchestrator.phase(), "sync finished");
        }
        None => tracing::warn!(phase = %orchestrator.phase(), "interrupted, open batch discarded"),
    }
    Ok(())
}

async fn cmd_status(conn: &Connection) -> Result<()> {
    let storage = open_storage(&conn.database).await?;
    let chain = SteemClient::default_for(&conn.steemd_url).context("building steemd client")?;

    let status = head_state(&chain, &storage)
        .await
        .context("querying sync status")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn open_storage(path: &str) -> Result<SqliteStorage> {
    SqliteStorage::open(path)
        .await
        .with_context(|| format!("opening database {path}"))
}
