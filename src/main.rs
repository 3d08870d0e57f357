use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use truereview_ingest::ingest::resolver::DEFAULT_DISCOVERY_CEILING;
use truereview_ingest::ingest::{Coordinator, IdPlan, RunConfig};
use truereview_ingest::store::MovieStore;
use truereview_ingest::tmdb::client::{DEFAULT_BASE_URL, DEFAULT_IMAGE_BASE};
use truereview_ingest::tmdb::{TmdbClient, TmdbConfig};
use truereview_ingest::util::env::{env_flag, env_opt, env_parse, env_req, init_env};

/// Bulk movie-catalog ingestion against the TMDB API.
#[derive(Parser)]
#[command(name = "truereview-ingest", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// SQLite database path (falls back to TRUEREVIEW_DB, then TrueReview.db).
    #[arg(long)]
    db: Option<String>,
    /// Concurrent workers pulling from the shared queue.
    #[arg(long, default_value_t = env_parse("INGEST_CONCURRENCY", 10))]
    concurrency: usize,
    /// Global outbound requests per second across all workers.
    #[arg(long, default_value_t = env_parse("INGEST_RPS", 5))]
    rps: u32,
    /// Per-call HTTP timeout in seconds.
    #[arg(long, default_value_t = env_parse("INGEST_TIMEOUT_SECS", 8))]
    timeout_secs: u64,
    /// Fetch retries after a transient failure.
    #[arg(long, default_value_t = env_parse("INGEST_RETRIES", 1))]
    retries: u32,
    /// Store adult-flagged records (with adult_01 = 1) instead of excluding
    /// them. Also settable via INGEST_INCLUDE_ADULT.
    #[arg(long)]
    include_adult: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a fixed identifier range.
    Backfill {
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        /// Re-fetch identifiers already stored (refresh posters, flags, metadata).
        #[arg(long)]
        resync: bool,
    },
    /// Ingest every identifier missing below a known maximum.
    FillMissing {
        #[arg(long)]
        max_id: i64,
    },
    /// Discover the current maximum identifier, then fill everything missing.
    Sync {
        #[arg(long, default_value_t = 1_000_000)]
        seed: i64,
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_CEILING)]
        ceiling: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    truereview_ingest::tracing::init_tracing("info")?;
    init_env();
    let cli = Cli::parse();

    let api_key = env_req("TMDB_API_KEY")?;
    let db_path = cli
        .common
        .db
        .or_else(|| env_opt("TRUEREVIEW_DB"))
        .unwrap_or_else(|| "TrueReview.db".to_string());

    let store = MovieStore::connect(&db_path, cli.common.concurrency.max(1) as u32).await?;
    store.ensure_schema().await?;
    info!(
        db = %db_path,
        movies = store.movie_count().await?,
        "movie store ready"
    );

    let client = TmdbClient::new(TmdbConfig {
        api_key,
        base_url: env_opt("TMDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        image_base: env_opt("TMDB_IMAGE_BASE").unwrap_or_else(|| DEFAULT_IMAGE_BASE.to_string()),
        requests_per_second: cli.common.rps,
        timeout: Duration::from_secs(cli.common.timeout_secs),
        exclude_adult: !(cli.common.include_adult || env_flag("INGEST_INCLUDE_ADULT", false)),
        ..TmdbConfig::default()
    })?;

    let coordinator = Coordinator::new(
        client,
        store,
        RunConfig {
            concurrency: cli.common.concurrency,
            retry_limit: cli.common.retries,
            ..RunConfig::default()
        },
    );

    // Ctrl+C requests a cooperative stop; in-flight items finish and the
    // summary still prints.
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; draining in-flight work");
            cancel.cancel();
        }
    });

    let plan = match cli.command {
        Command::Backfill { start, end, resync } => IdPlan::FixedRange { start, end, resync },
        Command::FillMissing { max_id } => IdPlan::FillMissing { max_id },
        Command::Sync { seed, ceiling } => IdPlan::DiscoverThenFill { seed, ceiling },
    };

    let summary = coordinator.run(&plan).await?;
    let elapsed = summary.finished_at - summary.started_at;
    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        not_found = summary.not_found,
        excluded = summary.excluded,
        failed = summary.failed,
        elapsed_secs = elapsed.num_seconds(),
        "run summary"
    );
    Ok(())
}
