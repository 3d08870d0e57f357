use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::ingest::resolver::IdPlan;
use crate::ingest::{ExistenceProbe, MovieFetcher, MovieSink};
use crate::tmdb::models::FetchOutcome;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub concurrency: usize,
    /// Additional fetch attempts after the first transient failure.
    pub retry_limit: u32,
    /// Base backoff between retries; grows linearly with the attempt and
    /// gets a little jitter so workers do not retry in lockstep.
    pub retry_backoff: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry_limit: 1,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Final counters for one ingestion run. Per-item failures live here, never
/// as an error from [`Coordinator::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub attempted: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub excluded: u64,
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Cooperative stop signal: prevents new dequeues, lets in-flight items finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Resolving,
    Running,
    Draining,
    Completed,
}

#[derive(Default)]
struct Counters {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    not_found: AtomicU64,
    excluded: AtomicU64,
    failed: AtomicU64,
}

/// Owns the work queue, the worker pool, and the summary counters for one
/// kind of ingestion run. The fetcher doubles as the existence probe so
/// discovery reuses the same rate limiter as the bulk fetches.
pub struct Coordinator<F, S> {
    fetcher: Arc<F>,
    sink: Arc<S>,
    config: RunConfig,
    cancel: CancelToken,
    phase: std::sync::Mutex<RunPhase>,
}

impl<F, S> Coordinator<F, S>
where
    F: MovieFetcher + ExistenceProbe + 'static,
    S: MovieSink + 'static,
{
    pub fn new(fetcher: F, sink: S, config: RunConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            sink: Arc::new(sink),
            config,
            cancel: CancelToken::default(),
            phase: std::sync::Mutex::new(RunPhase::Idle),
        }
    }

    /// Handle for requesting a cooperative stop from another task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn set_phase(&self, next: RunPhase) {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        debug!(from = ?*phase, to = ?next, "run phase transition");
        *phase = next;
    }

    /// Resolve the identifier set, drain it through the worker pool, and
    /// report counters. Only resolver-phase failures (store unreachable,
    /// probe error) return `Err`; per-item failures are counted.
    pub async fn run(&self, plan: &IdPlan) -> Result<RunSummary> {
        let started_at = Utc::now();

        self.set_phase(RunPhase::Resolving);
        let existing = self
            .sink
            .existing_ids()
            .await
            .context("listing stored identifiers")?;
        let ids = plan
            .resolve(&existing, self.fetcher.as_ref())
            .await
            .context("resolving identifier set")?;
        info!(
            stored = existing.len(),
            resolved = ids.len(),
            "identifier set resolved"
        );

        let total = ids.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(ids)));
        let counters = Arc::new(Counters::default());

        self.set_phase(RunPhase::Running);
        let workers = self.config.concurrency.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let fetcher = self.fetcher.clone();
            let sink = self.sink.clone();
            let counters = counters.clone();
            let cancel = self.cancel.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, fetcher, sink, counters, cancel, config).await;
            }));
        }

        // Queue drained (or cancelled) means no new work; what remains is
        // in-flight items.
        loop {
            if self.cancel.is_cancelled() || queue.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.set_phase(RunPhase::Draining);
        join_all(handles).await;
        self.set_phase(RunPhase::Completed);

        let summary = RunSummary {
            attempted: counters.attempted.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            not_found: counters.not_found.load(Ordering::Relaxed),
            excluded: counters.excluded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            total,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            not_found = summary.not_found,
            excluded = summary.excluded,
            failed = summary.failed,
            cancelled = self.cancel.is_cancelled(),
            "ingestion run complete"
        );
        Ok(summary)
    }
}

async fn worker_loop<F, S>(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<i64>>>,
    fetcher: Arc<F>,
    sink: Arc<S>,
    counters: Arc<Counters>,
    cancel: CancelToken,
    config: RunConfig,
) where
    F: MovieFetcher,
    S: MovieSink,
{
    loop {
        if cancel.is_cancelled() {
            debug!(worker_id, "stop requested; worker exiting");
            break;
        }
        let movie_id = { queue.lock().await.pop_front() };
        let Some(movie_id) = movie_id else {
            break;
        };
        counters.attempted.fetch_add(1, Ordering::Relaxed);
        process_one(movie_id, fetcher.as_ref(), sink.as_ref(), &counters, &config).await;
    }
}

async fn process_one<F, S>(
    movie_id: i64,
    fetcher: &F,
    sink: &S,
    counters: &Counters,
    config: &RunConfig,
) where
    F: MovieFetcher + ?Sized,
    S: MovieSink + ?Sized,
{
    let mut attempt = 0u32;
    let outcome = loop {
        match fetcher.fetch(movie_id).await {
            FetchOutcome::Transient(err) if attempt < config.retry_limit => {
                attempt += 1;
                warn!(movie_id, attempt, error = %err, "transient fetch failure; retrying");
                tokio::time::sleep(backoff_delay(config.retry_backoff, attempt)).await;
            }
            other => break other,
        }
    };

    match outcome {
        FetchOutcome::Found(movie) => {
            if let Err(err) = sink.apply(&movie).await {
                // Retry the write once; never re-fetch because of a
                // sink-side failure.
                warn!(movie_id, error = %err, "store write failed; retrying once");
                if let Err(err) = sink.apply(&movie).await {
                    error!(movie_id, error = %err, "store write failed after retry");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
            debug!(movie_id, title = %movie.title, "stored");
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        FetchOutcome::NotFound => {
            debug!(movie_id, "not found; skipping");
            counters.not_found.fetch_add(1, Ordering::Relaxed);
        }
        FetchOutcome::Excluded => {
            counters.excluded.fetch_add(1, Ordering::Relaxed);
        }
        FetchOutcome::Transient(err) => {
            warn!(movie_id, error = %err, "giving up after transient failures");
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..100);
    base * attempt + Duration::from_millis(jitter_ms)
}
