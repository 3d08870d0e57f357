//! Bounded-concurrency, rate-limited, resumable bulk ingestion.
//!
//! The coordinator owns the work queue, the worker pool, and the summary
//! counters; the fetcher and sink are injected behind traits so providers
//! and stores stay swappable (and mockable in tests).

pub mod coordinator;
pub mod limiter;
pub mod resolver;

pub use coordinator::{CancelToken, Coordinator, RunConfig, RunSummary};
pub use limiter::RateLimiter;
pub use resolver::{discover_max, IdPlan};

use std::collections::HashSet;

use anyhow::Result;

use crate::tmdb::models::{FetchOutcome, NormalizedMovie};

/// One identifier's (possibly multi-call) lookup against the external API.
/// Implementations must not touch the store.
#[async_trait::async_trait]
pub trait MovieFetcher: Send + Sync {
    async fn fetch(&self, movie_id: i64) -> FetchOutcome;
}

/// Lightweight existence probe used by the discovery resolver. Errors here
/// abort resolution (the run has not started yet).
#[async_trait::async_trait]
pub trait ExistenceProbe: Send + Sync {
    async fn exists(&self, movie_id: i64) -> Result<bool>;
}

/// Local-store surface the pipeline needs: an atomic per-record upsert and
/// the identifier listing that powers fill-missing resolution.
#[async_trait::async_trait]
pub trait MovieSink: Send + Sync {
    async fn apply(&self, movie: &NormalizedMovie) -> Result<()>;
    async fn existing_ids(&self) -> Result<HashSet<i64>>;
}
