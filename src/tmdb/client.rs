use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::ingest::{ExistenceProbe, MovieFetcher, RateLimiter};
use crate::tmdb::models::{
    FetchOutcome, MovieDetails, NormalizedMovie, ReleaseDatesResponse, NOT_RATED,
};

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_base: String,
    /// Country whose certification entry is stored (sentinel "NR" otherwise).
    pub certification_country: String,
    pub requests_per_second: u32,
    pub timeout: Duration,
    /// When set, records flagged adult are never written; the secondary
    /// certification call is skipped for them to save a rate-limited request.
    pub exclude_adult: bool,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            image_base: DEFAULT_IMAGE_BASE.to_string(),
            certification_country: "US".to_string(),
            requests_per_second: 5,
            timeout: Duration::from_secs(8),
            exclude_adult: true,
        }
    }
}

/// HTTP client for the movie metadata API. Every outbound call, including
/// existence probes, goes through the shared rate limiter.
pub struct TmdbClient {
    http: Client,
    config: TmdbConfig,
    limiter: Arc<RateLimiter>,
}

impl TmdbClient {
    pub fn new(config: TmdbConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("truereview-ingest/0.1")
            .timeout(config.timeout)
            .build()?;
        let limiter = Arc::new(RateLimiter::new(config.requests_per_second));
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    fn movie_url(&self, movie_id: i64) -> String {
        format!("{}/movie/{}", self.config.base_url, movie_id)
    }

    /// Secondary lookup: per-country certification entries.
    async fn certification(&self, movie_id: i64) -> Result<Option<String>> {
        self.limiter.acquire().await;
        let url = format!("{}/release_dates", self.movie_url(movie_id));
        let response = self
            .http
            .get(&url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let payload: ReleaseDatesResponse = response.json().await?;
        Ok(payload.certification_for(&self.config.certification_country))
    }
}

#[async_trait::async_trait]
impl MovieFetcher for TmdbClient {
    async fn fetch(&self, movie_id: i64) -> FetchOutcome {
        self.limiter.acquire().await;
        let response = match self
            .http
            .get(self.movie_url(movie_id))
            .query(&[("api_key", self.config.api_key.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => return FetchOutcome::Transient(err.into()),
        };

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return FetchOutcome::Transient(anyhow!("primary lookup returned {status}"));
        }
        if !status.is_success() {
            // Clean "does not exist" (404 and friends); terminal, no retry.
            return FetchOutcome::NotFound;
        }

        let details: MovieDetails = match response.json().await {
            Ok(d) => d,
            Err(err) => return FetchOutcome::Transient(err.into()),
        };

        if self.config.exclude_adult && details.adult {
            debug!(movie_id, "adult record excluded by policy");
            return FetchOutcome::Excluded;
        }

        // Certification failures degrade to the sentinel instead of failing
        // the whole record; the primary payload is already in hand.
        let certification = match self.certification(movie_id).await {
            Ok(Some(cert)) => cert,
            Ok(None) => NOT_RATED.to_string(),
            Err(err) => {
                warn!(movie_id, error = %err, "certification lookup failed; storing NR");
                NOT_RATED.to_string()
            }
        };

        FetchOutcome::Found(NormalizedMovie::from_details(
            movie_id,
            &details,
            certification,
            &self.config.image_base,
        ))
    }
}

#[async_trait::async_trait]
impl ExistenceProbe for TmdbClient {
    async fn exists(&self, movie_id: i64) -> Result<bool> {
        self.limiter.acquire().await;
        let response = self
            .http
            .get(self.movie_url(movie_id))
            .query(&[("api_key", self.config.api_key.as_str())])
            .send()
            .await?;
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(anyhow!("existence probe for {movie_id} returned {status}"));
        }
        Ok(status.is_success())
    }
}
