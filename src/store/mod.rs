use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::ingest::MovieSink;
use crate::tmdb::models::NormalizedMovie;

/// Movie catalog store keyed by `movie_id`. Workers share the pool but each
/// statement runs on its own pooled connection, so no handle crosses workers.
#[derive(Clone)]
pub struct MovieStore {
    pub pool: SqlitePool,
}

impl MovieStore {
    /// Open (creating if missing) the database at `path`. WAL mode plus a
    /// busy timeout keeps concurrent worker writes from tripping over the
    /// single-writer lock.
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        info!("connected to movie store");
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS all_movies (
                movie_id INTEGER PRIMARY KEY,
                movie_title TEXT NOT NULL,
                movie_genre TEXT NOT NULL,
                movie_runtime INTEGER NOT NULL,
                mpaa_rating TEXT NOT NULL,
                movie_language TEXT NOT NULL,
                movie_release_date TEXT NOT NULL,
                poster_path TEXT,
                poster_full_url TEXT,
                adult_01 INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Single-statement insert-or-update; applying the same record twice
    /// leaves the row unchanged.
    pub async fn upsert_movie(&self, movie: &NormalizedMovie) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO all_movies (
                movie_id, movie_title, movie_genre, movie_runtime,
                mpaa_rating, movie_language, movie_release_date,
                poster_path, poster_full_url, adult_01
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(movie_id) DO UPDATE SET
                movie_title = excluded.movie_title,
                movie_genre = excluded.movie_genre,
                movie_runtime = excluded.movie_runtime,
                mpaa_rating = excluded.mpaa_rating,
                movie_language = excluded.movie_language,
                movie_release_date = excluded.movie_release_date,
                poster_path = excluded.poster_path,
                poster_full_url = excluded.poster_full_url,
                adult_01 = excluded.adult_01
            "#,
        )
        .bind(movie.movie_id)
        .bind(&movie.title)
        .bind(&movie.genre_summary)
        .bind(movie.runtime_minutes)
        .bind(&movie.certification)
        .bind(&movie.original_language)
        .bind(&movie.release_date)
        .bind(&movie.poster_path)
        .bind(&movie.poster_full_url)
        .bind(i64::from(movie.adult))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn existing_movie_ids(&self) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT movie_id FROM all_movies")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn movie_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM all_movies")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl MovieSink for MovieStore {
    async fn apply(&self, movie: &NormalizedMovie) -> Result<()> {
        self.upsert_movie(movie).await
    }

    async fn existing_ids(&self) -> Result<HashSet<i64>> {
        self.existing_movie_ids().await
    }
}
