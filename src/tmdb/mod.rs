pub mod client;
pub mod models;

pub use client::{TmdbClient, TmdbConfig};
pub use models::{FetchOutcome, NormalizedMovie};
