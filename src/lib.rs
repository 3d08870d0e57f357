pub mod ingest;
pub mod store;
pub mod tmdb;
pub mod tracing;

pub mod util {
    pub mod env;
}
