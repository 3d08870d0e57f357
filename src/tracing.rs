use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Install the global subscriber for a bulk-run binary.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to this crate
/// with sqlx quietened to warnings, since per-statement query logs drown the
/// per-movie progress lines during large runs.
pub fn init_tracing(default_level: &str) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

fn default_directives(default_level: &str) -> String {
    format!("{default_level},sqlx=warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_directives_quieten_sqlx() {
        assert_eq!(default_directives("info"), "info,sqlx=warn");
    }
}
