use std::collections::HashSet;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::ingest::ExistenceProbe;

/// Default cap for the doubling probe; matches the historical sync job.
pub const DEFAULT_DISCOVERY_CEILING: i64 = 5_000_000;

/// How the identifier set for a run is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdPlan {
    /// Identifiers `[start, end]` inclusive. With `resync` off, identifiers
    /// already present in the store are skipped (safe resume); with it on,
    /// the full range is reprocessed to refresh stored metadata.
    FixedRange { start: i64, end: i64, resync: bool },
    /// All identifiers in `{1..max_id}` missing from the store.
    FillMissing { max_id: i64 },
    /// Discover the current upper bound of valid identifiers (doubling probe
    /// from `seed`, then binary search), then fill missing below it.
    DiscoverThenFill { seed: i64, ceiling: i64 },
}

impl IdPlan {
    pub async fn resolve<P>(&self, existing: &HashSet<i64>, probe: &P) -> Result<Vec<i64>>
    where
        P: ExistenceProbe + ?Sized,
    {
        match *self {
            IdPlan::FixedRange { start, end, resync } => {
                if start < 1 || end < start {
                    bail!("invalid fixed range [{start}, {end}]");
                }
                Ok((start..=end)
                    .filter(|id| resync || !existing.contains(id))
                    .collect())
            }
            IdPlan::FillMissing { max_id } => {
                if max_id < 1 {
                    bail!("fill-missing requires a positive maximum identifier");
                }
                Ok(fill_missing(existing, max_id))
            }
            IdPlan::DiscoverThenFill { seed, ceiling } => {
                let max_id = discover_max(probe, seed, ceiling).await?;
                info!(max_id, "discovered upper bound of identifier space");
                Ok(fill_missing(existing, max_id))
            }
        }
    }
}

fn fill_missing(existing: &HashSet<i64>, max_id: i64) -> Vec<i64> {
    (1..=max_id).filter(|id| !existing.contains(id)).collect()
}

/// Find the highest existing identifier: double from `seed` until a
/// nonexistent identifier brackets the answer, then binary search. The hard
/// `ceiling` bounds the probe; if everything up to it exists, the ceiling is
/// treated as the answer (documented approximation).
pub async fn discover_max<P>(probe: &P, seed: i64, ceiling: i64) -> Result<i64>
where
    P: ExistenceProbe + ?Sized,
{
    if ceiling < 1 {
        bail!("discovery ceiling must be positive");
    }

    let mut low = 1i64;
    let mut current = seed.clamp(1, ceiling);
    loop {
        if !probe.exists(current).await? {
            break;
        }
        low = current;
        debug!(current, "identifier exists; doubling");
        if current >= ceiling {
            return Ok(ceiling);
        }
        current = current.saturating_mul(2).min(ceiling);
    }

    // `current` is the first known-nonexistent candidate; converge so that
    // `low` ends as the highest confirmed-existing identifier.
    let mut high = current;
    while low < high {
        let mid = (low + high + 1) / 2;
        if probe.exists(mid).await? {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Oracle {
        max_existing: i64,
        probes: AtomicUsize,
    }

    impl Oracle {
        fn new(max_existing: i64) -> Self {
            Self {
                max_existing,
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ExistenceProbe for Oracle {
        async fn exists(&self, movie_id: i64) -> Result<bool> {
            self.probes.fetch_add(1, Ordering::Relaxed);
            Ok(movie_id <= self.max_existing)
        }
    }

    #[tokio::test]
    async fn fill_missing_resolves_exact_complement() {
        let existing: HashSet<i64> = [1, 2, 4].into_iter().collect();
        let plan = IdPlan::FillMissing { max_id: 5 };
        let ids = plan.resolve(&existing, &Oracle::new(0)).await.unwrap();
        assert_eq!(ids, vec![3, 5]);
    }

    #[tokio::test]
    async fn fixed_range_skips_stored_ids_unless_resyncing() {
        let existing: HashSet<i64> = [2, 3].into_iter().collect();

        let plan = IdPlan::FixedRange {
            start: 1,
            end: 4,
            resync: false,
        };
        assert_eq!(
            plan.resolve(&existing, &Oracle::new(0)).await.unwrap(),
            vec![1, 4]
        );

        let plan = IdPlan::FixedRange {
            start: 1,
            end: 4,
            resync: true,
        };
        assert_eq!(
            plan.resolve(&existing, &Oracle::new(0)).await.unwrap(),
            vec![1, 2, 3, 4]
        );
    }

    #[tokio::test]
    async fn invalid_range_is_rejected() {
        let plan = IdPlan::FixedRange {
            start: 5,
            end: 4,
            resync: false,
        };
        assert!(plan.resolve(&HashSet::new(), &Oracle::new(0)).await.is_err());
    }

    #[tokio::test]
    async fn discovery_converges_to_exact_maximum() {
        let oracle = Oracle::new(1000);
        let max = discover_max(&oracle, 1, DEFAULT_DISCOVERY_CEILING)
            .await
            .unwrap();
        assert_eq!(max, 1000);
        // Doubling brackets in ~11 probes, binary search in ~10 more.
        assert!(oracle.probes.load(Ordering::Relaxed) < 30);
    }

    #[tokio::test]
    async fn discovery_from_a_seed_above_the_maximum_still_converges() {
        let oracle = Oracle::new(1000);
        let max = discover_max(&oracle, 4096, DEFAULT_DISCOVERY_CEILING)
            .await
            .unwrap();
        assert_eq!(max, 1000);
    }

    #[tokio::test]
    async fn discovery_caps_at_the_ceiling_when_everything_exists() {
        let oracle = Oracle::new(i64::MAX);
        let max = discover_max(&oracle, 1, 4096).await.unwrap();
        assert_eq!(max, 4096);
    }

    #[tokio::test]
    async fn discover_then_fill_uses_the_discovered_bound() {
        let existing: HashSet<i64> = (1..=998).collect();
        let plan = IdPlan::DiscoverThenFill {
            seed: 1,
            ceiling: DEFAULT_DISCOVERY_CEILING,
        };
        let ids = plan.resolve(&existing, &Oracle::new(1000)).await.unwrap();
        assert_eq!(ids, vec![999, 1000]);
    }
}
