//! Waiting on a crawl batch and collecting what it found.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use futures_util::stream::FuturesUnordered;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::crawler::CrawlBatch;
use super::resolver::ResolveOutcome;

/// Default time each task is given once collection starts.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(15);

/// How the tasks of a batch ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Tasks that produced a reference.
    pub resolved: usize,
    /// Tasks that ended without a resource.
    pub empty: usize,
    /// Tasks that failed or panicked.
    pub failed: usize,
    /// Tasks aborted at the deadline.
    pub timed_out: usize,
}

impl CollectStats {
    /// Number of tasks accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.resolved + self.empty + self.failed + self.timed_out
    }
}

/// Collects batch results into a name-ordered map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultAggregator {
    timeout: Duration,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TASK_TIMEOUT)
    }
}

impl ResultAggregator {
    /// Creates an aggregator giving each task `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-task timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits on every task and returns resolved resources, name to URL.
    ///
    /// See [`collect_with_stats`](Self::collect_with_stats).
    pub async fn collect(&self, batch: CrawlBatch) -> BTreeMap<String, String> {
        self.collect_with_stats(batch).await.0
    }

    /// Waits on every task concurrently, each for at most the configured
    /// timeout, and returns the resolved resources with outcome counts.
    ///
    /// Results are inserted as tasks finish, so when two tasks resolve to the
    /// same name the one finishing last wins. Tasks still running at their
    /// deadline are aborted. A zero timeout keeps the results of tasks that
    /// already finished and aborts the rest without waiting.
    pub async fn collect_with_stats(
        &self,
        batch: CrawlBatch,
    ) -> (BTreeMap<String, String>, CollectStats) {
        let mut tally = Tally::default();
        let tasks = batch.into_tasks();

        if self.timeout.is_zero() {
            for task in tasks {
                let (url, mut handle) = task.into_parts();
                if handle.is_finished()
                    && let Some(result) = (&mut handle).now_or_never()
                {
                    tally.record(&url, result);
                } else {
                    handle.abort();
                    debug!(url, "task aborted, no time allowed");
                    tally.stats.timed_out += 1;
                }
            }
            return tally.finish();
        }

        let timeout = self.timeout;
        let mut waits: FuturesUnordered<_> = tasks
            .into_iter()
            .map(|task| async move {
                let (url, mut handle) = task.into_parts();
                let result = tokio::time::timeout(timeout, &mut handle).await;
                if result.is_err() {
                    handle.abort();
                }
                (url, result)
            })
            .collect();

        while let Some((url, result)) = waits.next().await {
            match result {
                Ok(result) => tally.record(&url, result),
                Err(_) => {
                    warn!(url, timeout_ms = timeout.as_millis(), "resolver task timed out");
                    tally.stats.timed_out += 1;
                }
            }
        }
        tally.finish()
    }
}

#[derive(Default)]
struct Tally {
    resources: BTreeMap<String, String>,
    stats: CollectStats,
}

impl Tally {
    fn record(&mut self, url: &str, result: Result<ResolveOutcome, JoinError>) {
        match result {
            Ok(ResolveOutcome::Resolved(reference)) => {
                self.stats.resolved += 1;
                if let Some(previous) = self
                    .resources
                    .insert(reference.name.clone(), reference.url)
                {
                    debug!(name = %reference.name, replaced = %previous, "duplicate resource name");
                }
            }
            Ok(ResolveOutcome::Empty) => self.stats.empty += 1,
            Ok(ResolveOutcome::Failed) => self.stats.failed += 1,
            Err(join_error) => {
                warn!(url, error = %join_error, "resolver task did not complete");
                self.stats.failed += 1;
            }
        }
    }

    fn finish(self) -> (BTreeMap<String, String>, CollectStats) {
        let stats = self.stats;
        info!(
            resolved = stats.resolved,
            empty = stats.empty,
            failed = stats.failed,
            timed_out = stats.timed_out,
            "batch collected"
        );
        (self.resources, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_total() {
        let stats = CollectStats {
            resolved: 2,
            empty: 1,
            failed: 3,
            timed_out: 4,
        };
        assert_eq!(stats.total(), 10);
    }

    #[tokio::test]
    async fn test_collect_empty_batch() {
        let (map, stats) = ResultAggregator::default()
            .collect_with_stats(CrawlBatch::default())
            .await;
        assert!(map.is_empty());
        assert_eq!(stats, CollectStats::default());
    }
}
