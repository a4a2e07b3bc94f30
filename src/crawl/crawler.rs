//! Course page crawling and task fan-out.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use url::Url;

use super::classifier::{course_links, is_candidate_href, main_content_links};
use super::resolver::{ResolveError, ResolveOutcome, ResourceResolver};
use super::sink::{ErrorHandler, ResourceSink};
use crate::http::{HttpSession, SessionError};

/// Resolver tasks allowed to run at once unless configured otherwise.
pub const DEFAULT_WORKERS: usize = 10;

/// Minimum worker count.
pub const MIN_WORKERS: usize = 1;

/// Errors that stop a crawl before any task is scheduled.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Worker count outside `1..=max`.
    #[error("invalid worker count {workers}: expected {MIN_WORKERS}..={max}")]
    InvalidWorkers {
        /// Requested count.
        workers: usize,
        /// Upper bound, the session's cap for the platform host.
        max: usize,
    },
    /// The page URL is not absolute.
    #[error("invalid page URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },
    /// Fetching the page failed.
    #[error("failed to fetch {url}: {source}")]
    Session {
        /// Page URL.
        url: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// The page answered with something other than 200.
    #[error("{url} returned {status}")]
    Status {
        /// Page URL.
        url: String,
        /// Status received.
        status: StatusCode,
    },
}

/// One scheduled resolver task.
#[derive(Debug)]
pub struct PendingTask {
    url: String,
    handle: JoinHandle<ResolveOutcome>,
}

impl PendingTask {
    /// Absolute URL the task starts from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true once the task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn into_parts(self) -> (String, JoinHandle<ResolveOutcome>) {
        (self.url, self.handle)
    }
}

/// Tasks produced by one crawl. Consumed by a
/// [`ResultAggregator`](super::ResultAggregator).
///
/// Dropping a batch does not cancel its tasks.
#[derive(Debug, Default)]
pub struct CrawlBatch {
    tasks: Vec<PendingTask>,
}

impl CrawlBatch {
    /// Number of scheduled tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when the page had no candidate links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Scheduled tasks in discovery order.
    #[must_use]
    pub fn tasks(&self) -> &[PendingTask] {
        &self.tasks
    }

    /// Start URLs in discovery order.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        self.tasks.iter().map(PendingTask::url).collect()
    }

    pub(crate) fn into_tasks(self) -> Vec<PendingTask> {
        self.tasks
    }
}

/// Crawls course pages on a shared session.
///
/// Worker count is validated against the session's per-host cap so workers
/// never queue on connection slots they cannot get.
#[derive(Debug, Clone)]
pub struct CourseCrawler {
    session: Arc<HttpSession>,
    workers: Arc<Semaphore>,
    worker_count: usize,
}

impl CourseCrawler {
    /// Creates a crawler running at most `workers` resolver tasks at once.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidWorkers`] when `workers` is zero or above
    /// the session's cap for the platform host.
    pub fn new(session: Arc<HttpSession>, workers: usize) -> Result<Self, CrawlError> {
        let max = session.limits().max_to_target;
        if !(MIN_WORKERS..=max).contains(&workers) {
            return Err(CrawlError::InvalidWorkers { workers, max });
        }
        Ok(Self {
            session,
            workers: Arc::new(Semaphore::new(workers)),
            worker_count: workers,
        })
    }

    /// Creates a crawler with [`DEFAULT_WORKERS`].
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_default_workers(session: Arc<HttpSession>) -> Result<Self, CrawlError> {
        Self::new(session, DEFAULT_WORKERS)
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.worker_count
    }

    /// Fetches a course page and schedules one resolver task per candidate link.
    ///
    /// Returns as soon as the tasks are spawned. Links are made absolute
    /// against the page's final URL and deduplicated; links that cannot be
    /// made absolute are reported to `errors` and skipped.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] when the page cannot be fetched or is not a 200.
    #[instrument(skip(self, sink, errors), fields(workers = self.worker_count))]
    pub async fn crawl(
        &self,
        course_url: &str,
        sink: Arc<dyn ResourceSink>,
        errors: Arc<dyn ErrorHandler>,
    ) -> Result<CrawlBatch, CrawlError> {
        let (page_url, html) = self.fetch_page(course_url).await?;
        let resolver = ResourceResolver::new(Arc::clone(&self.session), sink, Arc::clone(&errors));

        let mut seen: HashSet<String> = HashSet::new();
        let mut tasks = Vec::new();
        for href in main_content_links(&html) {
            if !is_candidate_href(&href) {
                continue;
            }
            let target = match page_url.join(&href) {
                Ok(target) => target,
                Err(_) => {
                    errors.handle_error(
                        page_url.as_str(),
                        &ResolveError::InvalidTarget {
                            base: page_url.to_string(),
                            href,
                        },
                    );
                    continue;
                }
            };
            if !seen.insert(target.to_string()) {
                continue;
            }
            tasks.push(self.spawn(&resolver, target));
        }

        info!(course_url, tasks = tasks.len(), "resolver tasks scheduled");
        Ok(CrawlBatch { tasks })
    }

    /// Lists enrolled courses from the platform home page, title to URL.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] when the home page cannot be fetched or is not a 200.
    #[instrument(skip(self))]
    pub async fn list_courses(&self) -> Result<BTreeMap<String, String>, CrawlError> {
        let home = self.session.home_url().to_string();
        let (page_url, html) = self.fetch_page(&home).await?;
        let courses = course_links(&html)
            .into_iter()
            .filter_map(|(title, href)| {
                page_url
                    .join(&href)
                    .ok()
                    .map(|url| (title, url.to_string()))
            })
            .collect::<BTreeMap<_, _>>();
        debug!(courses = courses.len(), "courses listed");
        Ok(courses)
    }

    fn spawn(&self, resolver: &ResourceResolver, target: Url) -> PendingTask {
        let resolver = resolver.clone();
        let permits = Arc::clone(&self.workers);
        let url = target.to_string();
        let handle = tokio::spawn(async move {
            // The semaphore is never closed.
            let Ok(_permit) = permits.acquire_owned().await else {
                return ResolveOutcome::Failed;
            };
            resolver.resolve(target).await
        });
        PendingTask { url, handle }
    }

    async fn fetch_page(&self, url: &str) -> Result<(Url, String), CrawlError> {
        let parsed = Url::parse(url).map_err(|_| CrawlError::InvalidUrl {
            url: url.to_string(),
        })?;
        let session_error = |source| CrawlError::Session {
            url: url.to_string(),
            source,
        };
        let response = self
            .session
            .get(parsed.as_str())
            .await
            .map_err(session_error)?;
        if response.status() != StatusCode::OK {
            let status = response.status();
            response.discard().await;
            return Err(CrawlError::Status {
                url: url.to_string(),
                status,
            });
        }
        let final_url = response.final_url().clone();
        let html = response.text().await.map_err(session_error)?;
        Ok((final_url, html))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::http::PoolLimits;

    fn session(max_to_target: usize) -> Arc<HttpSession> {
        Arc::new(
            HttpSession::builder("https://m.example.ch")
                .limits(PoolLimits {
                    max_total: 50,
                    max_per_route: 20,
                    max_to_target,
                })
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_worker_count_bounds() {
        assert!(matches!(
            CourseCrawler::new(session(20), 0),
            Err(CrawlError::InvalidWorkers { workers: 0, max: 20 })
        ));
        assert!(matches!(
            CourseCrawler::new(session(4), 5),
            Err(CrawlError::InvalidWorkers { workers: 5, max: 4 })
        ));
        assert_eq!(CourseCrawler::new(session(4), 4).unwrap().workers(), 4);
        assert_eq!(
            CourseCrawler::with_default_workers(session(20)).unwrap().workers(),
            DEFAULT_WORKERS
        );
    }

    #[tokio::test]
    async fn test_crawl_rejects_relative_page_url() {
        let crawler = CourseCrawler::with_default_workers(session(20)).unwrap();
        let result = crawler
            .crawl(
                "/course/view.php?id=1",
                Arc::new(crate::crawl::DiscardSink),
                Arc::new(crate::crawl::LoggingErrorHandler),
            )
            .await;
        assert!(matches!(result, Err(CrawlError::InvalidUrl { .. })));
    }
}
