//! Connection admission control for the HTTP session.
//!
//! This module provides the [`ConnectionLimiter`] which caps the number of
//! requests in flight globally and per route. A route is a `host:port` pair;
//! the platform host gets its own configurable cap, every other route uses the
//! default per-route cap.
//!
//! # Overview
//!
//! Each request acquires a [`ConnectionPermit`] before it is sent and holds it
//! until its response body has been drained or dropped. When a cap is reached
//! further requests wait; nothing is ever rejected.
//!
//! # Example
//!
//! ```
//! use coursefetch_core::http::{ConnectionLimiter, PoolLimits};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = ConnectionLimiter::new(PoolLimits::default(), "cyberlearn.example.ch:443");
//! let url = Url::parse("https://cyberlearn.example.ch/my/")?;
//! let permit = limiter.acquire(&url).await?;
//! drop(permit);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{MAX_CONNECTIONS, MAX_CONNECTIONS_PER_ROUTE, MAX_CONNECTIONS_TO_TARGET};

/// Connection ceilings for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum requests in flight across all routes.
    pub max_total: usize,
    /// Maximum requests in flight to any route other than the target host.
    pub max_per_route: usize,
    /// Maximum requests in flight to the target (platform) host.
    pub max_to_target: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_total: MAX_CONNECTIONS,
            max_per_route: MAX_CONNECTIONS_PER_ROUTE,
            max_to_target: MAX_CONNECTIONS_TO_TARGET,
        }
    }
}

/// Returned when the limiter has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection limiter is closed")]
pub struct LimiterClosed;

/// Admission guard for one request. Dropping it frees both slots.
#[derive(Debug)]
pub struct ConnectionPermit {
    _route: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

/// Global and per-route concurrency caps shared by every request of a session.
///
/// Designed to be shared across Tokio tasks. Route semaphores live in a
/// `DashMap`; the `Arc` is cloned out before awaiting so no shard lock is held
/// across an await point.
#[derive(Debug)]
pub struct ConnectionLimiter {
    limits: PoolLimits,
    target_route: String,
    total: Arc<Semaphore>,
    routes: DashMap<String, Arc<Semaphore>>,
}

impl ConnectionLimiter {
    /// Creates a limiter. `target_route` is the `host:port` of the platform.
    #[must_use]
    #[instrument(skip_all, fields(target_route))]
    pub fn new(limits: PoolLimits, target_route: impl Into<String>) -> Self {
        let target_route = target_route.into();
        tracing::Span::current().record("target_route", target_route.as_str());
        debug!(
            max_total = limits.max_total,
            max_per_route = limits.max_per_route,
            max_to_target = limits.max_to_target,
            "creating connection limiter"
        );
        Self {
            total: Arc::new(Semaphore::new(limits.max_total)),
            limits,
            target_route,
            routes: DashMap::new(),
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Returns the route key of the target host.
    #[must_use]
    pub fn target_route(&self) -> &str {
        &self.target_route
    }

    /// Returns the number of free global slots.
    #[must_use]
    pub fn available_total(&self) -> usize {
        self.total.available_permits()
    }

    /// Waits for a route slot, then a global slot, for the given URL.
    ///
    /// The route slot is taken first so a request blocked on a busy route
    /// does not sit on a global slot.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterClosed`] once [`close`](Self::close) has been called.
    pub async fn acquire(&self, url: &Url) -> Result<ConnectionPermit, LimiterClosed> {
        let route = route_key(url);
        let semaphore = self.route_semaphore(&route);

        let route_permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;
        let total_permit = Arc::clone(&self.total)
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;

        Ok(ConnectionPermit {
            _route: route_permit,
            _total: total_permit,
        })
    }

    /// Closes every semaphore; pending and future acquisitions fail.
    pub fn close(&self) {
        self.total.close();
        for entry in self.routes.iter() {
            entry.value().close();
        }
        debug!("connection limiter closed");
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.total.is_closed()
    }

    fn route_semaphore(&self, route: &str) -> Arc<Semaphore> {
        let cap = if route == self.target_route {
            self.limits.max_to_target
        } else {
            self.limits.max_per_route
        };
        let semaphore = self
            .routes
            .entry(route.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(cap)))
            .clone();
        if self.total.is_closed() {
            semaphore.close();
        }
        semaphore
    }
}

/// Builds the `host:port` route key of a URL.
///
/// Returns `"unknown"` for URLs without a host so they still share a cap.
///
/// # Examples
///
/// ```
/// use coursefetch_core::http::route_key;
/// use url::Url;
///
/// let url = Url::parse("https://Moodle.Example.ch/course/view.php?id=1").unwrap();
/// assert_eq!(route_key(&url), "moodle.example.ch:443");
/// let url = Url::parse("http://localhost:8080/x").unwrap();
/// assert_eq!(route_key(&url), "localhost:8080");
/// ```
#[must_use]
pub fn route_key(url: &Url) -> String {
    let Some(host) = url.host_str() else {
        return "unknown".to_string();
    };
    let host = host.to_lowercase();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}
