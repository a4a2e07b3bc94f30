//! Following one link to the resource behind it.
//!
//! Platforms rarely link straight to a file: a course link usually leads to a
//! viewer page that embeds the file, sometimes through several redirects.
//! [`ResourceResolver::resolve`] fetches the link, and while the answer is an
//! HTML page with an embed target it follows that target. The first non-HTML
//! answer is handed to the sink.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, instrument, warn};
use url::Url;

use super::classifier::find_embedded_target_in;
use super::filename::resource_name;
use super::sink::{ErrorHandler, ResourceSink, SinkError};
use crate::http::{HttpSession, SessionError, SessionRequest};

/// Embed hops followed before a task gives up.
pub const MAX_EMBED_DEPTH: usize = 10;

/// A resolved resource: its name and the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    /// Percent-decoded last path segment of `url`.
    pub name: String,
    /// URL after redirects.
    pub url: String,
}

/// How one resolver task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// A resource was found and handed to the sink.
    Resolved(ResourceReference),
    /// The chain ended in an HTML page without an embed, or looped.
    Empty,
    /// A fetch or the sink failed; the error handler was told.
    Failed,
}

impl ResolveOutcome {
    /// The reference, if one was resolved.
    #[must_use]
    pub fn reference(&self) -> Option<&ResourceReference> {
        match self {
            Self::Resolved(reference) => Some(reference),
            Self::Empty | Self::Failed => None,
        }
    }
}

/// Per-task failures passed to the [`ErrorHandler`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The server answered with something other than 200.
    #[error("{url} returned {status}")]
    Status {
        /// Final URL of the response.
        url: String,
        /// Status received.
        status: StatusCode,
    },
    /// The request or body read failed.
    #[error("request failed: {0}")]
    Session(#[source] SessionError),
    /// The sink refused or failed to store the resource.
    #[error("sink failed for {name}: {source}")]
    Sink {
        /// Resource name.
        name: String,
        /// Underlying sink error.
        #[source]
        source: SinkError,
    },
    /// An embed target could not be turned into an absolute URL.
    #[error("invalid embed target {href:?} on {base}")]
    InvalidTarget {
        /// Page that held the target.
        base: String,
        /// Raw target.
        href: String,
    },
}

/// Resolves links to resources through a shared session.
///
/// Cheap to clone; every clone shares the session, sink and error handler.
#[derive(Clone)]
pub struct ResourceResolver {
    session: Arc<HttpSession>,
    sink: Arc<dyn ResourceSink>,
    errors: Arc<dyn ErrorHandler>,
}

impl fmt::Debug for ResourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceResolver")
            .field("session", &self.session.home_url().as_str())
            .finish_non_exhaustive()
    }
}

impl ResourceResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        session: Arc<HttpSession>,
        sink: Arc<dyn ResourceSink>,
        errors: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            session,
            sink,
            errors,
        }
    }

    /// Follows `start` to at most one resource.
    ///
    /// Never fails: errors go to the error handler and yield
    /// [`ResolveOutcome::Failed`]. A URL seen twice in the same chain ends it
    /// with [`ResolveOutcome::Empty`].
    #[instrument(skip(self), fields(start = %start))]
    pub async fn resolve(&self, start: Url) -> ResolveOutcome {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = start;

        for depth in 0..=MAX_EMBED_DEPTH {
            if !visited.insert(current.to_string()) {
                debug!(url = %current, "embed chain loops back, stopping");
                return ResolveOutcome::Empty;
            }

            let response = match self
                .session
                .execute(SessionRequest::Get(current.clone()))
                .await
            {
                Ok(response) => response,
                Err(error) => return self.fail(current.as_str(), ResolveError::Session(error)),
            };

            let final_url = response.final_url().clone();
            if response.status() != StatusCode::OK {
                let status = response.status();
                response.discard().await;
                return self.fail(
                    current.as_str(),
                    ResolveError::Status {
                        url: final_url.to_string(),
                        status,
                    },
                );
            }
            if final_url != current && !visited.insert(final_url.to_string()) {
                debug!(url = %final_url, "redirected into a page already visited, stopping");
                return ResolveOutcome::Empty;
            }

            if !response.is_html() {
                let content_type = response.content_type().to_string();
                let name = resource_name(&final_url, &content_type);
                debug!(name, content_type, depth, "resource found");
                return match self
                    .sink
                    .accept(&content_type, &name, response.into_body())
                    .await
                {
                    Ok(()) => ResolveOutcome::Resolved(ResourceReference {
                        name,
                        url: final_url.to_string(),
                    }),
                    Err(source) => {
                        self.fail(final_url.as_str(), ResolveError::Sink { name, source })
                    }
                };
            }

            let html = match response.text().await {
                Ok(html) => html,
                Err(error) => return self.fail(final_url.as_str(), ResolveError::Session(error)),
            };
            let Some(href) = find_embedded_target_in(&html) else {
                debug!(url = %final_url, "page embeds no resource");
                return ResolveOutcome::Empty;
            };
            current = match final_url.join(&href) {
                Ok(next) => next,
                Err(_) => {
                    return self.fail(
                        final_url.as_str(),
                        ResolveError::InvalidTarget {
                            base: final_url.to_string(),
                            href,
                        },
                    );
                }
            };
            debug!(next = %current, "following embed target");
        }

        warn!(max_depth = MAX_EMBED_DEPTH, "embed chain too deep, giving up");
        ResolveOutcome::Empty
    }

    fn fail(&self, url: &str, error: ResolveError) -> ResolveOutcome {
        debug!(url, error = %error, "resolution failed");
        self.errors.handle_error(url, &error);
        ResolveOutcome::Failed
    }
}
