//! Consumers of resolved resources and of per-task failures.
//!
//! Sinks may be called from several resolver tasks at once; any shared state
//! they keep must be synchronized.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::filename::{extension_of, sanitize_file_name};

/// Suffix of files still being written.
const PART_SUFFIX: &str = ".part";
use super::resolver::ResolveError;
use crate::http::{ResourceBody, SessionError};

/// Errors a sink reports for one resource.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing the resource to disk failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Reading the body failed part-way.
    #[error("failed to read resource body: {0}")]
    Body(#[source] SessionError),
    /// A custom sink refused the resource.
    #[error("{0}")]
    Rejected(String),
}

impl SinkError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Receives every resolved resource.
///
/// The sink owns `body` and must read it to the end or drop it; either frees
/// the connection slot the body holds.
#[async_trait]
pub trait ResourceSink: Send + Sync {
    /// Consumes one resource.
    ///
    /// # Errors
    ///
    /// A returned error is reported to the [`ErrorHandler`] and the resource
    /// is left out of the results.
    async fn accept(
        &self,
        content_type: &str,
        name: &str,
        body: ResourceBody,
    ) -> Result<(), SinkError>;
}

/// Observes per-task failures. Cannot influence the crawl.
pub trait ErrorHandler: Send + Sync {
    /// Called once per failed fetch, with the URL that failed.
    fn handle_error(&self, url: &str, error: &ResolveError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&str, &ResolveError) + Send + Sync,
{
    fn handle_error(&self, url: &str, error: &ResolveError) {
        self(url, error);
    }
}

/// Logs failures at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, url: &str, error: &ResolveError) {
        warn!(url, error = %error, "resource could not be resolved");
    }
}

/// Reads and discards every body. Useful to list resources without saving.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

#[async_trait]
impl ResourceSink for DiscardSink {
    async fn accept(
        &self,
        content_type: &str,
        name: &str,
        body: ResourceBody,
    ) -> Result<(), SinkError> {
        let bytes = body.drain().await.map_err(SinkError::Body)?;
        debug!(name, content_type, bytes, "resource discarded");
        Ok(())
    }
}

/// Content types or extensions a sink accepts.
///
/// A resource matches a pattern when its content type contains the pattern
/// (`pdf` matches `application/pdf`) or when its extension equals it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    patterns: Option<BTreeSet<String>>,
}

impl ContentFilter {
    /// Accepts only resources matching one of `patterns`.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: Some(
                patterns
                    .into_iter()
                    .map(|pattern| pattern.into().trim().to_ascii_lowercase())
                    .filter(|pattern| !pattern.is_empty())
                    .collect(),
            ),
        }
    }

    /// Accepts everything.
    #[must_use]
    pub fn any() -> Self {
        Self { patterns: None }
    }

    /// Returns true when the resource should be kept.
    #[must_use]
    pub fn accepts(&self, content_type: &str, name: &str) -> bool {
        let Some(patterns) = &self.patterns else {
            return true;
        };
        let content_type = content_type.to_ascii_lowercase();
        let extension = extension_of(name);
        patterns.iter().any(|pattern| {
            content_type.contains(pattern.as_str()) || extension.as_deref() == Some(pattern.as_str())
        })
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(["pdf", "text/plain"])
    }
}

/// Writes accepted resources into a directory.
///
/// Names already present in the known set are skipped, as are names written
/// earlier in the same run, so concurrent duplicates produce one file.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    filter: ContentFilter,
    known: Mutex<BTreeSet<String>>,
    written: Mutex<Vec<String>>,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, filter: ContentFilter) -> Self {
        Self {
            dir: dir.into(),
            filter,
            known: Mutex::new(BTreeSet::new()),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Treats `names` as already downloaded.
    #[must_use]
    pub fn with_known(self, names: impl IntoIterator<Item = String>) -> Self {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(names);
        self
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names written so far, in completion order.
    #[must_use]
    pub fn written(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn claim(&self, file_name: &str) -> bool {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_name.to_string())
    }

    fn release(&self, file_name: &str) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file_name);
    }
}

#[async_trait]
impl ResourceSink for DirectorySink {
    #[instrument(level = "debug", skip(self, body), fields(dir = %self.dir.display()))]
    async fn accept(
        &self,
        content_type: &str,
        name: &str,
        body: ResourceBody,
    ) -> Result<(), SinkError> {
        if !self.filter.accepts(content_type, name) {
            debug!(name, content_type, "content type not accepted, skipping");
            return Ok(());
        }
        let Some(file_name) = sanitize_file_name(name) else {
            warn!(name, "resource name has no usable characters, skipping");
            return Ok(());
        };
        if !self.claim(&file_name) {
            debug!(file_name, "already downloaded, skipping");
            return Ok(());
        }

        let path = self.dir.join(&file_name);
        let partial = PartialFile {
            sink: self,
            path: self.dir.join(format!("{file_name}{PART_SUFFIX}")),
            file_name,
            armed: true,
        };
        let bytes = write_body(&partial.path, body).await?;
        tokio::fs::rename(&partial.path, &path)
            .await
            .map_err(|e| SinkError::io(&path, e))?;
        let file_name = partial.disarm();

        info!(path = %path.display(), bytes, "resource saved");
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(file_name);
        Ok(())
    }
}

/// A download in progress under its `.part` name.
///
/// Dropped while armed, whether on error or because the task was aborted
/// mid-write, it deletes the partial file and frees the claimed name.
struct PartialFile<'a> {
    sink: &'a DirectorySink,
    path: PathBuf,
    file_name: String,
    armed: bool,
}

impl PartialFile<'_> {
    fn disarm(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.file_name)
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.sink.release(&self.file_name);
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "partial file removed"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "could not remove partial file");
            }
        }
    }
}

async fn write_body(path: &Path, mut body: ResourceBody) -> Result<u64, SinkError> {
    let file = File::create(path)
        .await
        .map_err(|e| SinkError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = body.chunk().await.map_err(SinkError::Body)? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| SinkError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| SinkError::io(path, e))?;
    Ok(bytes_written)
}
