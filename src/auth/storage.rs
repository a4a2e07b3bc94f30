//! Cookie jar persistence across runs.
//!
//! One JSON file per organisation, written to a caller-chosen directory
//! (the system temp dir by default):
//! `{dir}/coursefetch-cookies-{organisation}.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::cookies::{SessionCookieJar, StoredCookie, unix_now};
use crate::config::write_owner_only;

const COOKIE_FILE_PREFIX: &str = "coursefetch-cookies-";
const COOKIE_FILE_EXTENSION: &str = "json";
const FORMAT_VERSION: u32 = 1;

/// Errors for persisted cookie storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem I/O failed.
    #[error("cookie file {path}: {source}")]
    Io {
        /// The cookie file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Serialization/deserialization failed.
    #[error("cookie file {path} is not valid: {source}")]
    Json {
        /// The cookie file path.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The file was written by an incompatible version.
    #[error("cookie file {path} has unsupported format version {version}")]
    UnsupportedVersion {
        /// The cookie file path.
        path: PathBuf,
        /// The version found in the file.
        version: u32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedJar {
    version: u32,
    saved_at: u64,
    cookies: Vec<StoredCookie>,
}

/// Reads and writes the cookie file of one organisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieJarStore {
    path: PathBuf,
}

impl CookieJarStore {
    /// Creates a store for `organisation` inside `dir`.
    #[must_use]
    pub fn for_organisation(dir: &Path, organisation: &str) -> Self {
        let file_name = format!(
            "{COOKIE_FILE_PREFIX}{}.{COOKIE_FILE_EXTENSION}",
            file_safe(organisation)
        );
        Self {
            path: dir.join(file_name),
        }
    }

    /// Creates a store for `organisation` in the system temp directory.
    #[must_use]
    pub fn in_temp_dir(organisation: &str) -> Self {
        Self::for_organisation(&std::env::temp_dir(), organisation)
    }

    /// Creates a store backed by an explicit file path.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the cookie file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads persisted cookies, dropping entries that have expired since.
    ///
    /// Returns `Ok(None)` when the file does not exist or is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the file cannot be read or parsed.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Option<Vec<StoredCookie>>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let persisted: PersistedJar =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
                path: self.path.clone(),
                source,
            })?;
        if persisted.version != FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                path: self.path.clone(),
                version: persisted.version,
            });
        }

        let now = unix_now();
        let total = persisted.cookies.len();
        let cookies: Vec<StoredCookie> = persisted
            .cookies
            .into_iter()
            .filter(|cookie| !cookie.is_expired_at(now))
            .collect();
        debug!(
            loaded = cookies.len(),
            expired = total - cookies.len(),
            "loaded persisted cookies"
        );
        Ok(Some(cookies))
    }

    /// Loads the persisted cookies into a fresh jar (empty when nothing is stored).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the file exists but cannot be read or parsed.
    pub fn load_jar(&self) -> Result<SessionCookieJar, StorageError> {
        Ok(SessionCookieJar::from_cookies(
            self.load()?.unwrap_or_default(),
        ))
    }

    /// Writes the jar's current cookies, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when serialization or writing fails.
    #[instrument(level = "debug", skip(self, jar), fields(path = %self.path.display()))]
    pub fn save(&self, jar: &SessionCookieJar) -> Result<usize, StorageError> {
        let persisted = PersistedJar {
            version: FORMAT_VERSION,
            saved_at: unix_now(),
            cookies: jar.snapshot(),
        };
        let payload = serde_json::to_vec_pretty(&persisted).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_owner_only(&self.path, &payload).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(
            path = %self.path.display(),
            cookies = persisted.cookies.len(),
            "saved session cookies"
        );
        Ok(persisted.cookies.len())
    }

    /// Removes the cookie file. Returns `true` when a file was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when removal fails for a reason other than absence.
    pub fn clear(&self) -> Result<bool, StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn file_safe(organisation: &str) -> String {
    let cleaned: String = organisation
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
