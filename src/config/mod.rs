//! On-disk configuration: the platform descriptor, per-user credentials and
//! per-directory course settings.

mod global;
mod local;
mod platform;

use std::path::PathBuf;

pub use global::{GlobalConfig, resolve_default_config_path};
pub use local::{LOCAL_CONFIG_FILE_NAME, LocalConfig};
pub use platform::PlatformLinks;

/// Errors raised while loading, validating or saving configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("config file {path}: {source}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file content is not valid JSON for the expected shape.
    #[error("config file {path} could not be parsed: {source}")]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// A value is present but unusable.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("cannot locate the config directory: set XDG_CONFIG_HOME or HOME")]
    NoConfigDir,
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<T, ConfigError> {
    let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_json<T: serde::Serialize>(
    path: &std::path::Path,
    value: &T,
) -> Result<(), ConfigError> {
    write_json_with(path, value, |path, payload| {
        create_parent_dir(path)?;
        std::fs::write(path, payload)
    })
}

/// Like [`write_json`], but the file is never readable by other users, not
/// even while it is being written.
pub(crate) fn write_json_owner_only<T: serde::Serialize>(
    path: &std::path::Path,
    value: &T,
) -> Result<(), ConfigError> {
    write_json_with(path, value, write_owner_only)
}

fn write_json_with<T: serde::Serialize>(
    path: &std::path::Path,
    value: &T,
    write: impl FnOnce(&std::path::Path, &[u8]) -> std::io::Result<()>,
) -> Result<(), ConfigError> {
    let payload = serde_json::to_vec_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    write(path, &payload).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `payload` to `path`, creating parent directories. On unix the file
/// is opened with mode 0600, and an existing file is narrowed to 0600 before
/// anything is written.
pub(crate) fn write_owner_only(path: &std::path::Path, payload: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    create_parent_dir(path)?;
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // `mode` only applies when the file is created.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(payload)?;
    file.flush()
}

fn create_parent_dir(path: &std::path::Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
