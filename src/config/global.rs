//! Per-user configuration: credentials and the target platform.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ConfigError, PlatformLinks, read_json, write_json_owner_only};
use crate::auth::AuthCredential;

/// Global configuration stored under the user's config directory.
///
/// The password is hex-encoded on disk. That is obfuscation against a casual
/// glance, not encryption; the file is written owner-only on unix.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Platform login name.
    pub username: String,
    #[serde(rename = "password")]
    password_hex: String,
    /// Platform descriptor.
    pub platform: PlatformLinks,
}

impl std::fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("platform", &self.platform)
            .finish()
    }
}

impl GlobalConfig {
    /// Creates a config from clear-text values.
    #[must_use]
    pub fn new(username: impl Into<String>, password: &str, platform: PlatformLinks) -> Self {
        Self {
            username: username.into(),
            password_hex: hex::encode(password.as_bytes()),
            platform,
        }
    }

    /// Replaces the stored password.
    pub fn set_password(&mut self, password: &str) {
        self.password_hex = hex::encode(password.as_bytes());
    }

    /// Decodes the stored password.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the stored value is not valid hex
    /// or does not decode to UTF-8.
    pub fn password(&self) -> Result<String, ConfigError> {
        let bytes = hex::decode(&self.password_hex)
            .map_err(|e| ConfigError::invalid("password", format!("not hex-encoded: {e}")))?;
        String::from_utf8(bytes).map_err(|_| ConfigError::invalid("password", "not valid UTF-8"))
    }

    /// Builds the login credential from the stored values.
    ///
    /// # Errors
    ///
    /// See [`password`](Self::password).
    pub fn credential(&self) -> Result<AuthCredential, ConfigError> {
        Ok(AuthCredential::new(self.username.clone(), self.password()?))
    }

    /// Validates the username and platform descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::invalid("username", "must not be empty"));
        }
        self.password()?;
        self.platform.validate()
    }

    /// Loads and validates the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, unparsable or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.validate()?;
        debug!(path = %path.display(), username = %config.username, "loaded global config");
        Ok(config)
    }

    /// Writes the config to `path` with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write_json_owner_only(path, self)
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/coursefetch/config.json`
/// 2. `$HOME/.config/coursefetch/config.json`
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] when neither variable is set.
pub fn resolve_default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg_config_home)
            .join("coursefetch")
            .join("config.json"));
    }
    let home = env_var_non_empty_os("HOME").ok_or(ConfigError::NoConfigDir)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("coursefetch")
        .join("config.json"))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample() -> GlobalConfig {
        GlobalConfig::new(
            "jane.doe",
            "hunter2",
            PlatformLinks::new(
                "https://cyberlearn.hes-so.ch",
                "https://aai.hes-so.ch",
                "HES-SO",
            ),
        )
    }

    #[test]
    fn test_password_is_hex_on_disk() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["password"], "68756e74657232");
        assert_eq!(sample().password().unwrap(), "hunter2");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("68756e74657232"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("coursefetch").join("config.json");
        sample().save(&path).unwrap();
        let loaded = GlobalConfig::load(&path).unwrap();
        assert_eq!(loaded, sample());
        let credential = loaded.credential().unwrap();
        assert_eq!(credential.username(), "jane.doe");
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        sample().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(GlobalConfig::load(&path).unwrap(), sample());
    }

    #[test]
    fn test_load_rejects_bad_hex() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"username": "jane", "password": "zz",
                "platform": {"home_url": "https://m.example.ch", "idp": "https://aai.example.ch",
                             "organisation_name": "x"}}"#,
        )
        .unwrap();
        assert!(matches!(
            GlobalConfig::load(&path),
            Err(ConfigError::Invalid { field: "password", .. })
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            GlobalConfig::load(&temp.path().join("absent.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_set_password_replaces_value() {
        let mut config = sample();
        config.set_password("correct horse");
        assert_eq!(config.password().unwrap(), "correct horse");
    }
}
