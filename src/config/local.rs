//! Per-directory course configuration (`.coursefetch`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ConfigError, read_json, write_json};

/// File name of the course config inside a course directory.
pub const LOCAL_CONFIG_FILE_NAME: &str = ".coursefetch";

/// Content types accepted when a course is initialised.
const DEFAULT_CTYPES: [&str; 2] = ["pdf", "text/plain"];

/// Course bound to one directory: what to pull and what was already pulled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Course display name.
    pub course: String,
    /// Course page URL.
    pub course_url: String,
    /// Accepted content types or extensions.
    #[serde(default)]
    pub ctypes: BTreeSet<String>,
    /// Resource names already written.
    #[serde(default)]
    pub downloaded: BTreeSet<String>,
}

impl LocalConfig {
    /// Creates a config with the default content types.
    #[must_use]
    pub fn new(course: impl Into<String>, course_url: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            course_url: course_url.into(),
            ctypes: DEFAULT_CTYPES.iter().map(ToString::to_string).collect(),
            downloaded: BTreeSet::new(),
        }
    }

    /// Path of the config file inside `dir`.
    #[must_use]
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(LOCAL_CONFIG_FILE_NAME)
    }

    /// Loads the config from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing or unparsable, or the
    /// course URL is not absolute.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(&Self::path_in(dir))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when writing fails.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        write_json(&Self::path_in(dir), self)
    }

    /// Checks that the course URL is absolute.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a relative or malformed URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.course_url)
            .map(|_| ())
            .map_err(|e| ConfigError::invalid("course_url", format!("{}: {e}", self.course_url)))
    }

    /// Adds content types. Returns true if any was new.
    pub fn add_ctypes<I, S>(&mut self, ctypes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ctypes
            .into_iter()
            .fold(false, |changed, ctype| self.ctypes.insert(ctype.into()) || changed)
    }

    /// Removes content types. Returns true if any was present.
    pub fn remove_ctypes<I, S>(&mut self, ctypes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ctypes
            .into_iter()
            .fold(false, |changed, ctype| self.ctypes.remove(ctype.as_ref()) || changed)
    }

    /// Records written resource names.
    pub fn record_downloaded(&mut self, names: impl IntoIterator<Item = String>) {
        self.downloaded.extend(names);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_new_uses_default_ctypes() {
        let config = LocalConfig::new("Algorithms", "https://moodle.example.ch/course/view.php?id=7");
        assert_eq!(
            config.ctypes.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["pdf", "text/plain"]
        );
    }

    #[test]
    fn test_add_and_remove_ctypes_report_changes() {
        let mut config = LocalConfig::new("Algorithms", "https://moodle.example.ch/c");
        assert!(config.add_ctypes(["zip", "pdf"]));
        assert!(!config.add_ctypes(["zip"]));
        assert!(config.remove_ctypes(["zip", "docx"]));
        assert!(!config.remove_ctypes(["docx"]));
        assert_eq!(config.ctypes.len(), 2);
    }

    #[test]
    fn test_save_then_load_in_dir() {
        let temp = TempDir::new().unwrap();
        let mut config = LocalConfig::new("Algorithms", "https://moodle.example.ch/c");
        config.record_downloaded(vec!["week1.pdf".to_string()]);
        config.save(temp.path()).unwrap();

        assert!(temp.path().join(".coursefetch").exists());
        assert_eq!(LocalConfig::load(temp.path()).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_relative_course_url() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".coursefetch"),
            r#"{"course": "x", "course_url": "/course/view.php?id=1"}"#,
        )
        .unwrap();
        assert!(matches!(
            LocalConfig::load(temp.path()),
            Err(ConfigError::Invalid { field: "course_url", .. })
        ));
    }
}
