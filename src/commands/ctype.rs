//! Course config command handlers: content types and dump.

use std::path::Path;

use anyhow::{Context, Result};
use coursefetch_core::config::LocalConfig;
use tracing::info;

pub fn run_add_ctype_command(dir: &Path, ctypes: &[String]) -> Result<()> {
    let mut config = load_local(dir)?;
    if config.add_ctypes(ctypes.iter().cloned()) {
        save_local(&config, dir)?;
        info!(ctypes = ?config.ctypes, "Content types updated");
    } else {
        info!("Content types unchanged");
    }
    Ok(())
}

pub fn run_rm_ctype_command(dir: &Path, ctypes: &[String]) -> Result<()> {
    let mut config = load_local(dir)?;
    if config.remove_ctypes(ctypes) {
        save_local(&config, dir)?;
        info!(ctypes = ?config.ctypes, "Content types updated");
    } else {
        info!("Content types unchanged");
    }
    Ok(())
}

pub fn run_dump_command(dir: &Path) -> Result<()> {
    let config = load_local(dir)?;
    let rendered =
        serde_json::to_string_pretty(&config).context("Failed to render course config")?;
    println!("{rendered}");
    Ok(())
}

pub(super) fn load_local(dir: &Path) -> Result<LocalConfig> {
    LocalConfig::load(dir).with_context(|| {
        format!(
            "No usable course config in '{}' (run `coursefetch init` first)",
            dir.display()
        )
    })
}

pub(super) fn save_local(config: &LocalConfig, dir: &Path) -> Result<()> {
    config
        .save(dir)
        .with_context(|| format!("Failed to write course config in '{}'", dir.display()))
}
