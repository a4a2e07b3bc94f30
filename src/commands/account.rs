//! Account command handlers: setup, login and logout.

use anyhow::{Context, Result, bail};
use coursefetch_core::auth::FormAuthenticator;
use coursefetch_core::config::{GlobalConfig, PlatformLinks};
use tracing::{info, warn};

use super::session::{CommandContext, PlatformSession};

/// Values for `coursefetch setup`.
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub username: String,
    pub home_url: String,
    pub idp: String,
    pub organisation: String,
}

pub fn run_setup_command(context: &CommandContext, request: SetupRequest) -> Result<()> {
    let Some(password) = context.password.as_deref() else {
        bail!("A password is required: pass --password or set COURSEFETCH_PASSWORD");
    };
    let platform = PlatformLinks::new(request.home_url, request.idp, request.organisation);
    let config = GlobalConfig::new(request.username, password, platform);
    config.validate().context("Invalid setup values")?;

    let path = context.config_path()?;
    config
        .save(&path)
        .with_context(|| format!("Failed to write config '{}'", path.display()))?;
    info!(path = %path.display(), username = %config.username, "Saved global config");
    Ok(())
}

pub async fn run_login_command(context: &CommandContext) -> Result<()> {
    let platform = PlatformSession::connect(context).await?;
    info!(
        organisation = %platform.config.platform.organisation_name,
        cookies = platform.session.cookie_jar().len(),
        path = %platform.store.path().display(),
        "Session stored"
    );
    platform.close();
    Ok(())
}

pub async fn run_logout_command(context: &CommandContext) -> Result<()> {
    let platform = PlatformSession::restore(context)?;
    let signed_out = FormAuthenticator::new(&platform.session, &platform.config.platform)
        .logout()
        .await
        .context("Logout request failed")?;
    platform.close();

    let removed = platform
        .store
        .clear()
        .context("Failed to remove the stored session")?;
    if !signed_out {
        warn!("Platform did not acknowledge the logout");
    }
    if removed {
        info!(path = %platform.store.path().display(), "Cleared stored session");
    } else {
        info!("No stored session found");
    }
    Ok(())
}
