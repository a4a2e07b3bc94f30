//! Shared setup for commands that talk to the platform.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use coursefetch_core::auth::{AuthCredential, ConnectOutcome, CookieJarStore, FormAuthenticator};
use coursefetch_core::config::{GlobalConfig, resolve_default_config_path};
use coursefetch_core::http::HttpSession;
use tracing::{debug, info};

/// Options every command shares.
#[derive(Clone, Default)]
pub struct CommandContext {
    /// Explicit global config path.
    pub config_path: Option<PathBuf>,
    /// Explicit cookie directory.
    pub cookie_dir: Option<PathBuf>,
    /// Password overriding the stored one.
    pub password: Option<String>,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("config_path", &self.config_path)
            .field("cookie_dir", &self.cookie_dir)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CommandContext {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => resolve_default_config_path().context("Failed to resolve config path"),
        }
    }

    pub fn load_global(&self) -> Result<GlobalConfig> {
        let path = self.config_path()?;
        GlobalConfig::load(&path).with_context(|| {
            format!(
                "Failed to load config '{}' (run `coursefetch setup` first)",
                path.display()
            )
        })
    }

    pub fn cookie_store(&self, config: &GlobalConfig) -> CookieJarStore {
        let organisation = &config.platform.organisation_name;
        match &self.cookie_dir {
            Some(dir) => CookieJarStore::for_organisation(dir, organisation),
            None => CookieJarStore::in_temp_dir(organisation),
        }
    }

    pub fn credential(&self, config: &GlobalConfig) -> Result<AuthCredential> {
        match &self.password {
            Some(password) => Ok(AuthCredential::new(config.username.clone(), password.clone())),
            None => config
                .credential()
                .context("Stored password could not be decoded"),
        }
    }
}

/// A session restored from disk, not yet authenticated.
pub struct PlatformSession {
    pub config: GlobalConfig,
    pub store: CookieJarStore,
    pub session: Arc<HttpSession>,
}

impl PlatformSession {
    /// Builds a session whose jar holds the persisted cookies.
    pub fn restore(context: &CommandContext) -> Result<Self> {
        let config = context.load_global()?;
        let store = context.cookie_store(&config);
        let jar = match store.load_jar() {
            Ok(jar) => jar,
            Err(error) => {
                debug!(error = %error, "ignoring unreadable cookie file");
                coursefetch_core::SessionCookieJar::new()
            }
        };
        debug!(path = %store.path().display(), cookies = jar.len(), "cookie jar restored");
        let session = HttpSession::builder(config.platform.home_url())
            .cookie_jar(Arc::new(jar))
            .build()
            .context("Failed to create HTTP session")?;
        Ok(Self {
            config,
            store,
            session: Arc::new(session),
        })
    }

    /// Restores and signs in, reusing the stored session when still valid.
    pub async fn connect(context: &CommandContext) -> Result<Self> {
        let restored = Self::restore(context)?;
        let credential = context.credential(&restored.config)?;
        let outcome = FormAuthenticator::new(&restored.session, &restored.config.platform)
            .connect(&credential, Some(&restored.store))
            .await
            .context("Login failed")?;
        match outcome {
            ConnectOutcome::AlreadyAuthenticated => info!("Reusing stored session"),
            ConnectOutcome::Authenticated => info!("Signed in"),
        }
        Ok(restored)
    }

    pub fn close(&self) {
        self.session.close();
    }
}
