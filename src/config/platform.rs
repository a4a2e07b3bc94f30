//! Platform descriptor and the login URLs derived from it.

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

const WAYF_BASE_URL: &str = "https://wayf.switch.ch/SWITCHaai/WAYF";

/// Describes one platform: where it lives, which identity provider it trusts,
/// and under which organisation name its cookies are stored.
///
/// Every derived URL can be pinned explicitly; otherwise it is computed from
/// `home_url` and `idp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLinks {
    /// Platform root, e.g. `https://cyberlearn.hes-so.ch`.
    pub home_url: String,
    /// Identity-provider root, e.g. `https://aai.hes-so.ch`.
    pub idp: String,
    /// Organisation display name.
    pub organisation_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    organisation_form_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential_form_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confirmation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logout_url: Option<String>,
}

impl PlatformLinks {
    /// Creates a descriptor with every URL derived. Trailing slashes are trimmed.
    #[must_use]
    pub fn new(
        home_url: impl Into<String>,
        idp: impl Into<String>,
        organisation_name: impl Into<String>,
    ) -> Self {
        Self {
            home_url: trim_root(home_url.into()),
            idp: trim_root(idp.into()),
            organisation_name: organisation_name.into(),
            organisation_form_url: None,
            credential_form_url: None,
            confirmation_url: None,
            logout_url: None,
        }
    }

    /// Pins the organisation-selection URL.
    #[must_use]
    pub fn with_organisation_form_url(mut self, url: impl Into<String>) -> Self {
        self.organisation_form_url = Some(url.into());
        self
    }

    /// Pins the credential form URL.
    #[must_use]
    pub fn with_credential_form_url(mut self, url: impl Into<String>) -> Self {
        self.credential_form_url = Some(url.into());
        self
    }

    /// Pins the confirmation URL.
    #[must_use]
    pub fn with_confirmation_url(mut self, url: impl Into<String>) -> Self {
        self.confirmation_url = Some(url.into());
        self
    }

    /// Pins the logout URL.
    #[must_use]
    pub fn with_logout_url(mut self, url: impl Into<String>) -> Self {
        self.logout_url = Some(url.into());
        self
    }

    /// Platform root without trailing slash.
    #[must_use]
    pub fn home_url(&self) -> &str {
        self.home_url.trim_end_matches('/')
    }

    /// Organisation-selection (WAYF) URL, returning to the platform's
    /// Shibboleth login handler.
    #[must_use]
    pub fn organisation_form_url(&self) -> String {
        if let Some(url) = &self.organisation_form_url {
            return url.clone();
        }
        let home = self.home_url();
        let target = format!("{home}/auth/shibboleth/index.php");
        let return_to = format!(
            "{home}/Shibboleth.sso/Login?SAMLDS=1&target={}",
            urlencoding::encode(&target)
        );
        format!(
            "{WAYF_BASE_URL}?entityID={}&return={}",
            urlencoding::encode(&format!("{home}/shibboleth")),
            urlencoding::encode(&return_to)
        )
    }

    /// Entity id posted as `user_idp` in the organisation step.
    #[must_use]
    pub fn organisation_idp(&self) -> String {
        format!("{}/idp/shibboleth", self.idp.trim_end_matches('/'))
    }

    /// Username/password form URL at the identity provider.
    #[must_use]
    pub fn credential_form_url(&self) -> String {
        self.credential_form_url.clone().unwrap_or_else(|| {
            format!("{}/idp/Authn/UserPassword", self.idp.trim_end_matches('/'))
        })
    }

    /// Assertion consumer URL on the platform.
    #[must_use]
    pub fn confirmation_url(&self) -> String {
        self.confirmation_url
            .clone()
            .unwrap_or_else(|| format!("{}/Shibboleth.sso/SAML2/POST", self.home_url()))
    }

    /// Logout URL on the platform.
    #[must_use]
    pub fn logout_url(&self) -> String {
        self.logout_url
            .clone()
            .unwrap_or_else(|| format!("{}/login/logout.php", self.home_url()))
    }

    /// Checks that the roots are absolute http(s) URLs and the name is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("platform.home_url", &self.home_url)?;
        validate_http_url("platform.idp", &self.idp)?;
        if self.organisation_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "platform.organisation_name",
                "must not be empty",
            ));
        }
        for (field, value) in [
            ("platform.organisation_form_url", &self.organisation_form_url),
            ("platform.credential_form_url", &self.credential_form_url),
            ("platform.confirmation_url", &self.confirmation_url),
            ("platform.logout_url", &self.logout_url),
        ] {
            if let Some(value) = value {
                validate_http_url(field, value)?;
            }
        }
        Ok(())
    }
}

fn trim_root(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed =
        Url::parse(value).map_err(|e| ConfigError::invalid(field, format!("{value}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::invalid(
            field,
            format!("{value}: expected an http(s) URL"),
        ));
    }
    Ok(())
}
