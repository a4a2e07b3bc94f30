//! Three-step federated form login.
//!
//! The platform delegates login to a SAML identity provider. Signing in means
//! posting three forms in sequence: organisation selection, credentials, and
//! the assertion confirmation. Each response carries hidden inputs that must
//! be sent back in the next step, so the field set grows as it is threaded
//! through.

use std::fmt;

use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use super::cookies::SessionCookieJar;
use super::storage::CookieJarStore;
use crate::config::PlatformLinks;
use crate::crawl::{has_logout_marker, hidden_fields};
use crate::http::{HttpSession, SessionError};

/// Cookie name fragment left by the identity provider after a login.
const IDP_COOKIE_MARKER: &str = "_saml_idp";

const FIELD_USER_IDP: &str = "user_idp";
const FIELD_USERNAME: &str = "j_username";
const FIELD_PASSWORD: &str = "j_password";

/// Username and password for the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCredential {
    username: String,
    password: String,
}

impl AuthCredential {
    /// Creates a credential.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Clear-text password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Form fields accumulated across the login steps, in the order added: the
/// values each step submits plus the hidden inputs harvested from each answer.
///
/// Every step posts the whole set.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HiddenFieldSet {
    fields: Vec<(String, String)>,
}

impl HiddenFieldSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every hidden input found in `html`. Returns how many were added.
    pub fn harvest(&mut self, html: &str) -> usize {
        let found = hidden_fields(html);
        let added = found.len();
        self.fields.extend(found);
        added
    }

    /// Collected pairs.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Number of collected pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends one field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }
}

// SAML assertions are bearer tokens; only names are shown.
impl fmt::Debug for HiddenFieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|(name, _)| name))
            .finish()
    }
}

/// A request issued by the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    /// Posting the organisation to the discovery service.
    OrganisationSelection,
    /// Posting username and password to the identity provider.
    Credentials,
    /// Posting the assertion back to the platform.
    Confirmation,
    /// Fetching the home page to test an existing session.
    SessionCheck,
    /// Fetching the logout page.
    Logout,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OrganisationSelection => "organisation selection",
            Self::Credentials => "credentials",
            Self::Confirmation => "confirmation",
            Self::SessionCheck => "session check",
            Self::Logout => "logout",
        };
        f.write_str(label)
    }
}

/// Errors raised while signing in or out.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A step answered with something other than 200.
    #[error("{step} step failed: POST {url} returned {status}")]
    StepFailed {
        /// Failing step.
        step: AuthStep,
        /// URL that was posted to.
        url: String,
        /// Status received.
        status: StatusCode,
    },
    /// The request itself failed.
    #[error("{step} step failed: {source}")]
    Session {
        /// Failing step.
        step: AuthStep,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
}

impl AuthError {
    /// Step at which the failure happened.
    #[must_use]
    pub fn step(&self) -> AuthStep {
        match self {
            Self::StepFailed { step, .. } | Self::Session { step, .. } => *step,
        }
    }
}

/// How [`FormAuthenticator::connect`] obtained a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Restored cookies were still accepted; no form was posted.
    AlreadyAuthenticated,
    /// The full login sequence ran.
    Authenticated,
}

/// Drives the login sequence on a shared [`HttpSession`].
///
/// Cookies the identity provider and platform set land in the session's jar,
/// so every later request made through the same session is authenticated.
#[derive(Debug, Clone, Copy)]
pub struct FormAuthenticator<'a> {
    session: &'a HttpSession,
    links: &'a PlatformLinks,
}

impl<'a> FormAuthenticator<'a> {
    /// Creates an authenticator for `links` on `session`.
    #[must_use]
    pub fn new(session: &'a HttpSession, links: &'a PlatformLinks) -> Self {
        Self { session, links }
    }

    /// Signs in, reusing restored cookies when the platform still accepts
    /// them, then persists the jar to `store`.
    ///
    /// A failed save is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the full login sequence fails.
    #[instrument(skip(self, credential, store), fields(username = %credential.username()))]
    pub async fn connect(
        &self,
        credential: &AuthCredential,
        store: Option<&CookieJarStore>,
    ) -> Result<ConnectOutcome, AuthError> {
        let outcome = if has_viable_cookies(self.session.cookie_jar()) && self.fast_path().await {
            info!("restored session is still valid");
            ConnectOutcome::AlreadyAuthenticated
        } else {
            self.authenticate(credential).await?;
            ConnectOutcome::Authenticated
        };

        if let Some(store) = store
            && let Err(error) = store.save(self.session.cookie_jar())
        {
            warn!(error = %error, "could not persist session cookies");
        }
        Ok(outcome)
    }

    /// Runs the three login steps unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StepFailed`] on the first non-200 step, or
    /// [`AuthError::Session`] when a request fails.
    #[instrument(skip(self, credential), fields(username = %credential.username()))]
    pub async fn authenticate(&self, credential: &AuthCredential) -> Result<(), AuthError> {
        let fields = self.select_organisation(HiddenFieldSet::new()).await?;
        let fields = self.submit_credentials(fields, credential).await?;
        let fields = self.confirm(fields).await?;
        info!(hidden_fields = fields.len(), "authenticated");
        Ok(())
    }

    /// Step 1: adds the organisation's entity id and posts the collected
    /// fields to the discovery service.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate).
    pub async fn select_organisation(
        &self,
        mut fields: HiddenFieldSet,
    ) -> Result<HiddenFieldSet, AuthError> {
        fields.push(FIELD_USER_IDP, self.links.organisation_idp());
        let body = self
            .post_step(
                AuthStep::OrganisationSelection,
                &self.links.organisation_form_url(),
                fields.fields(),
            )
            .await?;
        fields.harvest(&body);
        Ok(fields)
    }

    /// Step 2: adds username and password and posts the collected fields.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate).
    pub async fn submit_credentials(
        &self,
        mut fields: HiddenFieldSet,
        credential: &AuthCredential,
    ) -> Result<HiddenFieldSet, AuthError> {
        fields.push(FIELD_USERNAME, credential.username());
        fields.push(FIELD_PASSWORD, credential.password());
        let body = self
            .post_step(
                AuthStep::Credentials,
                &self.links.credential_form_url(),
                fields.fields(),
            )
            .await?;
        fields.harvest(&body);
        Ok(fields)
    }

    /// Step 3: posts every collected field to the platform.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate).
    pub async fn confirm(&self, mut fields: HiddenFieldSet) -> Result<HiddenFieldSet, AuthError> {
        let body = self
            .post_step(
                AuthStep::Confirmation,
                &self.links.confirmation_url(),
                fields.fields(),
            )
            .await?;
        fields.harvest(&body);
        Ok(fields)
    }

    /// Returns true when the home page shows a logout link.
    ///
    /// A non-200 home page means "not signed in", not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] when the request fails.
    #[instrument(skip(self))]
    pub async fn has_valid_session(&self) -> Result<bool, AuthError> {
        let step = AuthStep::SessionCheck;
        let response = self
            .session
            .get(self.links.home_url())
            .await
            .map_err(|source| AuthError::Session { step, source })?;
        if response.status() != StatusCode::OK {
            debug!(status = response.status().as_u16(), "home page not available");
            response.discard().await;
            return Ok(false);
        }
        let html = response
            .text()
            .await
            .map_err(|source| AuthError::Session { step, source })?;
        Ok(has_logout_marker(&html))
    }

    /// Signs out. Returns true when the platform answered 200.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] when the request fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<bool, AuthError> {
        let step = AuthStep::Logout;
        let response = self
            .session
            .get(&self.links.logout_url())
            .await
            .map_err(|source| AuthError::Session { step, source })?;
        let signed_out = response.status() == StatusCode::OK;
        response.discard().await;
        if signed_out {
            info!("signed out");
        } else {
            warn!("logout was not acknowledged");
        }
        Ok(signed_out)
    }

    async fn fast_path(&self) -> bool {
        match self.has_valid_session().await {
            Ok(valid) => valid,
            Err(error) => {
                debug!(error = %error, "session check failed, signing in again");
                false
            }
        }
    }

    async fn post_step(
        &self,
        step: AuthStep,
        url: &str,
        form: &[(String, String)],
    ) -> Result<String, AuthError> {
        info!(step = %step, url, "submitting form");
        let response = self
            .session
            .post_form(url, form)
            .await
            .map_err(|source| AuthError::Session { step, source })?;
        let status = response.status();
        debug!(step = %step, status = status.as_u16(), final_url = %response.final_url(), "form answered");
        if status != StatusCode::OK {
            response.discard().await;
            return Err(AuthError::StepFailed {
                step,
                url: url.to_string(),
                status,
            });
        }
        response
            .text()
            .await
            .map_err(|source| AuthError::Session { step, source })
    }
}

/// Returns true when the jar holds an identity-provider cookie worth testing.
#[must_use]
pub fn has_viable_cookies(jar: &SessionCookieJar) -> bool {
    !jar.is_empty() && jar.contains_name(IDP_COOKIE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StoredCookie;

    #[test]
    fn test_credential_debug_redacts_password() {
        let rendered = format!("{:?}", AuthCredential::new("jane", "hunter2"));
        assert!(rendered.contains("jane"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_hidden_field_set_harvest_appends() {
        let mut fields = HiddenFieldSet::new();
        assert_eq!(
            fields.harvest(r#"<input type="hidden" name="RelayState" value="r1">"#),
            1
        );
        fields.harvest(r#"<input type="hidden" name="SAMLResponse" value="PHNhbWw+">"#);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("SAMLResponse"), Some("PHNhbWw+"));
        assert_eq!(format!("{fields:?}"), r#"["RelayState", "SAMLResponse"]"#);
    }

    #[test]
    fn test_pushed_and_harvested_fields_keep_order() {
        let mut fields = HiddenFieldSet::new();
        fields.push("user_idp", "https://aai.example.ch/idp/shibboleth");
        fields.harvest(r#"<input type="hidden" name="a" value="1">"#);
        fields.push("j_username", "jane");
        fields.push("j_password", "pw");
        let names: Vec<&str> = fields.fields().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["user_idp", "a", "j_username", "j_password"]);
        assert!(!format!("{fields:?}").contains("jane"));
    }

    #[test]
    fn test_has_viable_cookies_requires_idp_marker() {
        assert!(!has_viable_cookies(&SessionCookieJar::new()));
        let jar = SessionCookieJar::from_cookies(vec![StoredCookie::new(
            "MoodleSession",
            "x",
            "m.example.ch",
            "/",
        )]);
        assert!(!has_viable_cookies(&jar));
        let jar = SessionCookieJar::from_cookies(vec![StoredCookie::new(
            "_saml_idp",
            "x",
            "aai.example.ch",
            "/",
        )]);
        assert!(has_viable_cookies(&jar));
    }

    #[test]
    fn test_auth_error_display_names_step() {
        let error = AuthError::StepFailed {
            step: AuthStep::Credentials,
            url: "https://aai.example.ch/idp/Authn/UserPassword".to_string(),
            status: StatusCode::UNAUTHORIZED,
        };
        assert_eq!(error.step(), AuthStep::Credentials);
        assert!(error.to_string().starts_with("credentials step failed"));
        assert!(error.to_string().contains("401"));
    }
}
