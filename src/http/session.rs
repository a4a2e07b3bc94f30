//! Shared HTTP session for one platform.
//!
//! An [`HttpSession`] owns the reqwest client, the cookie jar every request
//! reads from and writes to, and the [`ConnectionLimiter`] that caps requests
//! in flight. It is designed to be wrapped in an `Arc` and shared by every
//! task of a crawl.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, READ_TIMEOUT_SECS};
use super::error::SessionError;
use super::limits::{ConnectionLimiter, PoolLimits, route_key};
use super::response::FetchedResponse;
use crate::auth::SessionCookieJar;
use crate::user_agent;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request the session can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    /// Plain GET.
    Get(Url),
    /// POST with an url-encoded form body. Field order is preserved.
    PostForm {
        /// Target URL.
        url: Url,
        /// Form fields in submission order.
        fields: Vec<(String, String)>,
    },
}

impl SessionRequest {
    /// Returns the request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        match self {
            Self::Get(url) | Self::PostForm { url, .. } => url,
        }
    }

    fn method(&self) -> &'static str {
        match self {
            Self::Get(_) => "GET",
            Self::PostForm { .. } => "POST",
        }
    }
}

/// Builder for [`HttpSession`].
#[derive(Debug)]
pub struct HttpSessionBuilder {
    home_url: String,
    limits: PoolLimits,
    cookie_jar: Option<Arc<SessionCookieJar>>,
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: Option<String>,
}

impl HttpSessionBuilder {
    /// Overrides the connection ceilings.
    #[must_use]
    pub fn limits(mut self, limits: PoolLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Uses an existing cookie jar, e.g. one restored from disk.
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<SessionCookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Sets the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the overall per-request timeout, body included.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Overrides the User-Agent header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the home URL has no host, or
    /// [`SessionError::ClientBuild`] if the reqwest client cannot be built.
    #[instrument(level = "debug", skip(self), fields(home_url = %self.home_url))]
    pub fn build(self) -> Result<HttpSession, SessionError> {
        let home = Url::parse(&self.home_url)
            .ok()
            .filter(|url| url.host_str().is_some())
            .ok_or_else(|| SessionError::invalid_url(&self.home_url))?;
        let cookies = self.cookie_jar.unwrap_or_default();
        let user_agent = self
            .user_agent
            .unwrap_or_else(user_agent::default_session_user_agent);

        let client = base_client_builder(
            Arc::clone(&cookies),
            self.connect_timeout,
            self.read_timeout,
            &user_agent,
        )
        .build()
        .map_err(SessionError::ClientBuild)?;

        let limiter = ConnectionLimiter::new(self.limits, route_key(&home));
        debug!(target_route = limiter.target_route(), "HTTP session ready");

        Ok(HttpSession {
            client: RwLock::new(Some(client)),
            cookies,
            limiter,
            home,
        })
    }
}

/// HTTP session shared by the authenticator and every crawl task.
///
/// Bodies are not buffered: a [`FetchedResponse`] keeps its connection slot
/// until the body is consumed or dropped. Non-success status codes are
/// returned as ordinary responses.
///
/// # Example
///
/// ```no_run
/// use coursefetch_core::http::HttpSession;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = HttpSession::new("https://cyberlearn.example.ch")?;
/// let response = session.get("https://cyberlearn.example.ch/my/").await?;
/// println!("{} from {}", response.status(), response.final_url());
/// session.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpSession {
    client: RwLock<Option<Client>>,
    cookies: Arc<SessionCookieJar>,
    limiter: ConnectionLimiter,
    home: Url,
}

impl HttpSession {
    /// Creates a session with default limits, timeouts and an empty cookie jar.
    ///
    /// # Errors
    ///
    /// See [`HttpSessionBuilder::build`].
    pub fn new(home_url: &str) -> Result<Self, SessionError> {
        Self::builder(home_url).build()
    }

    /// Starts a builder for a session targeting `home_url`.
    #[must_use]
    pub fn builder(home_url: impl Into<String>) -> HttpSessionBuilder {
        HttpSessionBuilder {
            home_url: home_url.into(),
            limits: PoolLimits::default(),
            cookie_jar: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            user_agent: None,
        }
    }

    /// Returns the platform home URL.
    #[must_use]
    pub fn home_url(&self) -> &Url {
        &self.home
    }

    /// Returns the cookie jar shared with the client.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<SessionCookieJar> {
        &self.cookies
    }

    /// Returns the connection ceilings in force.
    #[must_use]
    pub fn limits(&self) -> PoolLimits {
        self.limiter.limits()
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on an unparsable URL, a closed session, or a
    /// transport failure.
    pub async fn get(&self, url: &str) -> Result<FetchedResponse, SessionError> {
        self.execute(SessionRequest::Get(parse_url(url)?)).await
    }

    /// Sends an url-encoded form POST.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<FetchedResponse, SessionError> {
        self.execute(SessionRequest::PostForm {
            url: parse_url(url)?,
            fields: fields.to_vec(),
        })
        .await
    }

    /// Executes a request, waiting for a connection slot first.
    ///
    /// Redirects are followed (up to a fixed limit); the returned response
    /// reports the final URL.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`close`](Self::close), or a
    /// transport error from the client.
    #[instrument(level = "debug", skip(self, request), fields(method = request.method(), url = %request.url()))]
    pub async fn execute(&self, request: SessionRequest) -> Result<FetchedResponse, SessionError> {
        let client = self.client()?;
        let permit = self
            .limiter
            .acquire(request.url())
            .await
            .map_err(|_| SessionError::Closed)?;

        let url = request.url().to_string();
        let builder = match request {
            SessionRequest::Get(target) => client.get(target),
            SessionRequest::PostForm { url: target, fields } => client
                .post(target)
                .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
                .body(encode_form(&fields)),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| SessionError::from_request(&url, e))?;
        debug!(
            status = response.status().as_u16(),
            final_url = %response.url(),
            "response received"
        );
        Ok(FetchedResponse::new(response, permit))
    }

    /// Closes the session. Requests issued afterwards fail with
    /// [`SessionError::Closed`]; calling it twice is harmless.
    pub fn close(&self) {
        let taken = match self.client.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.limiter.close();
        if taken.is_some() {
            info!(home_url = %self.home, "HTTP session closed");
        }
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.limiter.is_closed()
    }

    fn client(&self) -> Result<Client, SessionError> {
        let guard = self.client.read().map_err(|_| SessionError::Closed)?;
        guard.clone().ok_or(SessionError::Closed)
    }
}

fn base_client_builder(
    cookies: Arc<SessionCookieJar>,
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: &str,
) -> ClientBuilder {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .gzip(true)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .user_agent(user_agent)
        .cookie_provider(cookies)
}

fn parse_url(url: &str) -> Result<Url, SessionError> {
    Url::parse(url).map_err(|_| SessionError::invalid_url(url))
}

fn encode_form(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish()
}
