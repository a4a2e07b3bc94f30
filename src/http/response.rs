//! Responses returned by [`HttpSession`](super::HttpSession).

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tracing::debug;
use url::Url;

use super::error::SessionError;
use super::limits::ConnectionPermit;

/// A response whose headers have arrived; the body is still on the wire.
#[derive(Debug)]
pub struct FetchedResponse {
    status: StatusCode,
    final_url: Url,
    content_type: String,
    body: ResourceBody,
}

impl FetchedResponse {
    pub(crate) fn new(response: reqwest::Response, permit: ConnectionPermit) -> Self {
        let status = response.status();
        let final_url = response.url().clone();
        let content_type = content_type_essence(response.headers());
        Self {
            status,
            content_type,
            body: ResourceBody {
                url: final_url.to_string(),
                response,
                _permit: permit,
            },
            final_url,
        }
    }

    /// HTTP status of the final response (after redirects).
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// URL that produced this response, after redirects.
    #[must_use]
    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    /// Lowercased media type without parameters, empty when the header is absent.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns true for `text/html` and `application/xhtml+xml`.
    #[must_use]
    pub fn is_html(&self) -> bool {
        matches!(
            self.content_type.as_str(),
            "text/html" | "application/xhtml+xml"
        )
    }

    /// Hands the body over, keeping the connection slot with it.
    #[must_use]
    pub fn into_body(self) -> ResourceBody {
        self.body
    }

    /// Reads the whole body as text.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Body`] or [`SessionError::Timeout`] if reading fails.
    pub async fn text(self) -> Result<String, SessionError> {
        self.body.text().await
    }

    /// Reads and discards the body, releasing the connection slot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Body`] or [`SessionError::Timeout`] if reading fails.
    pub async fn drain(self) -> Result<u64, SessionError> {
        self.body.drain().await
    }

    /// Drains a body nobody needs, e.g. of an error page, so the connection
    /// can be reused. A failed read is logged and otherwise ignored.
    pub async fn discard(self) {
        let status = self.status.as_u16();
        match self.body.drain().await {
            Ok(bytes) => debug!(status, bytes, "unused body drained"),
            Err(error) => debug!(status, error = %error, "unused body not fully read"),
        }
    }
}

/// Streaming response body. Holds a connection slot until dropped.
#[derive(Debug)]
pub struct ResourceBody {
    url: String,
    response: reqwest::Response,
    _permit: ConnectionPermit,
}

impl ResourceBody {
    /// URL the body is read from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Value of the `Content-Length` header, if any.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Reads the next chunk; `Ok(None)` at end of body.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Body`] or [`SessionError::Timeout`] if reading fails.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, SessionError> {
        self.response
            .chunk()
            .await
            .map_err(|e| SessionError::body(self.url.clone(), e))
    }

    /// Reads the whole body into memory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Body`] or [`SessionError::Timeout`] if reading fails.
    pub async fn bytes(self) -> Result<Bytes, SessionError> {
        let url = self.url;
        self.response
            .bytes()
            .await
            .map_err(|e| SessionError::body(url, e))
    }

    /// Reads the whole body as text, decoded per the response charset.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Body`] or [`SessionError::Timeout`] if reading fails.
    pub async fn text(self) -> Result<String, SessionError> {
        let url = self.url;
        self.response
            .text()
            .await
            .map_err(|e| SessionError::body(url, e))
    }

    /// Reads and discards every chunk. Returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Body`] or [`SessionError::Timeout`] if reading fails.
    pub async fn drain(mut self) -> Result<u64, SessionError> {
        let mut total = 0u64;
        while let Some(chunk) = self.chunk().await? {
            total += chunk.len() as u64;
        }
        Ok(total)
    }
}

fn content_type_essence(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default()
}
