//! User-Agent string sent by every session request.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/coursefetch";

/// Default User-Agent for platform sessions.
#[must_use]
pub(crate) fn default_session_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("coursefetch/{version} (course-sync; +{PROJECT_UA_URL})")
}
