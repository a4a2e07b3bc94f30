//! Constants for the HTTP session (timeouts, connection caps, redirects).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Maximum number of in-flight connections across all hosts.
pub const MAX_CONNECTIONS: usize = 50;

/// Maximum number of in-flight connections to any single route.
pub const MAX_CONNECTIONS_PER_ROUTE: usize = 20;

/// Maximum number of in-flight connections to the platform host.
pub const MAX_CONNECTIONS_TO_TARGET: usize = 20;

/// Maximum redirect hops followed for one request.
pub const MAX_REDIRECTS: usize = 10;
