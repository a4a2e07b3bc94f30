//! HTTP session plumbing: the shared client, connection caps and streaming
//! responses.

mod constants;
mod error;
mod limits;
mod response;
mod session;

pub use constants::{
    CONNECT_TIMEOUT_SECS, MAX_CONNECTIONS, MAX_CONNECTIONS_PER_ROUTE, MAX_CONNECTIONS_TO_TARGET,
    MAX_REDIRECTS, READ_TIMEOUT_SECS,
};
pub use error::SessionError;
pub use limits::{ConnectionLimiter, ConnectionPermit, LimiterClosed, PoolLimits, route_key};
pub use response::{FetchedResponse, ResourceBody};
pub use session::{HttpSession, HttpSessionBuilder, SessionRequest};
