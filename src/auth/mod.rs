//! Authentication: the session cookie jar, its on-disk persistence and the
//! federated form login.

mod cookies;
mod form;
mod storage;

pub use cookies::{SessionCookieJar, StoredCookie};
pub use form::{
    AuthCredential, AuthError, AuthStep, ConnectOutcome, FormAuthenticator, HiddenFieldSet,
    has_viable_cookies,
};
pub use storage::{CookieJarStore, StorageError};
