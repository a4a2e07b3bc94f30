//! Integration tests for the federated form login against a mock platform.

use std::sync::Arc;

use coursefetch_core::auth::{
    AuthCredential, AuthError, AuthStep, ConnectOutcome, CookieJarStore, FormAuthenticator,
    SessionCookieJar, StoredCookie,
};
use coursefetch_core::http::HttpSession;
use reqwest::StatusCode;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::{html, platform};

const SIGNED_IN_HOME: &str = r#"<html><body>
    <div class="logininfo">You are logged in. <a href="/login/logout.php?sesskey=1">Log out</a></div>
    </body></html>"#;

const SIGNED_OUT_HOME: &str = r#"<html><body>
    <div class="logininfo">You are not logged in. <a href="/login/index.php">Log in</a></div>
    </body></html>"#;

fn credential() -> AuthCredential {
    AuthCredential::new("jane.doe", "s3cret pass")
}

/// Mounts the three login steps, each answering with the hidden fields the
/// next step must echo back. Every step expects all fields submitted before.
async fn mount_login_flow(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/wayf"))
        .and(body_string_contains("user_idp="))
        .respond_with(html(
            r#"<form><input type="hidden" name="RelayState" value="relay-1"></form>"#,
        ))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/aai/idp/Authn/UserPassword"))
        .and(body_string_contains("user_idp="))
        .and(body_string_contains("RelayState=relay-1"))
        .and(body_string_contains("j_username=jane.doe"))
        .and(body_string_contains("j_password=s3cret+pass"))
        .respond_with(html(
            r#"<form><input type="hidden" name="SAMLResponse" value="assertion"></form>"#,
        ))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Shibboleth.sso/SAML2/POST"))
        .and(body_string_contains("user_idp="))
        .and(body_string_contains("RelayState=relay-1"))
        .and(body_string_contains("j_username=jane.doe"))
        .and(body_string_contains("j_password=s3cret+pass"))
        .and(body_string_contains("SAMLResponse=assertion"))
        .respond_with(
            html(SIGNED_IN_HOME).insert_header("Set-Cookie", "_saml_idp=aWRw; Path=/"),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_authenticate_threads_hidden_fields_through_all_steps() {
    let server = MockServer::start().await;
    mount_login_flow(&server).await;
    let links = platform(&server);
    let session = HttpSession::new(&server.uri()).unwrap();

    FormAuthenticator::new(&session, &links)
        .authenticate(&credential())
        .await
        .unwrap();

    assert!(session.cookie_jar().contains_name("_saml_idp"));
}

#[tokio::test]
async fn test_failing_step_reports_which_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wayf"))
        .respond_with(html(r#"<input type="hidden" name="RelayState" value="r">"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/aai/idp/Authn/UserPassword"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Shibboleth.sso/SAML2/POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let links = platform(&server);
    let session = HttpSession::new(&server.uri()).unwrap();
    let error = FormAuthenticator::new(&session, &links)
        .authenticate(&credential())
        .await
        .unwrap_err();

    assert_eq!(error.step(), AuthStep::Credentials);
    assert!(matches!(
        error,
        AuthError::StepFailed { status: StatusCode::UNAUTHORIZED, .. }
    ));
}

#[tokio::test]
async fn test_connect_reuses_valid_restored_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(SIGNED_IN_HOME))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let jar = SessionCookieJar::from_cookies([StoredCookie::new(
        "_saml_idp",
        "aWRw",
        "127.0.0.1",
        "/",
    )]);
    let session = HttpSession::builder(server.uri())
        .cookie_jar(Arc::new(jar))
        .build()
        .unwrap();
    let links = platform(&server);
    let authenticator = FormAuthenticator::new(&session, &links);

    for _ in 0..2 {
        let outcome = authenticator.connect(&credential(), None).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::AlreadyAuthenticated);
    }
}

#[tokio::test]
async fn test_connect_signs_in_when_restored_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(SIGNED_OUT_HOME))
        .mount(&server)
        .await;
    mount_login_flow(&server).await;

    let jar = SessionCookieJar::from_cookies([StoredCookie::new(
        "_saml_idp",
        "stale",
        "127.0.0.1",
        "/",
    )]);
    let session = HttpSession::builder(server.uri())
        .cookie_jar(Arc::new(jar))
        .build()
        .unwrap();
    let links = platform(&server);

    let outcome = FormAuthenticator::new(&session, &links)
        .connect(&credential(), None)
        .await
        .unwrap();
    assert_eq!(outcome, ConnectOutcome::Authenticated);
}

#[tokio::test]
async fn test_connect_persists_cookie_file_usable_by_next_session() {
    let server = MockServer::start().await;
    mount_login_flow(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(SIGNED_IN_HOME))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = CookieJarStore::for_organisation(dir.path(), "test-org");
    let links = platform(&server);

    let first = HttpSession::new(&server.uri()).unwrap();
    let outcome = FormAuthenticator::new(&first, &links)
        .connect(&credential(), Some(&store))
        .await
        .unwrap();
    assert_eq!(outcome, ConnectOutcome::Authenticated);
    assert!(store.path().exists());

    // The login mocks expect exactly one hit each, so a second full login
    // would fail verification.
    let restored = store.load_jar().unwrap();
    assert!(restored.contains_name("_saml_idp"));
    let second = HttpSession::builder(server.uri())
        .cookie_jar(Arc::new(restored))
        .build()
        .unwrap();
    let outcome = FormAuthenticator::new(&second, &links)
        .connect(&credential(), Some(&store))
        .await
        .unwrap();
    assert_eq!(outcome, ConnectOutcome::AlreadyAuthenticated);
}

#[tokio::test]
async fn test_has_valid_session_treats_error_status_as_signed_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let links = platform(&server);
    let session = HttpSession::new(&server.uri()).unwrap();
    assert!(!FormAuthenticator::new(&session, &links)
        .has_valid_session()
        .await
        .unwrap());
}

#[tokio::test]
async fn test_logout_reports_acknowledgement() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/logout.php"))
        .respond_with(html(SIGNED_OUT_HOME))
        .expect(1)
        .mount(&server)
        .await;

    let links = platform(&server);
    let session = HttpSession::new(&server.uri()).unwrap();
    assert!(FormAuthenticator::new(&session, &links).logout().await.unwrap());
}
