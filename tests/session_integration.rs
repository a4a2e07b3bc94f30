//! Integration tests for the shared HTTP session.

use std::time::Duration;

use coursefetch_core::http::{HttpSession, PoolLimits, SessionError};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::{redirect_to, spawn_keep_alive_server};

#[tokio::test]
async fn test_get_follows_redirects_and_reports_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(redirect_to(&server, "/middle"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/middle"))
        .respond_with(redirect_to(&server, "/final"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    let session = HttpSession::new(&server.uri()).unwrap();
    let response = session
        .get(&format!("{}/start", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.final_url().path(), "/final");
    assert_eq!(response.content_type(), "text/plain");
    assert!(!response.is_html());
    assert_eq!(response.text().await.unwrap(), "done");
}

#[tokio::test]
async fn test_non_success_status_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let session = HttpSession::new(&server.uri()).unwrap();
    let response = session
        .get(&format!("{}/missing", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_cookies_set_by_server_are_sent_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Set-Cookie", "MoodleSession=abc123; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/my/"))
        .and(header("cookie", "MoodleSession=abc123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = HttpSession::new(&server.uri()).unwrap();
    session
        .get(&format!("{}/login", server.uri()))
        .await
        .unwrap()
        .drain()
        .await
        .unwrap();
    assert_eq!(session.cookie_jar().len(), 1);
    assert!(session.cookie_jar().contains_name("MoodleSession"));

    let response = session
        .get(&format!("{}/my/", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_post_form_sends_urlencoded_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/form"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("a=1&b=x+y"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = HttpSession::new(&server.uri()).unwrap();
    let fields = vec![
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "x y".to_string()),
    ];
    let response = session
        .post_form(&format!("{}/form", server.uri()), &fields)
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_connection_slot_released_after_body_is_consumed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;

    let session = HttpSession::builder(server.uri())
        .limits(PoolLimits {
            max_total: 1,
            max_per_route: 1,
            max_to_target: 1,
        })
        .build()
        .unwrap();
    let url = format!("{}/file", server.uri());

    for _ in 0..3 {
        let response = tokio::time::timeout(Duration::from_secs(5), session.get(&url))
            .await
            .expect("slot should be free again")
            .unwrap();
        assert_eq!(response.drain().await.unwrap(), 4096);
    }
}

#[tokio::test]
async fn test_connection_slot_held_while_body_is_alive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .mount(&server)
        .await;

    let session = HttpSession::builder(server.uri())
        .limits(PoolLimits {
            max_total: 1,
            max_per_route: 1,
            max_to_target: 1,
        })
        .build()
        .unwrap();
    let url = format!("{}/a", server.uri());

    let held = session.get(&url).await.unwrap().into_body();
    let blocked = tokio::time::timeout(Duration::from_millis(200), session.get(&url)).await;
    assert!(blocked.is_err(), "second request must wait for the slot");

    drop(held);
    let response = tokio::time::timeout(Duration::from_secs(5), session.get(&url))
        .await
        .expect("slot released on drop")
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_closed_session_fails_fast() {
    let server = MockServer::start().await;
    let session = HttpSession::new(&server.uri()).unwrap();
    session.close();
    let result = session.get(&format!("{}/any", server.uri())).await;
    assert!(matches!(result, Err(SessionError::Closed)));
}

#[tokio::test]
async fn test_discarded_error_body_keeps_connection_alive() {
    let (base, counts) = spawn_keep_alive_server(32 * 1024).await;
    let session = HttpSession::new(&base).unwrap();
    let url = format!("{base}/missing");

    for _ in 0..2 {
        let response = session.get(&url).await.unwrap();
        assert_eq!(response.status(), 404);
        response.discard().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(counts.opened(), 1);
    assert_eq!(counts.closed_by_client(), 0);
}
