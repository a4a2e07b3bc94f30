//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use coursefetch_core::config::PlatformLinks;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::{MockServer, ResponseTemplate};

/// 200 response with an HTML body.
pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}

/// 200 response with a PDF body.
pub fn pdf(bytes: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(bytes.to_vec(), "application/pdf")
}

/// Redirect to a path on the given server.
pub fn redirect_to(server: &MockServer, target: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", format!("{}{target}", server.uri()))
}

/// Course page whose main region holds the given anchors.
pub fn course_page(hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{href}">link</a>"#))
        .collect();
    format!(
        r#"<html><body>
        <nav><a href="/mod/resource/view.php?id=999">sidebar</a></nav>
        <div id="region-main">{links}</div>
        </body></html>"#
    )
}

/// Embed page wrapping `target` in an object viewer.
pub fn object_embed(target: &str) -> String {
    format!(r#"<html><body><object id="resourceobject" data="{target}"></object></body></html>"#)
}

/// Platform descriptor whose every URL points at the mock server.
pub fn platform(server: &MockServer) -> PlatformLinks {
    let base = server.uri();
    PlatformLinks::new(base.clone(), format!("{base}/aai"), "test-org")
        .with_organisation_form_url(format!("{base}/wayf"))
}

/// Connections seen by a [`spawn_keep_alive_server`].
#[derive(Debug, Default)]
pub struct ConnectionCounts {
    pub opened: AtomicUsize,
    pub closed_by_client: AtomicUsize,
}

impl ConnectionCounts {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_by_client(&self) -> usize {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

/// Keep-alive HTTP/1.1 server answering every request with a 404 whose
/// body is `body_len` bytes long. Counts connections opened and closed by
/// the client.
pub async fn spawn_keep_alive_server(body_len: usize) -> (String, Arc<ConnectionCounts>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let counts = Arc::new(ConnectionCounts::default());
    let response = format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nContent-Length: {body_len}\r\n\r\n{}",
        "x".repeat(body_len)
    );

    let server_counts = Arc::clone(&counts);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            server_counts.opened.fetch_add(1, Ordering::SeqCst);
            let counts = Arc::clone(&server_counts);
            let response = response.clone();
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buffer = [0u8; 1024];
                loop {
                    while let Some(end) = head_end(&pending) {
                        pending.drain(..end);
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            counts.closed_by_client.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    }
                    match socket.read(&mut buffer).await {
                        Ok(0) | Err(_) => {
                            counts.closed_by_client.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                        Ok(n) => pending.extend_from_slice(&buffer[..n]),
                    }
                }
            });
        }
    });
    (format!("http://{address}"), counts)
}

fn head_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|start| start + 4)
}
