//! Test fixtures: a one-shot HTTP server that plays back a canned
//! generate stream and captures the request it was sent.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve exactly one request with the given status line and NDJSON body.
/// Returns the host URL and a handle resolving to the captured request body.
pub async fn spawn_generate_server(
    status_line: &str,
    body: &str,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {}\r\ncontent-type: application/x-ndjson\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            if let Some(request_body) = parse_request_body(&raw) {
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                let _ = socket.shutdown().await;
                return request_body;
            }
            assert!(n > 0, "connection closed before request completed");
        }
    });

    (host, handle)
}

/// A host URL whose port was bound and immediately released, so
/// connections to it are refused.
pub async fn unreachable_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Once the headers and `content-length` bytes of body have arrived,
/// return the body.
fn parse_request_body(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let header_end = text.find("\r\n\r\n")?;
    let content_length: usize = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    let body = &text[header_end + 4..];
    (body.len() >= content_length).then(|| body[..content_length].to_string())
}
