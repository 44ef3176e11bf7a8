//! HTTP transport for the chunk transfer driver.
//!
//! [`HttpTransport`] sends each [`HttpRequest`] with `reqwest` and hands back
//! the status and headers. Redirects are not followed: a `308` from a
//! resumable session means "resume incomplete", not "moved".

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use resumable_protocol::{HttpRequest, HttpResponse};
use resumable_transfer::{Transport, TransportError};
use tracing::{debug, trace};

/// Errors building the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport. `connect_timeout` bounds connection setup; the
    /// driver applies its own per-request timeout on top.
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("resumable-upload/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    /// Wraps an existing client. The caller is responsible for disabling
    /// redirects on it.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("method {}: {e}", request.method)))?;
        let headers = header_map(&request)?;

        debug!(
            method = %method,
            url = %request.url,
            bytes = request.body.len(),
            "sending request"
        );
        let resp = self
            .http
            .request(method, &request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(map_error)?;

        let status = resp.status().as_u16();
        let mut response = HttpResponse::new(status);
        for (name, value) in resp.headers() {
            // Non-UTF-8 values cannot carry anything the protocol reads.
            if let Ok(value) = value.to_str() {
                response.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        trace!(status, headers = ?response.headers, "response received");
        // The body is never read; dropping the response releases the
        // connection.
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

/// Converts request headers. An explicit `Content-Length` is kept, so an
/// empty status query still announces a zero-length body.
fn header_map(request: &HttpRequest) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else if e.is_timeout() {
        TransportError::Network(format!("timed out: {e}"))
    } else {
        TransportError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumable_protocol::ByteRange;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// A request as seen by the mock server.
    #[derive(Debug)]
    struct Received {
        request_line: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    impl Received {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    /// Starts a mock HTTP server that answers one request with `response`
    /// (status line and headers, no body) and reports what it received.
    async fn mock_server(response: &str) -> (String, oneshot::Receiver<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/upload?upload_id=abc");
        let response = response.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let head_end = loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                let mut lines = head.split("\r\n");
                let request_line = lines.next().unwrap_or_default().to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|l| l.split_once(':'))
                    .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
                    .collect();
                let length: usize = headers
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap_or(0);

                let mut body = buf[head_end + 4..].to_vec();
                while body.len() < length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }

                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
                let _ = tx.send(Received {
                    request_line,
                    headers,
                    body,
                });
            }
        });

        (url, rx)
    }

    #[tokio::test]
    async fn chunk_put_carries_range_headers() {
        let (url, received) = mock_server(
            "HTTP/1.1 308 Resume Incomplete\r\nRange: bytes=0-3\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = HttpTransport::new(None).unwrap();
        let range = ByteRange::new(0, 4, 10).unwrap();
        let resp = transport
            .send(HttpRequest::put_chunk(&url, range, b"abcd".to_vec()))
            .await
            .unwrap();

        assert_eq!(resp.status, 308);
        assert_eq!(resp.header("range"), Some("bytes=0-3"));
        assert_eq!(resp.committed_through(), Some(3));

        let req = received.await.unwrap();
        assert_eq!(req.request_line, "PUT /upload?upload_id=abc HTTP/1.1");
        assert_eq!(req.header("content-range"), Some("bytes 0-3/10"));
        assert_eq!(req.header("content-length"), Some("4"));
        assert_eq!(req.body, b"abcd");
    }

    #[tokio::test]
    async fn status_query_sends_empty_body() {
        let (url, received) = mock_server(
            "HTTP/1.1 308 Resume Incomplete\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = HttpTransport::new(None).unwrap();
        let resp = transport
            .send(HttpRequest::status_query(&url, 10))
            .await
            .unwrap();
        assert_eq!(resp.status, 308);
        assert_eq!(resp.committed_through(), None);

        let req = received.await.unwrap();
        assert_eq!(req.header("content-range"), Some("bytes */10"));
        assert_eq!(req.header("content-length"), Some("0"));
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let (url, _received) = mock_server(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = HttpTransport::new(None).unwrap();
        let range = ByteRange::new(0, 2, 2).unwrap();
        let resp = transport
            .send(HttpRequest::put_chunk(&url, range, b"hi".to_vec()))
            .await
            .unwrap();
        assert_eq!(resp.status, 503);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(Some(Duration::from_secs(2))).unwrap();
        let range = ByteRange::new(0, 1, 1).unwrap();
        let err = transport
            .send(HttpRequest::put_chunk(
                &format!("http://127.0.0.1:{port}/upload"),
                range,
                b"x".to_vec(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unparseable_url_is_invalid_request() {
        let transport = HttpTransport::new(None).unwrap();
        let err = transport
            .send(HttpRequest::status_query("not a url", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)), "{err:?}");
        assert!(!err.is_retryable());
    }

    #[test]
    fn header_map_keeps_protocol_headers() {
        let range = ByteRange::new(0, 3, 3).unwrap();
        let request = HttpRequest::put_chunk("http://localhost/", range, b"abc".to_vec());
        let map = header_map(&request).unwrap();
        assert_eq!(map.get("content-length").unwrap(), "3");
        assert_eq!(map.get("content-range").unwrap(), "bytes 0-2/3");
    }
}
