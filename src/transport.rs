//! The HTTP seam. Every network round trip the client makes is one
//! [`Transport::send`] call, which keeps the protocol logic testable
//! without a live service.

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::{Error, Result, format_service_error};
use crate::util::excerpt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One request, described independently of the HTTP library.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sends requests and returns the body text of successful (2xx) replies.
///
/// Implementations map connection failures to [`Error::Network`] and
/// non-2xx replies to [`Error::Http`]. They must not retry.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<String>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<String> {
        (**self).send(request)
    }
}

/// [`Transport`] over a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(timeout: Duration, verify: bool) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("fetchclimate-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("fetchclimate-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|e| Error::Config {
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<String> {
        let mut req = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        for (name, value) in &request.headers {
            req = req.header(*name, *value);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let started = Instant::now();
        let resp = req.send().map_err(|source| Error::Network {
            url: request.url.clone(),
            source,
        })?;

        let status = resp.status();
        let text = resp.text().map_err(|source| Error::Network {
            url: request.url.clone(),
            source,
        })?;
        tracing::debug!(
            method = ?request.method,
            url = %request.url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            reply = %excerpt(&text, 120),
            "service round trip"
        );

        if !status.is_success() {
            return Err(format_service_error(status, &request.url, &text));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread::{self, JoinHandle};

    /// Accepts one connection, answers it with `reply` and hands back the
    /// request head it read.
    fn serve_once(reply: &'static str) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream.write_all(reply.as_bytes()).unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (addr, handle)
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5), true).unwrap()
    }

    #[test]
    fn non_success_reply_is_http_error() {
        let (addr, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
        );
        let err = transport()
            .send(&HttpRequest::get(format!("http://{}/api/status", addr)).query("hash", "H"))
            .unwrap_err();
        match err {
            Error::Http { status, body, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(server.join().unwrap().starts_with("GET /api/status?hash=H "));
    }

    #[test]
    fn success_reply_returns_body_text() {
        let (addr, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 16\r\nConnection: close\r\n\r\ncompleted=msds:r",
        );
        let text = transport()
            .send(
                &HttpRequest::get(format!("http://{}/api/status", addr))
                    .header("accept", "text/plain"),
            )
            .unwrap();
        assert_eq!(text, "completed=msds:r");
        let head = server.join().unwrap().to_ascii_lowercase();
        assert!(head.contains("user-agent: fetchclimate-rs/"));
        assert!(head.contains("accept: text/plain"));
    }

    #[test]
    fn refused_connection_is_network_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let err = transport()
            .send(&HttpRequest::get(format!("http://{}/api/configuration", addr)))
            .unwrap_err();
        assert!(matches!(err, Error::Network { .. }), "{err:?}");
    }

    #[test]
    fn builder_collects_query_and_headers() {
        let req = HttpRequest::get("http://h/api/status")
            .query("hash", "abc")
            .header("accept", "text/plain");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.query_value("hash"), Some("abc"));
        assert_eq!(req.query_value("missing"), None);
        assert_eq!(req.headers, vec![("accept", "text/plain")]);
        assert!(req.body.is_none());
    }
}
