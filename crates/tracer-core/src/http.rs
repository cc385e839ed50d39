//! HTTP identity lookup and upload endpoints.
//!
//! Enabled by the `http` feature.
//!
//! | Collaborator | Request |
//! |--------------|---------|
//! | [`HttpIdentityLookup`] | `GET {base}/beacons?uuid=..&major=..&minor=..` |
//! | [`HttpUploader`] | `POST {base}/observations` with a JSON array |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tracer_core::http::HttpIdentityLookup;
//! use tracer_core::IdentityLookup;
//! use tracer_types::BeaconIdentity;
//!
//! # async fn example() -> tracer_core::Result<()> {
//! let lookup = HttpIdentityLookup::new("https://tracer.example.org/api", Duration::from_secs(10))?;
//! let beacon = BeaconIdentity::new("f7826da6", 10, 3)?;
//! if let Some(anonymous_id) = lookup.lookup(&beacon).await? {
//!     println!("{beacon} is {anonymous_id}");
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use tracer_types::{BeaconIdentity, Observation};

use crate::error::{Error, Result};
use crate::traits::{IdentityLookup, Uploader};

/// Body of a lookup answer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    anonymous_id: Option<String>,
}

/// Trim a trailing `/` and check the scheme.
fn normalize_base_url(base_url: &str) -> Result<String> {
    let base_url = base_url.trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(Error::invalid_config(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }
    Ok(base_url)
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))
}

/// Extract the `error` field of a failed response, falling back to the
/// status line.
async fn error_message(response: Response) -> String {
    let status = response.status();
    response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| status.to_string())
}

/// Identity lookup over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityLookup {
    client: Client,
    base_url: String,
}

impl HttpIdentityLookup {
    /// Create a lookup client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::with_client(base_url, build_client(timeout)?)
    }

    /// Create a lookup client with a custom reqwest client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IdentityLookup for HttpIdentityLookup {
    async fn lookup(&self, beacon: &BeaconIdentity) -> Result<Option<String>> {
        let key = beacon.cache_key();
        let url = format!("{}/beacons", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("uuid", beacon.uuid().to_string()),
                ("major", beacon.major().to_string()),
                ("minor", beacon.minor().to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::lookup(&key, format!("{url} not reachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = error_message(response).await;
            return Err(Error::lookup(&key, format!("HTTP {status}: {message}")));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::lookup(&key, format!("undecodable response: {e}")))?;
        debug!("Lookup for {} answered {:?}", key, body.anonymous_id);

        Ok(body.anonymous_id.filter(|id| !id.is_empty()))
    }
}

/// Observation upload over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    base_url: String,
}

impl HttpUploader {
    /// Create an upload client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::with_client(base_url, build_client(timeout)?)
    }

    /// Create an upload client with a custom reqwest client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, batch: &[Observation]) -> Result<()> {
        let url = format!("{}/observations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::upload(batch.len(), format!("{url} not reachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = error_message(response).await;
            Err(Error::upload(
                batch.len(),
                format!("HTTP {}: {}", status.as_u16(), message),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[test]
    fn test_client_normalizes_url() {
        let lookup =
            HttpIdentityLookup::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(lookup.base_url(), "http://localhost:8080");

        let uploader = HttpUploader::new("https://collector.example.org/api//", Duration::from_secs(5))
            .unwrap();
        assert_eq!(uploader.base_url(), "https://collector.example.org/api");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = HttpIdentityLookup::new("localhost:8080", Duration::from_secs(5));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = HttpUploader::new("ftp://example.org", Duration::from_secs(5));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    /// Serve one HTTP response on a local port. The handle yields the raw
    /// request that was received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, handle)
    }

    /// Headers received and, if announced, the whole body.
    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn beacon() -> BeaconIdentity {
        BeaconIdentity::new("A", 1, 2).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_resolves_identifier() {
        let (base_url, server) = serve_once("200 OK", r#"{"anonymousId":"anon-1"}"#).await;
        let lookup = HttpIdentityLookup::new(&base_url, Duration::from_secs(5)).unwrap();

        let resolved = lookup.lookup(&beacon()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("anon-1"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /beacons?"));
        assert!(request.contains("uuid=A"));
        assert!(request.contains("major=1"));
        assert!(request.contains("minor=2"));
    }

    #[tokio::test]
    async fn test_lookup_empty_identifier_is_none() {
        let (base_url, server) = serve_once("200 OK", r#"{"anonymousId":""}"#).await;
        let lookup = HttpIdentityLookup::new(&base_url, Duration::from_secs(5)).unwrap();

        assert_eq!(lookup.lookup(&beacon()).await.unwrap(), None);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_missing_identifier_is_none() {
        let (base_url, server) = serve_once("200 OK", "{}").await;
        let lookup = HttpIdentityLookup::new(&base_url, Duration::from_secs(5)).unwrap();

        assert_eq!(lookup.lookup(&beacon()).await.unwrap(), None);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_server_error() {
        let (base_url, server) =
            serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let lookup = HttpIdentityLookup::new(&base_url, Duration::from_secs(5)).unwrap();

        let err = lookup.lookup(&beacon()).await.unwrap_err();
        match &err {
            Error::Lookup { key, reason } => {
                assert_eq!(key, "A.1.2");
                assert_eq!(reason, "HTTP 500: boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_undecodable_body() {
        let (base_url, server) = serve_once("200 OK", "not json").await;
        let lookup = HttpIdentityLookup::new(&base_url, Duration::from_secs(5)).unwrap();

        let err = lookup.lookup(&beacon()).await.unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_posts_batch() {
        let (base_url, server) = serve_once("204 No Content", "").await;
        let uploader = HttpUploader::new(&base_url, Duration::from_secs(5)).unwrap();
        let batch = vec![Observation::new("Pixel 7", time::OffsetDateTime::UNIX_EPOCH)];

        uploader.upload(&batch).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /observations "));
        assert!(request.contains(r#""label":"Pixel 7""#));
        assert!(request.contains(r#""observedAt":"1970-01-01T00:00:00Z""#));
    }

    #[tokio::test]
    async fn test_upload_server_error() {
        let (base_url, server) = serve_once("503 Service Unavailable", "{}").await;
        let uploader = HttpUploader::new(&base_url, Duration::from_secs(5)).unwrap();
        let batch = vec![
            Observation::new("a", time::OffsetDateTime::UNIX_EPOCH),
            Observation::new("b", time::OffsetDateTime::UNIX_EPOCH),
        ];

        let err = uploader.upload(&batch).await.unwrap_err();
        match &err {
            Error::Upload { count, reason } => {
                assert_eq!(*count, 2);
                assert!(reason.starts_with("HTTP 503"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let uploader = HttpUploader::new(&base_url, Duration::from_secs(5)).unwrap();
        let err = uploader.upload(&[]).await.unwrap_err();
        assert!(matches!(err, Error::Upload { count: 0, .. }));
    }

    #[test]
    fn test_lookup_response_decoding() {
        let body: LookupResponse = serde_json::from_str(r#"{"anonymousId":"anon-1"}"#).unwrap();
        assert_eq!(body.anonymous_id.as_deref(), Some("anon-1"));

        let body: LookupResponse = serde_json::from_str("{}").unwrap();
        assert!(body.anonymous_id.is_none());
    }
}
