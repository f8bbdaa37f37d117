// HTTP transport
//
// Executes built `Request`s. The `Transport` trait is the seam the core
// crate is generic over; `HttpTransport` is the reqwest implementation.
// TLS policy is limited to the per-request "ignore SSL errors" flag, which
// selects between a strict and a permissive client built up front.

use std::future::Future;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt as _;
pub use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio::sync::watch;
use tracing::debug;

use crate::error::Error;
use crate::request::Request;

/// Status and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Response {
    /// 2xx, including 207 Multi-Status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Executes requests and returns raw responses.
///
/// Non-2xx statuses are returned as responses, not errors; only
/// transport-level failures are `Err`.
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request) -> impl Future<Output = Result<Response, Error>> + Send;

    /// Like [`execute`](Self::execute), publishing cumulative bytes moved
    /// (sent for uploads, received otherwise) on `progress`.
    fn execute_with_progress(
        &self,
        request: Request,
        progress: watch::Sender<u64>,
    ) -> impl Future<Output = Result<Response, Error>> + Send {
        drop(progress);
        self.execute(request)
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout for unsupervised calls (OCS, listings).
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Upload body chunk size; one progress tick per chunk.
    pub upload_chunk_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("nextlink/", env!("CARGO_PKG_VERSION")).to_owned(),
            upload_chunk_size: 64 * 1024,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self, accept_invalid_certs: bool) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    strict: reqwest::Client,
    permissive: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            strict: config.build_client(false)?,
            permissive: config.build_client(true)?,
            config,
        })
    }

    fn client_for(&self, request: &Request) -> &reqwest::Client {
        if request.ignore_ssl_errors {
            &self.permissive
        } else {
            &self.strict
        }
    }

    fn chunked_body(&self, body: Bytes, progress: watch::Sender<u64>) -> reqwest::Body {
        let chunk_size = self.config.upload_chunk_size.max(1);
        let chunks: Vec<Bytes> = (0..body.len())
            .step_by(chunk_size)
            .map(|start| body.slice(start..(start + chunk_size).min(body.len())))
            .collect();

        let mut sent: u64 = 0;
        let stream = futures_util::stream::iter(chunks).map(move |chunk| {
            sent = sent.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
            let _ = progress.send(sent);
            Ok::<_, std::io::Error>(chunk)
        });
        reqwest::Body::wrap_stream(stream)
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        debug!(method = %request.method, url = %request.redacted_url(), "sending request");
        let client = self.client_for(&request);
        let body = reqwest::Body::from(request.body.clone());
        let mut outgoing = into_reqwest(request, body);
        *outgoing.timeout_mut() = Some(self.config.timeout);

        let resp = client.execute(outgoing).await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!(%status, bytes = body.len(), "response received");
        Ok(Response { status, body })
    }

    async fn execute_with_progress(
        &self,
        request: Request,
        progress: watch::Sender<u64>,
    ) -> Result<Response, Error> {
        debug!(method = %request.method, url = %request.redacted_url(), "starting transfer");
        let client = self.client_for(&request);
        let is_upload = !request.body.is_empty();

        let outgoing = if is_upload {
            let body = self.chunked_body(request.body.clone(), progress.clone());
            into_reqwest(request, body)
        } else {
            into_reqwest(request, reqwest::Body::from(Bytes::new()))
        };

        let resp = client.execute(outgoing).await?;
        let status = resp.status();

        let mut received = BytesMut::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk?);
            if !is_upload {
                let _ = progress.send(u64::try_from(received.len()).unwrap_or(u64::MAX));
            }
        }
        debug!(%status, bytes = received.len(), "transfer finished");
        Ok(Response {
            status,
            body: received.freeze(),
        })
    }
}

/// Convert to a `reqwest::Request`, moving URL user-info into a Basic header.
fn into_reqwest(request: Request, body: reqwest::Body) -> reqwest::Request {
    let Request {
        method,
        mut url,
        mut headers,
        ..
    } = request;

    if !url.username().is_empty() {
        if !headers.contains_key(AUTHORIZATION) {
            let userinfo = format!("{}:{}", url.username(), url.password().unwrap_or_default());
            let decoded = percent_encoding::percent_decode_str(&userinfo).decode_utf8_lossy();
            if let Ok(mut value) =
                HeaderValue::try_from(format!("Basic {}", STANDARD.encode(decoded.as_bytes())))
            {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }
        let _ = url.set_username("");
        let _ = url.set_password(None);
    }

    let mut outgoing = reqwest::Request::new(method, url);
    *outgoing.headers_mut() = headers;
    *outgoing.body_mut() = Some(body);
    outgoing
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::RequestBuilder;

    #[test]
    fn userinfo_is_lifted_into_header() {
        let request = RequestBuilder::basic("https://cloud.example.com", "alice", "secret")
            .unwrap()
            .download("/remote.php/dav/files/alice/a.txt")
            .unwrap();
        assert_eq!(request.url.username(), "alice");

        let outgoing = into_reqwest(request, reqwest::Body::from(Bytes::new()));
        assert_eq!(outgoing.url().username(), "");
        assert_eq!(outgoing.url().password(), None);
        assert_eq!(
            outgoing.headers().get(AUTHORIZATION).unwrap(),
            "Basic YWxpY2U6c2VjcmV0"
        );
    }

    #[test]
    fn existing_authorization_is_kept() {
        let request = RequestBuilder::bearer("https://cloud.example.com", "tok")
            .unwrap()
            .capabilities()
            .unwrap();
        let outgoing = into_reqwest(request, reqwest::Body::from(Bytes::new()));
        assert_eq!(outgoing.headers().get(AUTHORIZATION).unwrap(), "Bearer tok");
    }
}
