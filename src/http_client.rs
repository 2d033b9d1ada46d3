use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// A fully buffered response. Non-success statuses are returned as-is so callers
/// can inspect rate-limit headers.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Turn a non-success status into `FetchError::Status`.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status { url: self.url, status: self.status })
        }
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_str(&self.body).map_err(|e| FetchError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// The request/response seam every source worker talks through.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, FetchError>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, FetchError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self { client: create_client(timeout_secs)? })
    }

    async fn finish(url: &str, resp: reqwest::Response) -> Result<HttpResponse, FetchError> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(HttpResponse { url: url.to_string(), status, headers, body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            map.insert(name, value);
        }

        let resp = self
            .client
            .get(url)
            .headers(map)
            .send()
            .await
            .map_err(|e| FetchError::Request { url: url.to_string(), message: e.to_string() })?;
        Self::finish(url, resp).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, FetchError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FetchError::Request { url: url.to_string(), message: e.to_string() })?;
        Self::finish(url, resp).await
    }
}

/// HTTP client with connection pooling and compression, tuned for many small API calls.
pub fn create_client(timeout_secs: u64) -> anyhow::Result<Client> {
    let client = ClientBuilder::new()
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)

        // Timeouts
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))

        // Compression
        .gzip(true)
        .brotli(true)

        .use_rustls_tls()
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(concat!("url_hunter/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
