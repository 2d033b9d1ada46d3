pub mod commoncrawl;
pub mod github;
pub mod intelx;
pub mod otx;
pub mod tokens;
pub mod urlscan;
pub mod wayback;
pub mod waybackrobots;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Keys;
use crate::http_client::{FetchError, HttpResponse, Transport};
use crate::scope::ScopeSpec;

pub use commoncrawl::CommonCrawlSource;
pub use github::GithubSource;
pub use intelx::IntelxSource;
pub use otx::OtxSource;
pub use urlscan::UrlscanSource;
pub use wayback::WaybackSource;
pub use waybackrobots::WaybackRobotsSource;

/// Every source this build knows about, in listing order.
pub const ALL: &[&str] = &["commoncrawl", "github", "intelx", "otx", "urlscan", "wayback", "waybackrobots"];

/// Sources that produce nothing without credentials.
pub const NEEDS_KEY: &[&str] = &["github", "intelx"];

/// Per-worker channel capacity.
pub const CHANNEL_CAPACITY: usize = 256;

/// One item produced by a source worker.
#[derive(Debug)]
pub enum SourceResult {
    Url { source: &'static str, value: String },
    Error { source: &'static str, error: anyhow::Error },
}

impl SourceResult {
    pub fn source(&self) -> &'static str {
        match self {
            SourceResult::Url { source, .. } | SourceResult::Error { source, .. } => source,
        }
    }
}

/// Everything a worker needs for one run: scope, credentials, transport and the run's cancellation token.
pub struct Session {
    pub scope: ScopeSpec,
    pub keys: Keys,
    pub transport: Arc<dyn Transport>,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(scope: ScopeSpec, keys: Keys, transport: Arc<dyn Transport>) -> Self {
        Self { scope, keys, transport, cancel: CancellationToken::new() }
    }

    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            res = self.transport.get(url, headers) => res,
        }
    }

    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            res = self.transport.post_json(url, body) => res,
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Sending half of a worker's stream, tagged with the source name.
pub struct Emitter {
    source: &'static str,
    tx: mpsc::Sender<SourceResult>,
}

impl Emitter {
    pub fn new(source: &'static str, tx: mpsc::Sender<SourceResult>) -> Self {
        Self { source, tx }
    }

    /// Returns `false` once the consumer has gone away.
    pub async fn url(&self, value: String) -> bool {
        self.tx.send(SourceResult::Url { source: self.source, value }).await.is_ok()
    }

    /// Cancellation is not an error; it is swallowed here.
    pub async fn error(&self, error: impl Into<anyhow::Error>) -> bool {
        let error = error.into();
        if error.downcast_ref::<FetchError>().is_some_and(FetchError::is_cancelled) {
            return true;
        }
        self.tx.send(SourceResult::Error { source: self.source, error }).await.is_ok()
    }
}

/// One upstream data source. `run` starts a worker task and hands back its stream;
/// the stream closes when the worker is done.
pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult>;
}

/// Spawn `worker` with a fresh channel. Shared by every `Source::run`.
pub(crate) fn spawn_worker<F, Fut>(name: &'static str, session: Arc<Session>, worker: F) -> mpsc::Receiver<SourceResult>
where
    F: FnOnce(Arc<Session>, Emitter) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let fut = worker(session, Emitter::new(name, tx));
    tokio::spawn(async move {
        tracing::debug!(source = name, "worker started");
        fut.await;
        tracing::debug!(source = name, "worker finished");
    });
    rx
}

/// Percent-encoded archive query pattern for the scope: `*.domain/*`, or `domain/*` without subdomains.
pub(crate) fn archive_pattern(scope: &ScopeSpec) -> String {
    let pattern = if scope.include_subdomains() {
        format!("*.{}/*", scope.domain())
    } else {
        format!("{}/*", scope.domain())
    };
    urlencoding::encode(&pattern).into_owned()
}

/// Resolve source names into workers. Unknown names are an error.
pub fn build(names: &[String]) -> anyhow::Result<Vec<Arc<dyn Source>>> {
    let mut out: Vec<Arc<dyn Source>> = Vec::new();
    for name in names {
        let source: Arc<dyn Source> = match name.trim().to_ascii_lowercase().as_str() {
            "commoncrawl" => Arc::new(CommonCrawlSource),
            "github" => Arc::new(GithubSource),
            "intelx" => Arc::new(IntelxSource),
            "otx" => Arc::new(OtxSource),
            "urlscan" => Arc::new(UrlscanSource),
            "wayback" => Arc::new(WaybackSource),
            "waybackrobots" => Arc::new(WaybackRobotsSource),
            other => bail!("unknown source {:?} (available: {})", other, ALL.join(", ")),
        };
        if !out.iter().any(|s| s.name() == source.name()) {
            out.push(source);
        }
    }
    Ok(out)
}
