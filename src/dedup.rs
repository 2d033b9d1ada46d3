//! Query-aware deduplication of the merged result stream.
//!
//! URLs without a query are unique by their full string. URLs with a query are keyed
//! by `scheme://host/path`; a later URL on the same path is emitted again only when it
//! brings a parameter name not yet seen for that path.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

use crate::sources::{SourceResult, CHANNEL_CAPACITY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRecord {
    pub source: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub source: String,
    pub error: String,
}

/// Seen-set state. Owned by a single consumer.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: AHashSet<String>,
    params: AHashMap<String, AHashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical URL when `value` should be emitted. Unparsable input yields `None`.
    pub fn check(&mut self, value: &str) -> Option<String> {
        if self.seen.contains(value) {
            return None;
        }
        let parsed = Url::parse(value).ok()?;
        let canonical = parsed.to_string();
        if self.seen.contains(&canonical) {
            return None;
        }

        let names: AHashSet<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
        if !names.is_empty() {
            let key = path_key(&parsed)?;
            match self.params.get_mut(&key) {
                Some(known) => {
                    let before = known.len();
                    known.extend(names);
                    if known.len() == before {
                        return None;
                    }
                }
                None => {
                    self.params.insert(key, names);
                }
            }
        }

        self.seen.insert(canonical.clone());
        Some(canonical)
    }

    /// Parameter names recorded so far for `scheme://host/path`.
    pub fn params_for(&self, path_key: &str) -> Option<&AHashSet<String>> {
        self.params.get(path_key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// `scheme://host[:port]/path` of a URL.
pub fn path_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    })
}

/// Output side of the pipeline: unique URLs plus a separate diagnostics stream.
pub struct Pipeline {
    pub urls: mpsc::Receiver<UrlRecord>,
    pub errors: mpsc::UnboundedReceiver<ErrorRecord>,
    pub handle: tokio::task::JoinHandle<usize>,
}

/// Consume `results` and emit only unseen URLs. Error results go to `errors` and the log.
/// The returned handle resolves to the number of unique URLs emitted.
pub fn dedupe(mut results: mpsc::Receiver<SourceResult>) -> Pipeline {
    let (url_tx, urls) = mpsc::channel(CHANNEL_CAPACITY);
    let (err_tx, errors) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut dedup = Deduplicator::new();
        let mut emitted = 0usize;
        while let Some(result) = results.recv().await {
            match result {
                SourceResult::Url { source, value } => {
                    let Some(url) = dedup.check(&value) else { continue };
                    if url_tx.send(UrlRecord { source: source.to_string(), url }).await.is_err() {
                        break;
                    }
                    emitted += 1;
                }
                SourceResult::Error { source, error } => {
                    tracing::warn!(source, error = %format!("{error:#}"), "source error");
                    // Nobody listening for diagnostics is fine.
                    let _ = err_tx.send(ErrorRecord { source: source.to_string(), error: format!("{error:#}") });
                }
            }
        }
        emitted
    });

    Pipeline { urls, errors, handle }
}
