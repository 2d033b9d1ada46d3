use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{spawn_worker, Emitter, Session, Source, SourceResult};

const NAME: &str = "urlscan";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<ScanResult>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ScanResult {
    page: Option<PageInfo>,
    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    url: Option<String>,
}

/// urlscan.io search API. An API key is optional and only raises quotas.
pub struct UrlscanSource;

impl Source for UrlscanSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

/// Cursor for the next page: the last result's sort values, comma-joined.
fn search_after(results: &[ScanResult]) -> Option<String> {
    let sort = &results.last()?.sort;
    if sort.is_empty() {
        return None;
    }
    let parts: Vec<String> = sort
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Some(parts.join(","))
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let api_key = session.keys.get(NAME).first().cloned();
    let headers: Vec<(&str, &str)> = match api_key.as_deref() {
        Some(key) => vec![("API-Key", key)],
        None => Vec::new(),
    };
    let base = format!(
        "https://urlscan.io/api/v1/search/?q={}&size={PAGE_SIZE}",
        urlencoding::encode(&format!("domain:{}", session.scope.domain()))
    );

    let mut cursor: Option<String> = None;
    loop {
        let url = match &cursor {
            Some(after) => format!("{base}&search_after={}", urlencoding::encode(after)),
            None => base.clone(),
        };
        let page: SearchPage = match session.get(&url, &headers).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
            Ok(page) => page,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };
        tracing::debug!(source = NAME, results = page.results.len(), has_more = page.has_more, "search page");

        for result in &page.results {
            let Some(found) = result.page.as_ref().and_then(|p| p.url.as_deref()) else { continue };
            if let Some(url) = session.scope.examine(found) {
                if !emit.url(url).await {
                    return;
                }
            }
        }

        match search_after(&page.results) {
            Some(next) if page.has_more && cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }
}
