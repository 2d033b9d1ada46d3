use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{archive_pattern, spawn_worker, Emitter, Session, Source, SourceResult};
use crate::http_client::FetchError;

const NAME: &str = "commoncrawl";
const INDEX_LIST: &str = "https://index.commoncrawl.org/collinfo.json";
/// Crawls are listed newest first; older ones mostly repeat what the recent ones hold.
const MAX_INDEXES: usize = 6;

#[derive(Debug, Deserialize)]
struct CrawlIndex {
    id: String,
    #[serde(rename = "cdx-api")]
    cdx_api: String,
}

#[derive(Debug, Deserialize)]
struct PageCount {
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct Capture {
    url: String,
}

/// Common Crawl CDX indexes, the most recent crawls first.
pub struct CommonCrawlSource;

impl Source for CommonCrawlSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let indexes: Vec<CrawlIndex> = match session.get(INDEX_LIST, &[]).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
        Ok(indexes) => indexes,
        Err(e) => {
            emit.error(e).await;
            return;
        }
    };

    let pattern = archive_pattern(&session.scope);
    for index in indexes.into_iter().take(MAX_INDEXES) {
        let base = format!("{}?url={pattern}&output=json&fl=url", index.cdx_api);
        let pages = match page_count(&session, &base).await {
            Ok(n) => n,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };
        tracing::debug!(source = NAME, index = %index.id, pages, "crawl index");

        for page in 0..pages {
            let url = format!("{base}&page={page}");
            let resp = match session.get(&url, &[]).await {
                // No captures on this page.
                Ok(resp) if resp.status == StatusCode::NOT_FOUND => break,
                Ok(resp) => resp.error_for_status(),
                Err(e) => Err(e),
            };
            let resp = match resp {
                Ok(resp) => resp,
                Err(e) => {
                    emit.error(e).await;
                    return;
                }
            };

            // One JSON object per line.
            for line in resp.body.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let capture: Capture = match serde_json::from_str(line) {
                    Ok(c) => c,
                    Err(e) => {
                        let err = FetchError::Decode { url: url.clone(), message: e.to_string() };
                        if !emit.error(err).await {
                            return;
                        }
                        continue;
                    }
                };
                if let Some(found) = session.scope.examine(&capture.url) {
                    if !emit.url(found).await {
                        return;
                    }
                }
            }
        }
    }
}

/// Number of result pages for `base`. An index with no captures answers 404, counted as zero pages.
async fn page_count(session: &Session, base: &str) -> Result<u32, FetchError> {
    let url = format!("{base}&showNumPages=true");
    let resp = session.get(&url, &[]).await?;
    if resp.status == StatusCode::NOT_FOUND {
        return Ok(0);
    }
    let count: PageCount = resp.error_for_status()?.json()?;
    Ok(count.pages)
}
