use std::sync::Arc;

use tokio::sync::mpsc;

use super::{archive_pattern, spawn_worker, Emitter, Session, Source, SourceResult};
use crate::http_client::FetchError;
use crate::scope::ScopeSpec;

const NAME: &str = "wayback";

/// Wayback Machine CDX API, walked page by page.
pub struct WaybackSource;

impl Source for WaybackSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

fn cdx_url(scope: &ScopeSpec) -> String {
    format!(
        "https://web.archive.org/cdx/search/cdx?url={}&output=json&fl=original&collapse=urlkey",
        archive_pattern(scope)
    )
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let base = cdx_url(&session.scope);

    let pages = match page_count(&session, &base).await {
        Ok(n) => n,
        Err(e) => {
            emit.error(e).await;
            return;
        }
    };
    tracing::debug!(source = NAME, pages, "cdx page count");

    for page in 0..pages {
        let url = format!("{base}&page={page}");
        let rows: Vec<Vec<String>> = match session.get(&url, &[]).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
            Ok(rows) => rows,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };

        // First row is the field header.
        for row in rows.into_iter().skip(1) {
            let Some(original) = row.into_iter().next() else { continue };
            if let Some(url) = session.scope.examine(&original) {
                if !emit.url(url).await {
                    return;
                }
            }
        }
    }
}

async fn page_count(session: &Session, base: &str) -> Result<u32, FetchError> {
    let url = format!("{base}&showNumPages=true");
    let resp = session.get(&url, &[]).await?.error_for_status()?;
    resp.body.trim().parse::<u32>().map_err(|e| FetchError::Decode { url, message: e.to_string() })
}
