use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;

use super::{spawn_worker, Emitter, Session, Source, SourceResult};

const NAME: &str = "otx";
const PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
struct UrlListPage {
    #[serde(default)]
    has_next: bool,
    #[serde(default)]
    url_list: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    url: String,
}

/// AlienVault OTX passive URL list.
pub struct OtxSource;

impl Source for OtxSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let domain = session.scope.domain().to_string();
    for page in 1u32.. {
        let url = format!(
            "https://otx.alienvault.com/api/v1/indicators/domain/{domain}/url_list?limit={PAGE_SIZE}&page={page}"
        );
        let body: UrlListPage = match session.get(&url, &[]).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
            Ok(body) => body,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };
        tracing::debug!(source = NAME, page, urls = body.url_list.len(), "url list page");

        for entry in body.url_list {
            if let Some(url) = session.scope.examine(&entry.url) {
                if !emit.url(url).await {
                    return;
                }
            }
        }

        if !body.has_next {
            break;
        }
    }
}
