use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::{spawn_worker, Emitter, Session, Source, SourceResult};

const NAME: &str = "intelx";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result status values that mean "keep polling".
const STATUS_PENDING: i64 = 0;
const STATUS_NO_RESULTS_YET: i64 = 3;

#[derive(Debug, Deserialize)]
struct SearchSubmitted {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    selectors: Vec<Selector>,
    status: i64,
}

#[derive(Debug, Deserialize)]
struct Selector {
    #[serde(rename = "selectorvalue")]
    value: String,
}

/// Intelligence X phonebook search: submit once, then poll by id until finished.
pub struct IntelxSource;

impl Source for IntelxSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

/// Split a `host:key` credential.
fn parse_credential(raw: &str) -> Option<(&str, &str)> {
    let (host, key) = raw.split_once(':')?;
    let (host, key) = (host.trim(), key.trim());
    (!host.is_empty() && !key.is_empty()).then_some((host, key))
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let Some((host, key)) = session.keys.get(NAME).iter().find_map(|k| parse_credential(k)) else {
        tracing::debug!(source = NAME, "no host:key credential configured, skipping");
        return;
    };
    let key = urlencoding::encode(key);

    let submit_url = format!("https://{host}/phonebook/search?k={key}");
    let body = json!({
        "term": session.scope.domain(),
        "maxresults": 100000,
        "media": 0,
        "timeout": 20,
    });
    let submitted: SearchSubmitted = match session.post_json(&submit_url, &body).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
        Ok(s) => s,
        Err(e) => {
            emit.error(e).await;
            return;
        }
    };
    tracing::debug!(source = NAME, id = %submitted.id, "search submitted");

    let results_url = format!(
        "https://{host}/phonebook/search/result?k={key}&id={}&limit=10000",
        urlencoding::encode(&submitted.id)
    );
    let mut polls = 0usize;
    loop {
        if polls > 0 && !session.pause(POLL_INTERVAL).await {
            return;
        }
        polls += 1;

        let results: SearchResults = match session.get(&results_url, &[]).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
            Ok(r) => r,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };

        for selector in results.selectors {
            if let Some(url) = session.scope.examine(&selector.value) {
                if !emit.url(url).await {
                    return;
                }
            }
        }

        if results.status != STATUS_PENDING && results.status != STATUS_NO_RESULTS_YET {
            tracing::debug!(source = NAME, polls, status = results.status, "search finished");
            return;
        }
    }
}
