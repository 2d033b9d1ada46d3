use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::mpsc;
use url::Url;

use super::{spawn_worker, Emitter, Session, Source, SourceResult};

const NAME: &str = "waybackrobots";

/// Paths listed in archived snapshots of the target's `robots.txt`.
pub struct WaybackRobotsSource;

impl Source for WaybackRobotsSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

fn snapshots_url(domain: &str) -> String {
    format!(
        "https://web.archive.org/cdx/search/cdx?url={}&output=json&fl=timestamp,original&filter=statuscode:200&collapse=digest",
        urlencoding::encode(&format!("{domain}/robots.txt"))
    )
}

/// Raw snapshot URL; `if_` asks for the archived bytes without the Wayback toolbar.
fn snapshot_url(timestamp: &str, original: &str) -> String {
    format!("https://web.archive.org/web/{timestamp}if_/{original}")
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let listing = snapshots_url(session.scope.domain());
    let rows: Vec<Vec<String>> = match session.get(&listing, &[]).await.and_then(|r| r.error_for_status()).and_then(|r| r.json()) {
        Ok(rows) => rows,
        Err(e) => {
            emit.error(e).await;
            return;
        }
    };
    tracing::debug!(source = NAME, snapshots = rows.len().saturating_sub(1), "robots.txt snapshots");

    // First row is the field header.
    for row in rows.into_iter().skip(1) {
        let [timestamp, original] = row.as_slice() else { continue };
        let Ok(base) = Url::parse(original) else { continue };

        let resp = match session.get(&snapshot_url(timestamp, original), &[]).await {
            Ok(resp) => resp,
            Err(e) => {
                if !emit.error(e).await {
                    return;
                }
                continue;
            }
        };
        if resp.status != StatusCode::OK {
            tracing::debug!(source = NAME, status = %resp.status, timestamp = %timestamp, "snapshot skipped");
            continue;
        }

        for path in robots_paths(&resp.body) {
            let Ok(joined) = base.join(path) else { continue };
            if let Some(found) = session.scope.examine(joined.as_str()) {
                if !emit.url(found).await {
                    return;
                }
            }
        }
    }
}

/// `Allow` / `Disallow` paths of a robots file. Wildcard rules are skipped and an end anchor `$` is dropped.
pub fn robots_paths(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or_default();
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if !key.eq_ignore_ascii_case("allow") && !key.eq_ignore_ascii_case("disallow") {
                return None;
            }
            let value = value.trim().trim_end_matches('$');
            if value.is_empty() || value.contains('*') {
                return None;
            }
            Some(value)
        })
        .collect()
}
