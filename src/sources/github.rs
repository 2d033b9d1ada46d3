//! GitHub code search. Finds files mentioning the domain, then scans each file's raw
//! content and the search API's text-match fragments for in-scope URLs.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;

use super::tokens::TokenPool;
use super::{spawn_worker, Emitter, Session, Source, SourceResult};
use crate::http_client::{FetchError, HttpResponse};
use crate::scope::{normalize_content, DomainExtractor};

const NAME: &str = "github";
const ACCEPT: &str = "application/vnd.github.v3.text-match+json";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    html_url: String,
    #[serde(default)]
    text_matches: Vec<TextMatch>,
}

#[derive(Debug, Deserialize)]
struct TextMatch {
    #[serde(default)]
    fragment: String,
}

pub struct GithubSource;

impl Source for GithubSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, session: Arc<Session>) -> tokio::sync::mpsc::Receiver<SourceResult> {
        spawn_worker(NAME, session, |session, emit| async move { enumerate(session, emit).await })
    }
}

pub fn search_url(domain: &str) -> String {
    format!(
        "https://api.github.com/search/code?per_page=100&q={}&sort=created&order=asc",
        urlencoding::encode(&format!("\"{}\"", domain))
    )
}

async fn enumerate(session: Arc<Session>, emit: Emitter) {
    let Some(tokens) = TokenPool::new(session.keys.get(NAME).iter().cloned()) else {
        tracing::debug!(source = NAME, "no tokens configured, skipping");
        return;
    };
    let extractor = DomainExtractor::new(&session.scope);

    let mut next = Some(search_url(session.scope.domain()));
    let mut page_no = 0usize;
    while let Some(page_url) = next.take() {
        page_no += 1;
        let resp = match search_page(&session, &tokens, &page_url).await {
            Ok(resp) => resp,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };
        let page: SearchResponse = match resp.json() {
            Ok(page) => page,
            Err(e) => {
                emit.error(e).await;
                return;
            }
        };
        tracing::debug!(source = NAME, page = page_no, items = page.items.len(), "search page");

        for item in &page.items {
            if !process_item(&session, &extractor, item, &emit).await {
                return;
            }
        }

        next = next_link(resp.header("link"));
    }
}

/// Fetch one search page, rotating tokens on rate-limit rejections until a non-rate-limit answer arrives.
async fn search_page(session: &Session, tokens: &TokenPool, url: &str) -> Result<HttpResponse, FetchError> {
    loop {
        let token = tokio::select! {
            _ = session.cancel.cancelled() => return Err(FetchError::Cancelled),
            token = tokens.acquire() => token,
        };
        if let Some(deadline) = token.retry_after {
            let wait = deadline.saturating_duration_since(Instant::now());
            if !wait.is_zero() && !session.pause(wait).await {
                return Err(FetchError::Cancelled);
            }
        }

        let auth = format!("token {}", token.hash);
        let resp = session.get(url, &[("Accept", ACCEPT), ("Authorization", &auth)]).await?;

        if is_rate_limited(&resp) {
            let wait = retry_after(&resp);
            tracing::debug!(source = NAME, wait_secs = wait.as_secs(), "token rate limited, rotating");
            tokens.mark_exceeded(&token, wait);
            continue;
        }

        return resp.error_for_status();
    }
}

fn is_rate_limited(resp: &HttpResponse) -> bool {
    if resp.status != StatusCode::FORBIDDEN {
        return false;
    }
    let remaining = resp.header("x-ratelimit-remaining").and_then(|v| v.trim().parse::<i64>().ok());
    remaining == Some(0) || (remaining.is_none() && resp.header("retry-after").is_some())
}

fn retry_after(resp: &HttpResponse) -> Duration {
    if let Some(secs) = resp.header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Duration::from_secs(secs);
    }
    let reset = resp.header("x-ratelimit-reset").and_then(|v| v.trim().parse::<u64>().ok());
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    match reset {
        Some(reset) if reset > now => Duration::from_secs(reset - now),
        _ => DEFAULT_RETRY_AFTER,
    }
}

/// Returns `false` when the worker should stop (cancelled or consumer gone).
async fn process_item(session: &Session, extractor: &DomainExtractor, item: &Item, emit: &Emitter) -> bool {
    let raw_url = raw_content_url(&item.html_url);
    match session.get(&raw_url, &[]).await {
        Ok(resp) if resp.status == StatusCode::OK => {
            for line in resp.body.lines().filter(|l| !l.is_empty()) {
                if !emit_matches(session, extractor, line, emit).await {
                    return false;
                }
            }
        }
        Ok(resp) => {
            tracing::debug!(source = NAME, url = %raw_url, status = %resp.status, "raw content unavailable");
        }
        Err(FetchError::Cancelled) => return false,
        Err(e) => {
            let err = anyhow::Error::new(e).context("raw content fetch failed");
            if !emit.error(err).await {
                return false;
            }
        }
    }

    for text_match in &item.text_matches {
        if !emit_matches(session, extractor, &text_match.fragment, emit).await {
            return false;
        }
    }
    true
}

async fn emit_matches(session: &Session, extractor: &DomainExtractor, text: &str, emit: &Emitter) -> bool {
    let text = normalize_content(text);
    for found in extractor.find_all(&text) {
        if let Some(url) = session.scope.examine(found) {
            if !emit.url(url).await {
                return false;
            }
        }
    }
    true
}

/// `https://github.com/o/r/blob/ref/path` -> `https://raw.githubusercontent.com/o/r/ref/path`
pub fn raw_content_url(html_url: &str) -> String {
    let url = match html_url.strip_prefix("https://github.com/") {
        Some(rest) => format!("https://raw.githubusercontent.com/{rest}"),
        None => html_url.to_string(),
    };
    url.replacen("/blob/", "/", 1)
}

/// Target of the `rel="next"` entry of a `Link` header, if any.
pub fn next_link(header: Option<&str>) -> Option<String> {
    header?.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|v| v.trim_matches('"').split_whitespace().any(|r| r.eq_ignore_ascii_case("next")))
                .unwrap_or(false)
        });
        is_next.then(|| target.to_string())
    })
}
