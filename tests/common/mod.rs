#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use url_hunter::config::Keys;
use url_hunter::http_client::{FetchError, HttpResponse, Transport};
use url_hunter::{ScopeSpec, Session, SourceResult};

enum Reply {
    Ok(HttpResponse),
    Fail(String),
}

/// In-memory transport: canned replies per URL, replayed in order. The last reply repeats.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: &str, status: u16, body: &str, headers: &[(&str, &str)]) {
        self.push(url, Reply::Ok(response(url, status, body, headers)));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.push(url, Reply::Fail(message.to_string()));
    }

    fn push(&self, url: &str, reply: Reply) {
        self.routes.lock().entry(url.to_string()).or_default().push_back(reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn header_sent(&self, call: usize, name: &str) -> Option<String> {
        let calls = self.calls.lock();
        calls.get(call)?.1.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
    }

    fn answer(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
        self.calls.lock().push((
            url.to_string(),
            headers.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
        ));
        let mut routes = self.routes.lock();
        let Some(queue) = routes.get_mut(url) else {
            return Ok(response(url, 404, "", &[]));
        };
        let reply = if queue.len() > 1 { queue.pop_front() } else { None };
        let reply = match &reply {
            Some(r) => r,
            None => match queue.front() {
                Some(r) => r,
                None => return Ok(response(url, 404, "", &[])),
            },
        };
        match reply {
            Reply::Ok(resp) => Ok(resp.clone()),
            Reply::Fail(message) => Err(FetchError::Request { url: url.to_string(), message: message.clone() }),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
        self.answer(url, headers)
    }

    async fn post_json(&self, url: &str, _body: &serde_json::Value) -> Result<HttpResponse, FetchError> {
        self.answer(url, &[])
    }
}

pub fn response(url: &str, status: u16, body: &str, headers: &[(&str, &str)]) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    HttpResponse {
        url: url.to_string(),
        status: StatusCode::from_u16(status).unwrap(),
        headers: map,
        body: body.to_string(),
    }
}

pub fn session(transport: Arc<FakeTransport>, domain: &str, include_subdomains: bool, keys: Keys) -> Arc<Session> {
    Arc::new(Session::new(ScopeSpec::new(domain, include_subdomains), keys, transport))
}

/// Drain a stream into (urls, error messages).
pub async fn drain(mut rx: mpsc::Receiver<SourceResult>) -> (Vec<String>, Vec<String>) {
    let mut urls = Vec::new();
    let mut errors = Vec::new();
    while let Some(result) = rx.recv().await {
        match result {
            SourceResult::Url { value, .. } => urls.push(value),
            SourceResult::Error { error, .. } => errors.push(format!("{error:#}")),
        }
    }
    (urls, errors)
}
