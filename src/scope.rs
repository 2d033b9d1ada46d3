//! Domain scope rules and the helpers that turn raw matched strings into absolute URLs.

use regex::Regex;
use std::borrow::Cow;
use url::Url;

const DEFAULT_SCHEME: &str = "http";

/// Target domain plus whether subdomains count as in scope. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSpec {
    domain: String,
    include_subdomains: bool,
}

impl ScopeSpec {
    pub fn new(domain: &str, include_subdomains: bool) -> Self {
        let domain = domain
            .trim()
            .trim_start_matches("*.")
            .trim_end_matches('.')
            .to_ascii_lowercase();
        Self { domain, include_subdomains }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn include_subdomains(&self) -> bool {
        self.include_subdomains
    }

    pub fn host_in_scope(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host == self.domain {
            return true;
        }
        self.include_subdomains
            && host.len() > self.domain.len()
            && host.ends_with(&self.domain)
            && host.as_bytes()[host.len() - self.domain.len() - 1] == b'.'
    }

    /// Normalize `raw` into an absolute http(s) URL and keep it only when its host is in scope.
    pub fn examine(&self, raw: &str) -> Option<String> {
        let url = fix_url(raw)?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?;
        if !self.host_in_scope(host) {
            return None;
        }
        Some(url.to_string())
    }
}

/// Percent-decode a content line and drop literal `\t` / `\n` escape sequences.
pub fn normalize_content(content: &str) -> String {
    let decoded = urlencoding::decode(content).unwrap_or(Cow::Borrowed(content));
    decoded.replace("\\t", "").replace("\\n", "")
}

/// Resolve a matched string to an absolute URL, adding the default scheme where none is present.
/// Fragments are dropped.
pub fn fix_url(raw: &str) -> Option<Url> {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!'));
    if trimmed.is_empty() {
        return None;
    }

    let absolute: Cow<str> = if trimmed.contains("://") {
        Cow::Borrowed(trimmed)
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Cow::Owned(format!("{DEFAULT_SCHEME}://{rest}"))
    } else {
        Cow::Owned(format!("{DEFAULT_SCHEME}://{trimmed}"))
    };

    let mut url = Url::parse(&absolute).ok()?;
    url.host_str()?;
    url.set_fragment(None);
    Some(url)
}

/// Finds URL-like substrings whose host is the target domain (or a subdomain of it, when allowed).
#[derive(Debug, Clone)]
pub struct DomainExtractor {
    re: Regex,
}

impl DomainExtractor {
    pub fn new(scope: &ScopeSpec) -> Self {
        let subdomains = if scope.include_subdomains() { r"(?:[a-z0-9_-]+\.)*" } else { "" };
        let pattern = format!(
            r#"(?i)(?:https?://|//)?{subdomains}{domain}(?::\d{{1,5}})?(?:[/?#][^\s"'<>`\\(){{}}\[\]|^]*)?"#,
            domain = regex::escape(scope.domain()),
        );
        // The domain is escaped, so the pattern is always valid.
        let re = Regex::new(&pattern).expect("domain pattern compiles");
        Self { re }
    }

    /// Matches that start or end inside a longer host are rejected, and scanning resumes one
    /// character later so URLs nested inside a rejected span are still found.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let bytes = text.as_bytes();
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(m) = self.re.find_at(text, pos) {
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            let before_ok = match before {
                None => true,
                // `//host` right after `scheme:` belongs to a scheme we don't accept.
                Some(b':') => !m.as_str().starts_with("//"),
                // A host right after `//` is the authority of a URL already rejected above.
                Some(b'/') => !text[..m.start()].ends_with("//"),
                Some(b) => !is_host_byte(b) && b != b'@',
            };
            let after_ok = match bytes.get(m.end()) {
                None => true,
                Some(b'.') => !bytes.get(m.end() + 1).is_some_and(|b| b.is_ascii_alphanumeric()),
                Some(&b) => !is_host_byte(b),
            };

            if before_ok && after_ok {
                out.push(m.as_str());
                pos = m.end();
            } else {
                pos = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
            }
            if pos >= text.len() {
                break;
            }
        }
        out
    }
}

fn is_host_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')
}
