mod common;

use common::{drain, session, FakeTransport};
use serde_json::json;
use url_hunter::config::Keys;
use url_hunter::sources::{
    CommonCrawlSource, IntelxSource, OtxSource, Source, UrlscanSource, WaybackRobotsSource, WaybackSource,
};

const CDX: &str = "https://web.archive.org/cdx/search/cdx?url=%2A.example.com%2F%2A&output=json&fl=original&collapse=urlkey";

#[tokio::test]
async fn wayback_walks_every_cdx_page() {
    let transport = FakeTransport::new();
    transport.reply(&format!("{CDX}&showNumPages=true"), 200, "2\n", &[]);
    transport.reply(
        &format!("{CDX}&page=0"),
        200,
        &json!([["original"], ["http://example.com/a"], ["https://api.example.com/b?x=1"], ["http://evil.org/"]]).to_string(),
        &[],
    );
    transport.reply(&format!("{CDX}&page=1"), 200, &json!([["original"], ["example.com/c"]]).to_string(), &[]);

    let (urls, errors) = drain(WaybackSource.run(session(transport, "example.com", true, Keys::default()))).await;
    assert!(errors.is_empty());
    assert_eq!(urls, vec!["http://example.com/a", "https://api.example.com/b?x=1", "http://example.com/c"]);
}

#[tokio::test]
async fn wayback_page_failure_stops_enumeration() {
    let transport = FakeTransport::new();
    transport.reply(&format!("{CDX}&showNumPages=true"), 200, "3", &[]);
    transport.reply(&format!("{CDX}&page=0"), 200, &json!([["original"], ["http://example.com/a"]]).to_string(), &[]);
    transport.fail(&format!("{CDX}&page=1"), "timed out");

    let (urls, errors) = drain(WaybackSource.run(session(transport.clone(), "example.com", true, Keys::default()))).await;
    assert_eq!(urls, vec!["http://example.com/a"]);
    assert_eq!(errors.len(), 1);
    assert!(!transport.calls().iter().any(|c| c.ends_with("page=2")));
}

#[tokio::test]
async fn otx_follows_has_next() {
    let base = "https://otx.alienvault.com/api/v1/indicators/domain/example.com/url_list?limit=200";
    let transport = FakeTransport::new();
    transport.reply(
        &format!("{base}&page=1"),
        200,
        &json!({"has_next": true, "url_list": [{"url": "http://example.com/one"}]}).to_string(),
        &[],
    );
    transport.reply(
        &format!("{base}&page=2"),
        200,
        &json!({"has_next": false, "url_list": [{"url": "http://example.com/two"}, {"url": "http://sub.example.com/x"}]}).to_string(),
        &[],
    );

    let (urls, errors) = drain(OtxSource.run(session(transport.clone(), "example.com", false, Keys::default()))).await;
    assert!(errors.is_empty());
    assert_eq!(urls, vec!["http://example.com/one", "http://example.com/two"]);
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn urlscan_pages_with_search_after() {
    let base = "https://urlscan.io/api/v1/search/?q=domain%3Aexample.com&size=100";
    let transport = FakeTransport::new();
    transport.reply(
        base,
        200,
        &json!({
            "results": [{"page": {"url": "https://example.com/p1"}, "sort": [1690000000001u64, "def"]}],
            "has_more": true
        })
        .to_string(),
        &[],
    );
    transport.reply(
        &format!("{base}&search_after=1690000000001%2Cdef"),
        200,
        &json!({"results": [{"page": {"url": "https://example.com/p2"}, "sort": [1, "a"]}], "has_more": false}).to_string(),
        &[],
    );

    let keys = Keys::from([("urlscan", vec!["secret"])]);
    let (urls, errors) = drain(UrlscanSource.run(session(transport.clone(), "example.com", false, keys))).await;
    assert!(errors.is_empty());
    assert_eq!(urls, vec!["https://example.com/p1", "https://example.com/p2"]);
    assert_eq!(transport.header_sent(0, "API-Key").as_deref(), Some("secret"));
}

#[tokio::test(start_paused = true)]
async fn intelx_submits_then_polls_until_done() {
    let transport = FakeTransport::new();
    transport.reply("https://2.intelx.io/phonebook/search?k=k1", 200, r#"{"id":"abc","status":0}"#, &[]);
    let results = "https://2.intelx.io/phonebook/search/result?k=k1&id=abc&limit=10000";
    transport.reply(results, 200, r#"{"selectors":[],"status":3}"#, &[]);
    transport.reply(
        results,
        200,
        &json!({"selectors": [{"selectorvalue": "https://example.com/leak"}], "status": 0}).to_string(),
        &[],
    );
    transport.reply(
        results,
        200,
        &json!({"selectors": [{"selectorvalue": "example.com/other"}, {"selectorvalue": "user@example.org"}], "status": 1}).to_string(),
        &[],
    );

    let keys = Keys::from([("intelx", vec!["2.intelx.io:k1"])]);
    let (urls, errors) = drain(IntelxSource.run(session(transport.clone(), "example.com", false, keys))).await;
    assert!(errors.is_empty());
    assert_eq!(urls, vec!["https://example.com/leak", "http://example.com/other"]);
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test]
async fn intelx_without_credentials_is_silent() {
    let transport = FakeTransport::new();
    let (urls, errors) = drain(IntelxSource.run(session(transport.clone(), "example.com", false, Keys::default()))).await;
    assert!(urls.is_empty() && errors.is_empty());
    assert!(transport.calls().is_empty());
}

const CC_INDEXES: &str = "https://index.commoncrawl.org/collinfo.json";
const CC_NEW: &str = "https://index.commoncrawl.org/CC-MAIN-2024-10-index?url=example.com%2F%2A&output=json&fl=url";
const CC_OLD: &str = "https://index.commoncrawl.org/CC-MAIN-2023-50-index?url=example.com%2F%2A&output=json&fl=url";

fn crawl_indexes() -> String {
    json!([
        {"id": "CC-MAIN-2024-10", "cdx-api": "https://index.commoncrawl.org/CC-MAIN-2024-10-index"},
        {"id": "CC-MAIN-2023-50", "cdx-api": "https://index.commoncrawl.org/CC-MAIN-2023-50-index"}
    ])
    .to_string()
}

#[tokio::test]
async fn commoncrawl_reads_each_index_page_by_page() {
    let transport = FakeTransport::new();
    transport.reply(CC_INDEXES, 200, &crawl_indexes(), &[]);
    transport.reply(&format!("{CC_NEW}&showNumPages=true"), 200, r#"{"pages": 2, "pageSize": 5, "blocks": 7}"#, &[]);
    transport.reply(
        &format!("{CC_NEW}&page=0"),
        200,
        "{\"url\": \"https://example.com/a\"}\n{\"url\": \"https://sub.example.com/b\"}\n",
        &[],
    );
    transport.reply(&format!("{CC_NEW}&page=1"), 200, "{\"url\": \"https://example.com/c?id=1\"}\n", &[]);
    // The older index has no captures at all.
    transport.reply(&format!("{CC_OLD}&showNumPages=true"), 404, "", &[]);

    let (urls, errors) = drain(CommonCrawlSource.run(session(transport.clone(), "example.com", false, Keys::default()))).await;
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(urls, vec!["https://example.com/a", "https://example.com/c?id=1"]);
    assert!(!transport.calls().iter().any(|c| c.starts_with(CC_OLD) && c.contains("&page=")));
}

#[tokio::test]
async fn commoncrawl_bad_line_is_reported_and_skipped() {
    let transport = FakeTransport::new();
    transport.reply(CC_INDEXES, 200, &crawl_indexes(), &[]);
    transport.reply(&format!("{CC_NEW}&showNumPages=true"), 200, r#"{"pages": 1}"#, &[]);
    transport.reply(&format!("{CC_NEW}&page=0"), 200, "garbage\n{\"url\": \"https://example.com/ok\"}\n", &[]);
    transport.reply(&format!("{CC_OLD}&showNumPages=true"), 200, r#"{"pages": 0}"#, &[]);

    let (urls, errors) = drain(CommonCrawlSource.run(session(transport, "example.com", false, Keys::default()))).await;
    assert_eq!(urls, vec!["https://example.com/ok"]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("malformed response"));
}

#[tokio::test]
async fn commoncrawl_index_list_failure_ends_the_source() {
    let transport = FakeTransport::new();
    transport.reply(CC_INDEXES, 503, "", &[]);

    let (urls, errors) = drain(CommonCrawlSource.run(session(transport.clone(), "example.com", false, Keys::default()))).await;
    assert!(urls.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(transport.calls(), vec![CC_INDEXES]);
}

const ROBOTS: &str = "https://web.archive.org/cdx/search/cdx?url=example.com%2Frobots.txt&output=json&fl=timestamp,original&filter=statuscode:200&collapse=digest";

#[tokio::test]
async fn waybackrobots_joins_rule_paths_to_the_snapshot_host() {
    let transport = FakeTransport::new();
    transport.reply(
        ROBOTS,
        200,
        &json!([
            ["timestamp", "original"],
            ["20190101000000", "http://example.com/robots.txt"],
            ["20200101000000", "https://example.com/robots.txt"],
            ["20210101000000", "https://example.com/robots.txt"]
        ])
        .to_string(),
        &[],
    );
    transport.reply(
        "https://web.archive.org/web/20190101000000if_/http://example.com/robots.txt",
        200,
        "User-agent: *\nDisallow: /admin/\nDisallow: /*.cgi\n",
        &[],
    );
    transport.fail("https://web.archive.org/web/20200101000000if_/https://example.com/robots.txt", "connection reset");
    transport.reply(
        "https://web.archive.org/web/20210101000000if_/https://example.com/robots.txt",
        200,
        "Allow: /api/v2$\nDisallow: //evil.org/x\n",
        &[],
    );

    let (urls, errors) = drain(WaybackRobotsSource.run(session(transport, "example.com", true, Keys::default()))).await;
    assert_eq!(urls, vec!["http://example.com/admin/", "https://example.com/api/v2"]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("connection reset"));
}

#[tokio::test]
async fn waybackrobots_skips_missing_snapshots() {
    let transport = FakeTransport::new();
    transport.reply(
        ROBOTS,
        200,
        &json!([["timestamp", "original"], ["20190101000000", "http://example.com/robots.txt"]]).to_string(),
        &[],
    );
    // Unrouted snapshot URLs answer 404.

    let (urls, errors) = drain(WaybackRobotsSource.run(session(transport.clone(), "example.com", false, Keys::default()))).await;
    assert!(urls.is_empty());
    assert!(errors.is_empty());
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn otx_malformed_envelope_is_one_error() {
    let url = "https://otx.alienvault.com/api/v1/indicators/domain/example.com/url_list?limit=200&page=1";
    let transport = FakeTransport::new();
    transport.reply(url, 200, r#"{"has_next": true, "url_list": 5}"#, &[]);

    let (urls, errors) = drain(OtxSource.run(session(transport.clone(), "example.com", false, Keys::default()))).await;
    assert!(urls.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("malformed response"));
    assert_eq!(transport.calls().len(), 1);
}
