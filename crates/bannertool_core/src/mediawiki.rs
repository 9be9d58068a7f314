use std::collections::BTreeMap;
use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BannerConfig;
use crate::content::PageContentSource;
use crate::model::{Page, QueryResult};
use crate::profile::{GameProfile, derive_wiki_url};

/// Upper bound on requests, continuations included, for one category query.
pub const MAX_CONTINUES: usize = 100;

pub trait WikiQueryApi {
    /// Every member of `category`, with category memberships when
    /// `include_categories` is set.
    fn query_category_pages(
        &mut self,
        category: &str,
        include_categories: bool,
    ) -> Result<QueryResult>;
    fn request_count(&self) -> usize;
}

/// Downloads a wiki file scaled to a square of `size` pixels.
pub trait IconSource {
    fn fetch_file(&mut self, file_name: &str, size: u32) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &BannerConfig, profile: &GameProfile) -> Self {
        Self::from_env_with_defaults(&profile.settings().api_url, &config.user_agent())
    }

    fn from_env_with_defaults(api_url: &str, user_agent: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            user_agent: user_agent.to_string(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn config(&self) -> &MediaWikiClientConfig {
        &self.config
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid MediaWiki API URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        let response = self.send_with_retry(&base_url, &pairs, "MediaWiki API request")?;
        let payload: Value = response
            .json()
            .context("failed to decode MediaWiki API JSON response")?;
        if let Some(error) = payload.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info");
            bail!("MediaWiki API error [{code}]: {info}");
        }
        if let Some(warnings) = payload.get("warnings") {
            warn!("MediaWiki API warnings: {warnings}");
        }
        Ok(payload)
    }

    fn request_bytes(&mut self, url: Url) -> Result<Vec<u8>> {
        let label = format!("file download from {url}");
        let response = self.send_with_retry(&url, &[], &label)?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read file body from {url}"))?;
        Ok(bytes.to_vec())
    }

    /// GET with rate limiting, retrying timeouts and retryable statuses with
    /// backoff. Only successful responses are returned.
    fn send_with_retry(
        &mut self,
        url: &Url,
        query: &[(String, String)],
        label: &str,
    ) -> Result<Response> {
        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            debug!(attempt, %url, ?query, "GET");
            let mut request = self
                .client
                .get(url.clone())
                .header("User-Agent", self.config.user_agent.clone());
            if !query.is_empty() {
                request = request.query(query);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < self.config.max_retries && is_retryable_status(status) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    bail!("{label} failed with HTTP {status}");
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("{label} failed"));
                }
            }
        }

        bail!("{label} exhausted retry budget")
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_read_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl WikiQueryApi for MediaWikiClient {
    fn query_category_pages(
        &mut self,
        category: &str,
        include_categories: bool,
    ) -> Result<QueryResult> {
        collect_category_pages(category, include_categories, |params| {
            self.request_json_get(params)
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl PageContentSource for MediaWikiClient {
    fn fetch_page_content(&mut self, page_id: i64) -> Result<String> {
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content".to_string()),
            ("rvslots", "main".to_string()),
            ("pageids", page_id.to_string()),
        ];
        let response = self.request_json_get(&params)?;
        parse_revision_content(response, page_id)
    }
}

impl IconSource for MediaWikiClient {
    fn fetch_file(&mut self, file_name: &str, size: u32) -> Result<Vec<u8>> {
        let url = file_redirect_url(&self.config.api_url, file_name, size)?;
        self.request_bytes(url)
    }
}

/// Runs a `generator=categorymembers` query, following `continue` until the
/// wiki stops returning one or `MAX_CONTINUES` is reached.
pub fn collect_category_pages<F>(
    category: &str,
    include_categories: bool,
    mut request: F,
) -> Result<QueryResult>
where
    F: FnMut(&[(&str, String)]) -> Result<Value>,
{
    let mut result = QueryResult::new();
    let mut continuation: Option<BTreeMap<String, String>> = None;

    loop {
        let response = {
            let mut params = vec![
                ("action", "query".to_string()),
                ("generator", "categorymembers".to_string()),
                ("gcmtitle", category.to_string()),
                ("gcmlimit", "max".to_string()),
            ];
            if include_categories {
                params.push(("prop", "categories".to_string()));
                params.push(("cllimit", "max".to_string()));
            }
            if let Some(cursor) = &continuation {
                for (key, value) in cursor {
                    params.push((key.as_str(), value.clone()));
                }
            }
            request(&params).with_context(|| format!("failed to query members of {category}"))?
        };

        let (pages, next) = parse_query_response(response)
            .with_context(|| format!("failed to decode members of {category}"))?;
        result.total_fetches += 1;
        for page in pages {
            result.merge_page(page);
        }

        continuation = next;
        if continuation.is_none() {
            break;
        }
        if result.total_fetches >= MAX_CONTINUES {
            warn!("Stopped following continuation for {category} after {MAX_CONTINUES} requests");
            break;
        }
    }

    result.continuation = continuation;
    debug!(
        category,
        pages = result.len(),
        fetches = result.total_fetches,
        "category query complete"
    );
    Ok(result)
}

/// Pages and the `continue` cursor of one `formatversion=2` query response.
pub fn parse_query_response(
    response: Value,
) -> Result<(Vec<Page>, Option<BTreeMap<String, String>>)> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("unexpected query response shape")?;

    let pages = parsed
        .query
        .pages
        .into_iter()
        .filter(|page| !page.missing.unwrap_or(false))
        .filter_map(|page| {
            let id = page.pageid?;
            Some(match page.categories {
                Some(categories) => Page::with_categories(
                    id,
                    page.title,
                    categories.into_iter().map(|category| category.title),
                ),
                None => Page::new(id, page.title),
            })
        })
        .collect();

    let continuation = parsed.continuation.map(|cursor| {
        cursor
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(text) => (key, text),
                other => (key, other.to_string()),
            })
            .collect()
    });

    Ok((pages, continuation))
}

fn parse_revision_content(response: Value, page_id: i64) -> Result<String> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page content API response")?;
    parsed
        .query
        .pages
        .into_iter()
        .find(|page| page.pageid == Some(page_id))
        .and_then(|page| page.revisions.into_iter().next())
        .and_then(|revision| revision.slots)
        .and_then(|slots| slots.main)
        .map(|slot| slot.content)
        .ok_or_else(|| anyhow::anyhow!("page {page_id} has no revision content"))
}

/// `<wiki>/index.php?title=Special:Redirect/file/<file>&width=<n>&height=<n>`
pub fn file_redirect_url(api_url: &str, file_name: &str, size: u32) -> Result<Url> {
    let base = derive_wiki_url(api_url);
    let mut url = Url::parse(&format!("{base}/index.php"))
        .with_context(|| format!("invalid wiki URL derived from {api_url}"))?;
    url.query_pairs_mut()
        .append_pair("title", &format!("Special:Redirect/file/{file_name}"))
        .append_pair("width", &size.to_string())
        .append_pair("height", &size.to_string());
    Ok(url)
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    title: String,
    missing: Option<bool>,
    categories: Option<Vec<CategoryQueryItem>>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct CategoryQueryItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use serde_json::json;

    use super::*;

    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    fn ok(content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Answers one connection per canned response and returns the request lines.
    fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let mut request_lines = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut line = String::new();
                reader.read_line(&mut line).expect("request line");
                request_lines.push(line.trim_end().to_string());
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).expect("header") == 0 || header == "\r\n" {
                        break;
                    }
                }
                stream.write_all(response.as_bytes()).expect("write");
            }
            request_lines
        });
        (format!("http://{addr}/api.php"), handle)
    }

    fn local_client(api_url: String, max_retries: usize) -> MediaWikiClient {
        MediaWikiClient::new(MediaWikiClientConfig {
            api_url,
            user_agent: "bannertool-test".to_string(),
            timeout_ms: 5_000,
            rate_limit_read_ms: 0,
            max_retries,
            retry_delay_ms: 0,
        })
        .expect("client")
    }

    #[test]
    fn file_download_retries_unavailable_then_returns_body() {
        let (api_url, server) = serve(vec![UNAVAILABLE.to_string(), ok("image/png", "png")]);
        let mut client = local_client(api_url, 2);

        let bytes = client.fetch_file("Venti Icon.png", 80).expect("download");
        assert_eq!(bytes, b"png".to_vec());
        assert_eq!(client.request_count(), 2);

        let lines = server.join().expect("server");
        assert!(lines.iter().all(|line| line.starts_with("GET /index.php?title=Special")));
    }

    #[test]
    fn api_query_retries_unavailable_then_decodes_json() {
        let body = r#"{"query":{"pages":[{"pageid":1,"title":"Venti"}]}}"#;
        let (api_url, server) = serve(vec![UNAVAILABLE.to_string(), ok("application/json", body)]);
        let mut client = local_client(api_url, 2);

        let result = client
            .query_category_pages("Category:5-Star_Characters", false)
            .expect("query");
        assert_eq!(result.len(), 1);
        assert_eq!(client.request_count(), 2);

        let lines = server.join().expect("server");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("formatversion=2"));
    }

    #[test]
    fn non_retryable_status_fails_without_retry() {
        let (api_url, server) = serve(vec![NOT_FOUND.to_string()]);
        let mut client = local_client(api_url, 2);

        let error = client.fetch_file("Missing.png", 80).expect_err("must fail");
        assert!(error.to_string().contains("failed with HTTP 404"));
        assert_eq!(client.request_count(), 1);
        assert_eq!(server.join().expect("server").len(), 1);
    }

    #[test]
    fn query_response_keeps_missing_and_present_category_lists_apart() {
        let (pages, continuation) = parse_query_response(json!({
            "batchcomplete": true,
            "query": {
                "pages": [
                    {
                        "pageid": 11,
                        "ns": 0,
                        "title": "Ballad in Goblets/2020-09-28",
                        "categories": [
                            {"ns": 14, "title": "Category:Features Venti"},
                            {"ns": 14, "title": "Category:Released in Version 1.0"}
                        ]
                    },
                    {"pageid": 12, "ns": 0, "title": "Venti"},
                    {"ns": 0, "title": "Ghost", "missing": true}
                ]
            }
        }))
        .expect("parse");

        assert!(continuation.is_none());
        assert_eq!(pages.len(), 2);
        assert_eq!(
            pages[0].categories.as_deref(),
            Some(
                &[
                    "Category:Features Venti".to_string(),
                    "Category:Released in Version 1.0".to_string()
                ][..]
            )
        );
        assert!(pages[1].categories.is_none());
    }

    #[test]
    fn collect_follows_continuation_and_merges_categories() {
        let mut responses = VecDeque::from([
            json!({
                "continue": {"clcontinue": "11|Features_Venti", "continue": "||"},
                "query": {"pages": [
                    {"pageid": 11, "title": "Ballad in Goblets/2020-09-28",
                     "categories": [{"title": "Category:Released in Version 1.0"}]},
                    {"pageid": 13, "title": "Sparkling Steps/2020-10-20"}
                ]}
            }),
            json!({
                "query": {"pages": [
                    {"pageid": 11, "title": "Ballad in Goblets/2020-09-28",
                     "categories": [{"title": "Category:Features Venti"}]},
                    {"pageid": 13, "title": "Sparkling Steps/2020-10-20",
                     "categories": [{"title": "Category:Features Klee"}]}
                ]}
            }),
        ]);
        let mut seen: Vec<Vec<(String, String)>> = Vec::new();

        let result = collect_category_pages("Category:Event_Wishes", true, |params| {
            seen.push(
                params
                    .iter()
                    .map(|(key, value)| ((*key).to_string(), value.clone()))
                    .collect(),
            );
            responses
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("unexpected request"))
        })
        .expect("collect");

        assert_eq!(result.total_fetches, 2);
        assert!(result.continuation.is_none());
        let ballad: Vec<&str> = result.get(11).expect("page").category_titles().collect();
        assert_eq!(
            ballad,
            vec!["Category:Released in Version 1.0", "Category:Features Venti"]
        );
        assert_eq!(
            result.get(13).and_then(|page| page.categories.clone()),
            Some(vec!["Category:Features Klee".to_string()])
        );

        assert!(seen[0].contains(&("prop".to_string(), "categories".to_string())));
        assert!(seen[0].contains(&("gcmtitle".to_string(), "Category:Event_Wishes".to_string())));
        assert!(seen[1].contains(&("clcontinue".to_string(), "11|Features_Venti".to_string())));
    }

    #[test]
    fn collect_without_categories_omits_prop() {
        let result = collect_category_pages("Category:5-Star_Characters", false, |params| {
            assert!(!params.iter().any(|(key, _)| *key == "prop"));
            Ok(json!({"query": {"pages": [{"pageid": 1, "title": "Venti"}]}}))
        })
        .expect("collect");
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn collect_stops_after_continuation_budget() {
        let mut calls = 0;
        let result = collect_category_pages("Category:Loop", false, |_| {
            calls += 1;
            Ok(json!({
                "continue": {"gcmcontinue": format!("page|{calls}")},
                "query": {"pages": []}
            }))
        })
        .expect("collect");

        assert_eq!(calls, MAX_CONTINUES);
        assert_eq!(result.total_fetches, MAX_CONTINUES);
        assert!(result.continuation.is_some());
    }

    #[test]
    fn collect_propagates_request_errors() {
        let error = collect_category_pages("Category:Event_Warps", true, |_| {
            bail!("MediaWiki API error [badcontinue]: Invalid continue param")
        })
        .expect_err("must fail");
        assert!(format!("{error:#}").contains("badcontinue"));
    }

    #[test]
    fn revision_content_reads_main_slot() {
        let content = parse_revision_content(
            json!({"query": {"pages": [{
                "pageid": 42,
                "title": "Wish/2023-06-21",
                "revisions": [{"slots": {"main": {"contentmodel": "wikitext",
                    "content": "{{Change History|3.7}}"}}}]
            }]}}),
            42,
        )
        .expect("content");
        assert_eq!(content, "{{Change History|3.7}}");

        let error = parse_revision_content(json!({"query": {"pages": []}}), 42)
            .expect_err("must fail");
        assert!(error.to_string().contains("page 42"));
    }

    #[test]
    fn file_redirect_url_targets_special_redirect() {
        let url = file_redirect_url(
            "https://genshin-impact.fandom.com/api.php",
            "Weapon Aquila Favonia.png",
            80,
        )
        .expect("url");
        assert_eq!(url.path(), "/index.php");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "title".to_string(),
                    "Special:Redirect/file/Weapon Aquila Favonia.png".to_string()
                ),
                ("width".to_string(), "80".to_string()),
                ("height".to_string(), "80".to_string()),
            ]
        );
    }
}
