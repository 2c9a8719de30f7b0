//! Page fetching
//!
//! The store never talks to the network directly: it hands URLs to a
//! [`Fetcher`] and gets back a [`FetchResult`]. [`HttpFetcher`] is the
//! default implementation, a blocking HTTP client that scrapes the title,
//! description and keywords from the returned HTML.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LOCATION};
use reqwest::{redirect, Proxy, Url};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::storage::{StoreError, StoreResult};
use crate::tags;

/// Status codes treated as permanent redirects
pub const PERMANENT_REDIRECTS: [u16; 2] = [301, 308];

/// Default pattern for status tags; `{}` becomes the status code
pub const DEFAULT_STATUS_PATTERN: &str = "http:{}";

/// URLs with these suffixes only get a HEAD request
const SKIP_MIMES: [&str; 2] = [".pdf", ".txt"];

/// Schemes and prefixes that are never fetched
const NONGENERIC_PREFIXES: [&str; 6] = [
    "about:",
    "apt:",
    "chrome://",
    "file://",
    "place:",
    "vivaldi://",
];

// ==================== Results ====================

/// Outcome of fetching one URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// URL after following leading permanent redirects
    pub url: String,
    pub title: String,
    pub description: String,
    /// Comma-separated keywords from the page
    pub keywords: String,
    /// Only a HEAD request was made
    pub mime_only: bool,
    /// URL was rejected without any network access
    pub bad_url: bool,
    /// HTTP status; `None` when no response arrived at all
    pub status: Option<u16>,
}

impl FetchResult {
    /// Result for a URL rejected before fetching
    pub fn bad(url: &str) -> Self {
        Self {
            url: url.to_string(),
            bad_url: true,
            ..Default::default()
        }
    }

    /// Result for a fetch that got no response
    pub fn network_failure(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Result standing in for a fetch that was skipped on purpose
    pub fn offline(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: Some(200),
            ..Default::default()
        }
    }

    /// Tag for a permanent redirect status, if any
    pub fn redirect_tag(&self, pattern: &str) -> Option<String> {
        self.status
            .filter(|s| PERMANENT_REDIRECTS.contains(s))
            .map(|s| pattern.replace("{}", &s.to_string()))
    }

    /// Tag for an error status (400 and above), if any
    pub fn error_tag(&self, pattern: &str) -> Option<String> {
        self.status
            .filter(|s| *s >= 400)
            .map(|s| pattern.replace("{}", &s.to_string()))
    }

    /// Canonical tag string from keywords and status tags
    pub fn status_tags(&self, keywords: bool, redirect: &StatusTag, error: &StatusTag) -> String {
        let mut tokens: Vec<String> = Vec::new();
        if keywords {
            tokens.push(self.keywords.clone());
        }
        if let Some(tag) = redirect.pattern().and_then(|p| self.redirect_tag(p)) {
            tokens.push(tag);
        }
        if let Some(tag) = error.pattern().and_then(|p| self.error_tag(p)) {
            tokens.push(tag);
        }
        tags::canonicalize(tokens)
    }
}

/// Whether and how to tag records by fetch status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StatusTag {
    #[default]
    Off,
    /// Use [`DEFAULT_STATUS_PATTERN`]
    Default,
    /// Custom pattern; `{}` becomes the status code
    Pattern(String),
}

impl StatusTag {
    pub fn is_on(&self) -> bool {
        !matches!(self, StatusTag::Off)
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            StatusTag::Off => None,
            StatusTag::Default => Some(DEFAULT_STATUS_PATTERN),
            StatusTag::Pattern(p) => Some(p),
        }
    }
}

/// Source of page metadata
///
/// Implementations are shared across refresh workers, so they must be
/// `Sync`.
pub trait Fetcher: Sync {
    /// Fetch `url`; with `head_only` no page body is requested
    fn fetch(&self, url: &str, head_only: bool) -> FetchResult;
}

// ==================== URL checks ====================

/// Check whether a URL is malformed
///
/// The host must contain a `.` and must not start or end with one.
pub fn is_bad_url(url: &str) -> bool {
    match normalize_url(url).as_ref().and_then(Url::host_str) {
        Some(host) => host.starts_with('.') || host.ends_with('.') || !host.contains('.'),
        None => true,
    }
}

/// Parse a URL with a host, assuming `http://` when no scheme is given
pub fn normalize_url(url: &str) -> Option<Url> {
    let with_host = |u: Url| u.host_str().is_some().then_some(u);
    Url::parse(url)
        .ok()
        .and_then(with_host)
        .or_else(|| Url::parse(&format!("http://{}", url)).ok().and_then(with_host))
}

/// URLs that are not web pages (browser internals, local files)
pub fn is_nongeneric_url(url: &str) -> bool {
    NONGENERIC_PREFIXES.iter().any(|p| url.starts_with(p))
}

/// URLs pointing at documents whose body is not worth downloading
pub fn is_ignored_mime(url: &str) -> bool {
    let lower = url.to_lowercase();
    SKIP_MIMES.iter().any(|m| lower.ends_with(m))
}

// ==================== HTTP fetcher ====================

/// Blocking HTTP fetcher
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    /// Build a client from explicit configuration
    pub fn new(config: &FetchConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert("dnt", HeaderValue::from_static("1"));

        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .redirect(redirect::Policy::none());

        // proxy settings come from the config only, never the environment
        builder = match &config.proxy {
            Some(proxy) => {
                debug!(proxy = %proxy, "Using proxy");
                let proxy = Proxy::all(proxy).map_err(|e| StoreError::Client(e.to_string()))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
        })
    }

    fn fetch_page(&self, url: &str, head_only: bool) -> StoreResult<FetchResult> {
        let mut target = url.to_string();

        loop {
            let (response, hops) = self.follow(&target, head_only)?;
            let status = response.status().as_u16();

            if status == 403 && target.ends_with('/') {
                // Some servers refuse the bare "/" resource
                debug!(url = %target, "Received status 403, retrying without trailing slash");
                target.pop();
                continue;
            }

            if head_only {
                return Ok(FetchResult {
                    url: url.to_string(),
                    mime_only: true,
                    status: Some(status),
                    ..Default::default()
                });
            }

            let mut final_url = url.to_string();
            let mut final_status = status;
            if status == 200 {
                for (hop_status, location) in hops {
                    if !PERMANENT_REDIRECTS.contains(&hop_status) {
                        break;
                    }
                    final_status = hop_status;
                    final_url = location;
                }
            } else {
                warn!(url = %target, status, "HTTP error");
            }

            let body = response.text().unwrap_or_default();
            let page = parse_page(&body);

            return Ok(FetchResult {
                url: final_url,
                title: page.title,
                description: page.description,
                keywords: page.keywords,
                status: Some(final_status),
                ..Default::default()
            });
        }
    }

    /// Send the request, following redirects by hand so every hop is seen
    fn follow(&self, url: &str, head_only: bool) -> StoreResult<(Response, Vec<(u16, String)>)> {
        let mut target =
            normalize_url(url).ok_or_else(|| StoreError::MalformedUrl(url.to_string()))?;
        let mut hops = Vec::new();

        loop {
            let request = if head_only {
                self.client.head(target.clone())
            } else {
                self.client.get(target.clone())
            };
            let response = request.send().map_err(|e| StoreError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let location = match location {
                Some(location) if status.is_redirection() => location,
                _ => return Ok((response, hops)),
            };

            if hops.len() >= self.max_redirects {
                return Err(StoreError::Network {
                    url: url.to_string(),
                    reason: format!("more than {} redirects", self.max_redirects),
                });
            }

            let next = target
                .join(&location)
                .map_err(|_| StoreError::MalformedUrl(location.clone()))?;
            debug!(status = status.as_u16(), from = %target, to = %next, "Redirect");
            hops.push((status.as_u16(), next.to_string()));
            target = next;
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, head_only: bool) -> FetchResult {
        if is_nongeneric_url(url) || is_bad_url(url) {
            return FetchResult::bad(url);
        }

        let head_only = head_only || is_ignored_mime(url);
        match self.fetch_page(url, head_only) {
            Ok(result) => {
                debug!(url, status = ?result.status, title = %result.title, "Fetched");
                result
            }
            Err(StoreError::MalformedUrl(bad)) => {
                warn!(url, bad = %bad, "Malformed URL");
                FetchResult::bad(url)
            }
            Err(e) => {
                warn!(url, error = %e, "Fetch failed");
                FetchResult::network_failure(url)
            }
        }
    }
}

// ==================== Page parsing ====================

/// Metadata scraped from a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub keywords: String,
}

/// Selectors tried in order for the description
const DESCRIPTION_SELECTORS: [&str; 8] = [
    r#"meta[name="description"]"#,
    r#"meta[name="Description"]"#,
    r#"meta[property="description"]"#,
    r#"meta[property="Description"]"#,
    r#"meta[name="og:description"]"#,
    r#"meta[name="og:Description"]"#,
    r#"meta[property="og:description"]"#,
    r#"meta[property="og:Description"]"#,
];

const KEYWORD_SELECTORS: [&str; 2] = [r#"meta[name="keywords"]"#, r#"meta[name="Keywords"]"#];

/// Parse title, description and keywords from HTML
///
/// Keywords that read like prose (more than three words per comma) are
/// moved into the description instead of becoming tags.
pub fn parse_page(html: &str) -> PageMeta {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();

    let mut description = first_meta_content(&document, &DESCRIPTION_SELECTORS)
        .map(|d| collapse_whitespace(&d))
        .unwrap_or_default();

    let mut keywords = first_meta_content(&document, &KEYWORD_SELECTORS)
        .map(|k| collapse_whitespace(&k))
        .unwrap_or_default();

    if is_unusual_tag(&keywords) {
        if keywords != title && keywords != description {
            debug!(keywords = %keywords, "Moving keywords to description");
            description = if description.is_empty() {
                format!("* {}", keywords)
            } else {
                format!("{}\n## {}", description, keywords)
            };
        }
        keywords.clear();
    }

    PageMeta {
        title,
        description,
        keywords: keywords.trim_matches(tags::DELIM).to_string(),
    }
}

/// Content of the first meta tag matching any selector, in order
fn first_meta_content(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|content| content.trim().to_string())
    })
}

/// Keyword strings averaging more than three words per comma
fn is_unusual_tag(keywords: &str) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let words = keywords.split_whitespace().count();
    let commas = keywords.matches(tags::DELIM).count() + 1;
    words > 3 * commas
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_basic() {
        let html = r#"
            <!DOCTYPE html>
            <html>
            <head>
                <title>
                    Test    Page
                </title>
                <meta name="description" content="  A test   description ">
                <meta name="keywords" content="rust, cli">
            </head>
            <body></body>
            </html>
        "#;

        let page = parse_page(html);
        assert_eq!(page.title, "Test Page");
        assert_eq!(page.description, "A test description");
        assert_eq!(page.keywords, "rust, cli");
    }

    #[test]
    fn test_parse_page_opengraph_description() {
        let html = r#"
            <html><head>
                <title>T</title>
                <meta property="og:description" content="OG description">
            </head></html>
        "#;

        assert_eq!(parse_page(html).description, "OG description");
    }

    #[test]
    fn test_parse_page_prefers_plain_description() {
        let html = r#"
            <html><head>
                <meta property="og:description" content="OG">
                <meta name="description" content="Plain">
            </head></html>
        "#;

        assert_eq!(parse_page(html).description, "Plain");
    }

    #[test]
    fn test_unusual_keywords_move_to_description() {
        let html = r#"
            <html><head>
                <title>T</title>
                <meta name="description" content="Desc">
                <meta name="keywords" content="this is a long sentence of words">
            </head></html>
        "#;

        let page = parse_page(html);
        assert_eq!(page.keywords, "");
        assert_eq!(page.description, "Desc\n## this is a long sentence of words");
    }

    #[test]
    fn test_unusual_keywords_without_description() {
        let html = r#"<html><head><meta name="keywords" content="one two three four five"></head></html>"#;

        let page = parse_page(html);
        assert_eq!(page.description, "* one two three four five");
        assert_eq!(page.keywords, "");
    }

    #[test]
    fn test_parse_page_missing_everything() {
        assert_eq!(parse_page("<html></html>"), PageMeta::default());
    }

    #[test]
    fn test_keywords_strip_delimiters() {
        let html = r#"<html><head><meta name="keywords" content=",a,b,"></head></html>"#;
        assert_eq!(parse_page(html).keywords, "a,b");
    }

    #[test]
    fn test_is_bad_url() {
        assert!(!is_bad_url("https://example.com/page"));
        assert!(!is_bad_url("example.com"));
        assert!(!is_bad_url("example.com:8080/x"));
        assert!(is_bad_url("localhost"));
        assert!(is_bad_url("http://localhost:3000"));
        assert!(is_bad_url("https://example.com."));
        assert!(is_bad_url(""));
    }

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(
            normalize_url("example.com/a?b=1").map(String::from),
            Some("http://example.com/a?b=1".to_string())
        );
        assert_eq!(
            normalize_url("https://example.com").map(String::from),
            Some("https://example.com/".to_string())
        );
        assert!(normalize_url("").is_none());
    }

    #[test]
    fn test_http_fetcher_requests_url_without_scheme() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let body = "<html><head><title>Local</title></head></html>";
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            String::from_utf8_lossy(&request).lines().next().unwrap_or("").to_string()
        });

        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let result = fetcher.fetch(&format!("127.0.0.1:{port}"), false);

        assert!(!result.bad_url);
        assert_eq!(result.status, Some(200));
        assert_eq!(result.title, "Local");
        assert_eq!(server.join().unwrap(), "GET / HTTP/1.1");
    }

    #[test]
    fn test_is_nongeneric_url() {
        assert!(is_nongeneric_url("about:config"));
        assert!(is_nongeneric_url("file:///tmp/x.html"));
        assert!(!is_nongeneric_url("https://example.com"));
    }

    #[test]
    fn test_is_ignored_mime() {
        assert!(is_ignored_mime("https://example.com/paper.PDF"));
        assert!(is_ignored_mime("https://example.com/notes.txt"));
        assert!(!is_ignored_mime("https://example.com/index.html"));
    }

    #[test]
    fn test_status_tags() {
        let redirected = FetchResult {
            url: "https://new.example.com".to_string(),
            keywords: "Rust, web".to_string(),
            status: Some(301),
            ..Default::default()
        };
        assert_eq!(
            redirected.status_tags(true, &StatusTag::Default, &StatusTag::Default),
            ",http:301,rust,web,"
        );
        assert_eq!(
            redirected.status_tags(false, &StatusTag::Off, &StatusTag::Default),
            ","
        );

        let missing = FetchResult {
            status: Some(404),
            ..Default::default()
        };
        assert_eq!(
            missing.status_tags(
                false,
                &StatusTag::Default,
                &StatusTag::Pattern("dead:{}".to_string())
            ),
            ",dead:404,"
        );
        assert_eq!(missing.redirect_tag(DEFAULT_STATUS_PATTERN), None);
    }

    #[test]
    fn test_network_failure_has_no_status_tags() {
        let failed = FetchResult::network_failure("https://example.com");
        assert_eq!(failed.status, None);
        assert_eq!(
            failed.status_tags(true, &StatusTag::Default, &StatusTag::Default),
            ","
        );
    }

    #[test]
    fn test_http_fetcher_rejects_bad_urls_offline() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

        let result = fetcher.fetch("localhost", false);
        assert!(result.bad_url);
        assert_eq!(result.status, None);

        assert!(fetcher.fetch("chrome://settings", false).bad_url);
    }

    #[test]
    fn test_http_fetcher_bad_proxy() {
        let config = FetchConfig {
            proxy: Some("::not a proxy::".to_string()),
            ..FetchConfig::default()
        };
        assert!(matches!(
            HttpFetcher::new(&config),
            Err(StoreError::Client(_))
        ));
    }
}
