//! DuckDuckGo-backed search providers (no API key).
//!
//! - web: the HTML endpoint (`html.duckduckgo.com/html/`), parsed with `scraper`.
//! - news: the `news.js` JSON endpoint, which needs a per-query `vqd` token
//!   scraped from the landing page first.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use weblens_core::{
    parse_link, Error, Result, SafeSearch, SearchProvider, SearchQuery, SearchResponse,
    SearchResult,
};

use crate::send_with_retry;

pub const DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
pub const DDG_BASE: &str = "https://duckduckgo.com";
pub const DEFAULT_NEWS_REGION: &str = "wt-wt";

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

/// DuckDuckGo's `kp` parameter.
fn kp_param(s: SafeSearch) -> &'static str {
    match s {
        SafeSearch::Off => "-2",
        SafeSearch::Moderate => "-1",
        SafeSearch::Strict => "1",
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.split_whitespace().collect::<Vec<_>>().join(" ");
    (!t.is_empty()).then_some(t)
}

/// Resolve a result href to the destination URL.
///
/// DuckDuckGo wraps links as `//duckduckgo.com/l/?uddg=<percent-encoded>&rut=...`.
pub fn unwrap_ddg_link(href: &str) -> Option<String> {
    let href = href.trim();
    let abs = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("{DDG_BASE}{href}")
    } else {
        href.to_string()
    };
    let u = url::Url::parse(&abs).ok()?;
    if let Some((_, target)) = u.query_pairs().find(|(k, _)| k == "uddg") {
        return parse_link(&target);
    }
    if u.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")) {
        // Internal link (ads, "more results", ...).
        return None;
    }
    parse_link(&abs)
}

/// Parse the DuckDuckGo HTML results page, in page order, skipping ads.
pub fn parse_ddg_html(html: &str, max_results: usize) -> Vec<SearchResult> {
    let doc = html_scraper::Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        html_scraper::Selector::parse(".result"),
        html_scraper::Selector::parse("a.result__a"),
        html_scraper::Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for el in doc.select(&result_sel) {
        if out.len() >= max_results {
            break;
        }
        let class = el.value().attr("class").unwrap_or("");
        if class.contains("result--ad") {
            continue;
        }
        let Some(a) = el.select(&link_sel).next() else {
            continue;
        };
        let title = non_empty(&a.text().collect::<String>());
        let link = a.value().attr("href").and_then(unwrap_ddg_link);
        if title.is_none() && link.is_none() {
            continue;
        }
        let snippet = el
            .select(&snippet_sel)
            .next()
            .and_then(|s| non_empty(&s.text().collect::<String>()));
        out.push(SearchResult {
            title,
            link,
            snippet,
            source: None,
            published: None,
            image: None,
        });
    }
    out
}

#[derive(Debug, Clone)]
pub struct DuckDuckGoWeb {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoWeb {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, DDG_HTML_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoWeb {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);
        let mut params = vec![
            ("q", q.query.trim().to_string()),
            ("kp", kp_param(q.safe_search).to_string()),
        ];
        if let Some(region) = q.region.as_deref() {
            params.push(("kl", region.to_string()));
        }

        let req = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .header(reqwest::header::ACCEPT, "text/html")
            .timeout(Duration::from_millis(timeout_ms));
        let resp = send_with_retry(req)
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("duckduckgo search HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| Error::Search(e.to_string()))?;
        let results = parse_ddg_html(&body, q.max_results);

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        tracing::debug!(provider = "duckduckgo", n = results.len(), "web search done");

        Ok(SearchResponse {
            results,
            provider: "duckduckgo".to_string(),
            timings_ms,
        })
    }
}

/// Pull the `vqd` token out of a DuckDuckGo landing page.
pub fn extract_vqd(body: &str) -> Option<String> {
    for (open, close) in [("vqd=\"", '"'), ("vqd='", '\''), ("vqd=", '&')] {
        if let Some(i) = body.find(open) {
            let rest = &body[i + open.len()..];
            let tok: String = rest
                .chars()
                .take_while(|c| *c != close && (c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
                .collect();
            if !tok.is_empty() {
                return Some(tok);
            }
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct DdgNewsResponse {
    #[serde(default)]
    results: Vec<DdgNewsItem>,
}

#[derive(Debug, Deserialize)]
struct DdgNewsItem {
    date: Option<i64>,
    title: Option<String>,
    excerpt: Option<String>,
    image: Option<String>,
    url: Option<String>,
    source: Option<String>,
}

fn rfc3339_from_epoch(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0).map(|t| t.to_rfc3339())
}

/// Map a `news.js` body into records, in backend order.
pub fn parse_ddg_news(body: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let parsed: DdgNewsResponse =
        serde_json::from_str(body).map_err(|e| Error::Search(format!("news json: {e}")))?;
    Ok(parsed
        .results
        .into_iter()
        .take(max_results)
        .map(|r| SearchResult {
            title: r.title.as_deref().and_then(non_empty),
            link: r.url.as_deref().and_then(parse_link),
            snippet: r.excerpt.as_deref().and_then(non_empty),
            source: r.source.as_deref().and_then(non_empty),
            published: r.date.and_then(rfc3339_from_epoch),
            image: r.image.as_deref().and_then(parse_link),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct DuckDuckGoNews {
    client: reqwest::Client,
    base: String,
}

impl DuckDuckGoNews {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, DDG_BASE)
    }

    /// `base` is the site root; `/` and `/news.js` are resolved against it.
    pub fn with_endpoint(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn vqd(&self, query: &str, timeout: Duration) -> Result<String> {
        let req = self
            .client
            .get(format!("{}/", self.base))
            .query(&[("q", query)])
            .timeout(timeout);
        let resp = send_with_retry(req)
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("duckduckgo token HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| Error::Search(e.to_string()))?;
        extract_vqd(&body).ok_or_else(|| Error::Search("duckduckgo vqd token not found".to_string()))
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoNews {
    fn name(&self) -> &'static str {
        "duckduckgo_news"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout = Duration::from_millis(timeout_ms_from_query(q));
        let query = q.query.trim();
        let vqd = self.vqd(query, timeout).await?;
        let t_token = t0.elapsed().as_millis();

        let region = q.region.as_deref().unwrap_or(DEFAULT_NEWS_REGION);
        let req = self
            .client
            .get(format!("{}/news.js", self.base))
            .query(&[
                ("l", region),
                ("o", "json"),
                ("noamp", "1"),
                ("q", query),
                ("vqd", vqd.as_str()),
                ("p", kp_param(q.safe_search)),
            ])
            .timeout(timeout);
        let resp = send_with_retry(req)
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("duckduckgo news HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| Error::Search(e.to_string()))?;
        let results = parse_ddg_news(&body, q.max_results)?;

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("token".to_string(), t_token);
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        tracing::debug!(provider = "duckduckgo_news", region, n = results.len(), "news search done");

        Ok(SearchResponse {
            results,
            provider: "duckduckgo_news".to_string(),
            timings_ms,
        })
    }
}
