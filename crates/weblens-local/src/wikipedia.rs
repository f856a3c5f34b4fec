//! English Wikipedia summaries via the MediaWiki action API.
//!
//! Two requests: a full-text search for the best single title, then the intro
//! extract of that page (plain text, truncated to N sentences, redirects resolved).
//! Lookups never fail outright; problems are reported in `WikiSummary::error`.

use serde::Deserialize;
use std::time::Duration;
use weblens_core::{Error, Result, WikiSummary};

use crate::send_with_retry;

pub const WIKIPEDIA_API_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";

/// `exsentences` is only honoured by the API in this range.
pub const MAX_SENTENCES: u32 = 10;

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    query: Option<SearchQueryPart>,
}

#[derive(Debug, Deserialize)]
struct SearchQueryPart {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PagesEnvelope {
    query: Option<PagesQueryPart>,
}

#[derive(Debug, Deserialize)]
struct PagesQueryPart {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: Option<String>,
    extract: Option<String>,
    fullurl: Option<String>,
    #[serde(default)]
    missing: bool,
}

#[derive(Debug, Clone)]
pub struct WikipediaClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl WikipediaClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, WIKIPEDIA_API_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Best-matching page summary, all-null when nothing matches.
    pub async fn lookup(&self, query: &str, sentences: u32) -> WikiSummary {
        match self.try_lookup(query, sentences).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(query, error = %e, "wikipedia lookup failed");
                WikiSummary::failed(e)
            }
        }
    }

    async fn try_lookup(&self, query: &str, sentences: u32) -> Result<WikiSummary> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(WikiSummary::not_found());
        }
        let Some(title) = self.best_title(query).await? else {
            return Ok(WikiSummary::not_found());
        };

        let sentences = sentences.clamp(1, MAX_SENTENCES).to_string();
        let env: PagesEnvelope = self
            .get_json(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "extracts|info"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exsentences", sentences.as_str()),
                ("redirects", "1"),
                ("inprop", "url"),
                ("titles", title.as_str()),
            ])
            .await?;

        let page = env
            .query
            .and_then(|q| q.pages.into_iter().next())
            .filter(|p| !p.missing);
        let Some(page) = page else {
            return Ok(WikiSummary::failed(format!("page not found: {title}")));
        };

        let summary = page.extract.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(WikiSummary {
            title: page.title.or(Some(title)),
            summary,
            url: page.fullurl,
            error: None,
        })
    }

    async fn best_title(&self, query: &str) -> Result<Option<String>> {
        let env: SearchEnvelope = self
            .get_json(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("list", "search"),
                ("srlimit", "1"),
                ("srprop", ""),
                ("srsearch", query),
            ])
            .await?;
        Ok(env
            .query
            .and_then(|q| q.search.into_iter().next())
            .map(|h| h.title))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let req = self
            .client
            .get(&self.endpoint)
            .query(params)
            .timeout(self.timeout);
        let resp = send_with_retry(req)
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("wikipedia HTTP {status}")));
        }
        resp.json::<T>().await.map_err(|e| Error::Fetch(e.to_string()))
    }
}
