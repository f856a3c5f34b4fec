use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---- fetch ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the operation (network + body read).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            max_bytes: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

// ---- search ----

/// DuckDuckGo-style safe search levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    #[default]
    Moderate,
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
    /// Region hint, e.g. "wt-wt" (worldwide) or "us-en".
    pub region: Option<String>,
    pub safe_search: SafeSearch,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
            region: None,
            safe_search: SafeSearch::default(),
            timeout_ms: None,
        }
    }
}

/// One hit from a general or news search.
///
/// Optional fields always serialize (as `null` when absent) so consumers never
/// have to distinguish "missing" from "empty".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: Option<String>,
    /// Absolute http(s) URL, or `None` when the backend gave nothing usable.
    pub link: Option<String>,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub published: Option<String>,
    pub image: Option<String>,
}

impl SearchResult {
    pub const NO_RESULTS_TITLE: &'static str = "No results";

    /// Placeholder returned instead of an empty result list.
    pub fn no_results(query: &str) -> Self {
        Self {
            title: Some(Self::NO_RESULTS_TITLE.to_string()),
            link: None,
            snippet: Some(format!("No results found for query: {}", query.trim())),
            source: None,
            published: None,
            image: None,
        }
    }

    pub fn is_no_results(&self) -> bool {
        self.link.is_none() && self.title.as_deref() == Some(Self::NO_RESULTS_TITLE)
    }
}

/// Normalize a backend-provided link: keep it only if it parses as an absolute http(s) URL.
pub fn parse_link(raw: &str) -> Option<String> {
    let u = url::Url::parse(raw.trim()).ok()?;
    matches!(u.scheme(), "http" | "https").then(|| u.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

impl SearchResponse {
    /// Results in backend order, or the single "no results" sentinel.
    pub fn into_records(self, query: &str) -> Vec<SearchResult> {
        if self.results.is_empty() {
            return vec![SearchResult::no_results(query)];
        }
        self.results
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

// ---- extraction ----

/// Successfully extracted page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub text: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("only https links are supported")]
    UnsupportedScheme,
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("no readable text could be extracted")]
    ExtractFailed,
}

impl ExtractError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::FetchFailed(_) => "fetch_failed",
            Self::ExtractFailed => "extract_failed",
        }
    }
}

/// Wire form of an extraction outcome: exactly one of `text` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub text: Option<String>,
    pub error: Option<String>,
}

impl ArticleRecord {
    pub fn from_result(url: &str, r: std::result::Result<Article, ExtractError>) -> Self {
        match r {
            Ok(a) => Self {
                url: a.url,
                title: a.title,
                author: a.author,
                date: a.date,
                text: Some(a.text),
                error: None,
            },
            Err(e) => Self {
                url: url.to_string(),
                title: None,
                author: None,
                date: None,
                text: None,
                error: Some(e.code().to_string()),
            },
        }
    }
}

// ---- encyclopedia ----

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiSummary {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    /// Only present when the backend failed; "no match" is all-null without an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WikiSummary {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

// ---- academic ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    /// Full author roster in backend order (possibly empty).
    pub authors: Vec<String>,
    pub summary: String,
    pub pdf_url: Option<String>,
    pub published: Option<String>,
    pub primary_category: Option<String>,
}

impl PaperRecord {
    pub const NO_RESULTS_TITLE: &'static str = "No results";

    pub fn no_results(query: &str) -> Self {
        Self {
            title: Self::NO_RESULTS_TITLE.to_string(),
            authors: Vec::new(),
            summary: format!("No papers found for query: {}", query.trim()),
            pdf_url: None,
            published: None,
            primary_category: None,
        }
    }

    pub fn is_no_results(&self) -> bool {
        self.pdf_url.is_none() && self.title == Self::NO_RESULTS_TITLE
    }
}

// ---- agent / model ----

/// A capability the model may call: name, description, and JSON Schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One model-issued tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of the agent conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on `Role::Tool` turns: which call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// True for a turn that ends the loop (no pending tool calls).
    pub fn is_terminal(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Hosted chat model with tool calling.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_search_response_becomes_single_sentinel() {
        let resp = SearchResponse {
            results: Vec::new(),
            provider: "test".to_string(),
            timings_ms: BTreeMap::new(),
        };
        let out = resp.into_records("rust async");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_no_results());
        assert!(out[0].snippet.as_deref().unwrap_or("").contains("rust async"));
    }

    #[test]
    fn non_empty_search_response_keeps_backend_order() {
        let mk = |t: &str| SearchResult {
            title: Some(t.to_string()),
            link: Some(format!("https://example.com/{t}")),
            snippet: None,
            source: None,
            published: None,
            image: None,
        };
        let resp = SearchResponse {
            results: vec![mk("b"), mk("a"), mk("c")],
            provider: "test".to_string(),
            timings_ms: BTreeMap::new(),
        };
        let titles: Vec<_> = resp
            .into_records("q")
            .into_iter()
            .map(|r| r.title.unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
    }

    #[test]
    fn search_result_serializes_missing_fields_as_null() {
        let v = serde_json::to_value(SearchResult::no_results("x")).unwrap();
        let obj = v.as_object().unwrap();
        for k in ["title", "link", "snippet", "source", "published", "image"] {
            assert!(obj.contains_key(k), "missing key {k}");
        }
        assert!(obj["published"].is_null());
        assert!(obj["link"].is_null());
    }

    #[test]
    fn parse_link_keeps_only_absolute_http_urls() {
        assert_eq!(
            parse_link(" https://example.com/a?b=1 ").as_deref(),
            Some("https://example.com/a?b=1")
        );
        assert!(parse_link("/relative/path").is_none());
        assert!(parse_link("javascript:alert(1)").is_none());
        assert!(parse_link("").is_none());
    }

    #[test]
    fn article_record_has_exactly_one_of_text_or_error() {
        let ok = ArticleRecord::from_result(
            "https://example.com",
            Ok(Article {
                url: "https://example.com".to_string(),
                title: None,
                author: None,
                date: None,
                text: "body".to_string(),
            }),
        );
        assert_eq!(ok.text.as_deref(), Some("body"));
        assert!(ok.error.is_none());

        for e in [
            ExtractError::UnsupportedScheme,
            ExtractError::FetchFailed("boom".to_string()),
            ExtractError::ExtractFailed,
        ] {
            let code = e.code();
            let r = ArticleRecord::from_result("http://example.com", Err(e));
            assert!(r.text.is_none());
            assert_eq!(r.error.as_deref(), Some(code));
            assert_eq!(r.url, "http://example.com");
        }
    }

    #[test]
    fn wiki_not_found_is_all_null_without_error_key() {
        let v = serde_json::to_value(WikiSummary::not_found()).unwrap();
        assert!(v["title"].is_null());
        assert!(v["summary"].is_null());
        assert!(v["url"].is_null());
        assert!(v.get("error").is_none());

        let v = serde_json::to_value(WikiSummary::failed("timeout")).unwrap();
        assert!(v["title"].is_null());
        assert_eq!(v["error"], "timeout");
    }

    #[test]
    fn paper_sentinel_has_empty_author_list() {
        let p = PaperRecord::no_results("quantum");
        assert!(p.is_no_results());
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["authors"], serde_json::json!([]));
    }

    #[test]
    fn terminal_turn_has_no_pending_tool_calls() {
        assert!(ChatMessage::assistant("done").is_terminal());
        let call = ToolCallRequest {
            id: "c1".to_string(),
            name: "web_search".to_string(),
            arguments: serde_json::json!({"query": "x"}),
        };
        assert!(!ChatMessage::assistant_tool_calls(None, vec![call]).is_terminal());
    }
}
