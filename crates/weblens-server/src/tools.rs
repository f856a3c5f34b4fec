//! Tool registry: typed tools, erased at the model boundary.
//!
//! Each tool declares an `Args` struct (serde + schemars) and a typed output.
//! The registry derives the JSON Schema the model sees, validates raw model
//! arguments against the typed struct before anything runs, and turns adapter
//! errors into structured records (see [`crate::envelope`]).

use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use weblens_core::{
    ArticleRecord, FetchBackend, PaperRecord, SafeSearch, SearchProvider, SearchQuery,
    SearchResult, ToolSpec, WikiSummary,
};
use weblens_local::arxiv::ArxivClient;
use weblens_local::extract::{ExtractConfig, Extractor};
use weblens_local::search::{DuckDuckGoNews, DuckDuckGoWeb, DEFAULT_NEWS_REGION};
use weblens_local::wikipedia::{WikipediaClient, MAX_SENTENCES};
use weblens_local::{FetcherConfig, LocalFetcher};

use crate::config::AdapterArgs;
use crate::envelope::{code_for, error_obj, ErrorCode};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTool(_) => ErrorCode::UnknownTool,
            Self::InvalidArguments { .. } => ErrorCode::InvalidParams,
        }
    }
}

/// Typed arguments for a tool. `validate` runs after deserialization and
/// before the tool is invoked.
pub trait ToolArgs: DeserializeOwned + JsonSchema + Send + 'static {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync + 'static {
    type Args: ToolArgs;
    type Output: Serialize + Send;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    async fn call(&self, args: Self::Args) -> weblens_core::Result<Self::Output>;
}

fn parameters_schema<A: JsonSchema>() -> serde_json::Value {
    let schema = schemars::generate::SchemaSettings::draft2020_12()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator()
        .into_root_schema_for::<A>();
    let mut v = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = v.as_object_mut() {
        obj.remove("title");
        obj.remove("$schema");
    }
    v
}

fn parse_args<A: ToolArgs>(tool: &str, raw: serde_json::Value) -> Result<A, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };
    let raw = match raw {
        serde_json::Value::Null => serde_json::json!({}),
        v @ serde_json::Value::Object(_) => v,
        // Models occasionally emit arguments that are not valid JSON.
        serde_json::Value::String(s) => {
            return Err(invalid(format!("arguments are not a JSON object: {s}")))
        }
        other => return Err(invalid(format!("arguments must be a JSON object, got {other}"))),
    };
    let args: A = serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;
    args.validate().map_err(invalid)?;
    Ok(args)
}

#[async_trait::async_trait]
trait ErasedTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn spec(&self) -> ToolSpec;
    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

struct Erased<T>(T);

#[async_trait::async_trait]
impl<T: Tool> ErasedTool for Erased<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: T::NAME.to_string(),
            description: T::DESCRIPTION.to_string(),
            parameters: parameters_schema::<T::Args>(),
        }
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args = parse_args::<T::Args>(T::NAME, args)?;
        let out = match self.0.call(args).await {
            Ok(o) => serde_json::to_value(o)
                .unwrap_or_else(|e| error_obj(ErrorCode::UnexpectedError, e)),
            Err(e) => {
                tracing::warn!(tool = T::NAME, error = %e, "tool backend failed");
                error_obj(code_for(&e), e)
            }
        };
        Ok(out)
    }
}

/// Immutable after construction; shared as `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn ErasedTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any earlier tool with the same name.
    pub fn with<T: Tool>(mut self, tool: T) -> Self {
        self.tools.retain(|t| t.name() != T::NAME);
        self.tools.push(Box::new(Erased(tool)));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Validate `args` and run the named tool.
    ///
    /// `Ok` carries either the tool's record or a structured backend-error record;
    /// `Err` means the call never reached the tool.
    pub async fn call(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(args).await
    }
}

// ---- argument types ----

fn default_max_results() -> u32 {
    5
}

fn default_sentences() -> u32 {
    5
}

fn default_region() -> String {
    DEFAULT_NEWS_REGION.to_string()
}

fn check_query(q: &str) -> Result<(), String> {
    if q.trim().is_empty() {
        return Err("query must be non-empty".to_string());
    }
    Ok(())
}

fn check_range(field: &str, v: u32, lo: u32, hi: u32) -> Result<(), String> {
    if v < lo || v > hi {
        return Err(format!("{field} must be between {lo} and {hi}, got {v}"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearchArg {
    Off,
    #[default]
    Moderate,
    Strict,
}

impl From<SafeSearchArg> for SafeSearch {
    fn from(s: SafeSearchArg) -> Self {
        match s {
            SafeSearchArg::Off => SafeSearch::Off,
            SafeSearchArg::Moderate => SafeSearch::Moderate,
            SafeSearchArg::Strict => SafeSearch::Strict,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WebSearchArgs {
    /// Search query.
    pub query: String,
    /// Number of results (1-50).
    #[serde(default = "default_max_results")]
    #[schemars(range(min = 1, max = 50))]
    pub max_results: u32,
    /// Safe-search level: "off", "moderate" or "strict".
    #[serde(default)]
    pub safe_search: SafeSearchArg,
}

impl ToolArgs for WebSearchArgs {
    fn validate(&self) -> Result<(), String> {
        check_query(&self.query)?;
        check_range("max_results", self.max_results, 1, 50)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NewsSearchArgs {
    /// News topic.
    pub query: String,
    /// Region code, e.g. "wt-wt" (worldwide), "us-en", "in-en".
    #[serde(default = "default_region")]
    pub region: String,
    /// Number of news items (1-50).
    #[serde(default = "default_max_results")]
    #[schemars(range(min = 1, max = 50))]
    pub max_results: u32,
}

impl ToolArgs for NewsSearchArgs {
    fn validate(&self) -> Result<(), String> {
        check_query(&self.query)?;
        if self.region.trim().is_empty() {
            return Err("region must be non-empty".to_string());
        }
        check_range("max_results", self.max_results, 1, 50)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadUrlArgs {
    /// Absolute https URL of the page to read.
    pub url: String,
}

impl ToolArgs for ReadUrlArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WikipediaLookupArgs {
    /// Topic, person, place or concept.
    pub query: String,
    /// Number of summary sentences (1-10).
    #[serde(default = "default_sentences")]
    #[schemars(range(min = 1, max = 10))]
    pub sentences: u32,
}

impl ToolArgs for WikipediaLookupArgs {
    fn validate(&self) -> Result<(), String> {
        check_query(&self.query)?;
        check_range("sentences", self.sentences, 1, MAX_SENTENCES)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArxivSearchArgs {
    /// Search terms, or an arXiv query such as "ti:transformer AND cat:cs.CL".
    pub query: String,
    /// Number of papers (1-50).
    #[serde(default = "default_max_results")]
    #[schemars(range(min = 1, max = 50))]
    pub max_results: u32,
}

impl ToolArgs for ArxivSearchArgs {
    fn validate(&self) -> Result<(), String> {
        check_query(&self.query)?;
        check_range("max_results", self.max_results, 1, 50)
    }
}

// ---- tools ----

pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    timeout_ms: u64,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, timeout_ms: u64) -> Self {
        Self {
            provider,
            timeout_ms,
        }
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    type Args = WebSearchArgs;
    type Output = Vec<SearchResult>;

    const NAME: &'static str = "web_search";
    const DESCRIPTION: &'static str = "General web search (DuckDuckGo). Returns [{title, link, snippet, source, published, image}] in relevance order; follow up with read_url for full text.";

    async fn call(&self, args: WebSearchArgs) -> weblens_core::Result<Vec<SearchResult>> {
        let mut q = SearchQuery::new(args.query.trim(), args.max_results as usize);
        q.safe_search = args.safe_search.into();
        q.timeout_ms = Some(self.timeout_ms);
        Ok(self.provider.search(&q).await?.into_records(&args.query))
    }
}

pub struct NewsSearchTool {
    provider: Arc<dyn SearchProvider>,
    timeout_ms: u64,
}

impl NewsSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, timeout_ms: u64) -> Self {
        Self {
            provider,
            timeout_ms,
        }
    }
}

#[async_trait::async_trait]
impl Tool for NewsSearchTool {
    type Args = NewsSearchArgs;
    type Output = Vec<SearchResult>;

    const NAME: &'static str = "news_search";
    const DESCRIPTION: &'static str = "Recent news across many outlets (DuckDuckGo News). Returns [{title, link, snippet, source, published, image}]; use only for recent events.";

    async fn call(&self, args: NewsSearchArgs) -> weblens_core::Result<Vec<SearchResult>> {
        let mut q = SearchQuery::new(args.query.trim(), args.max_results as usize);
        q.region = Some(args.region.trim().to_string());
        q.timeout_ms = Some(self.timeout_ms);
        Ok(self.provider.search(&q).await?.into_records(&args.query))
    }
}

pub struct ReadUrlTool<F> {
    extractor: Extractor<F>,
}

impl<F: FetchBackend> ReadUrlTool<F> {
    pub fn new(extractor: Extractor<F>) -> Self {
        Self { extractor }
    }
}

#[async_trait::async_trait]
impl<F: FetchBackend + 'static> Tool for ReadUrlTool<F> {
    type Args = ReadUrlArgs;
    type Output = ArticleRecord;

    const NAME: &'static str = "read_url";
    const DESCRIPTION: &'static str = "Fetch an https page and extract its main text. Returns {url, title, author, date, text, error}; error is one of unsupported_scheme, fetch_failed, extract_failed.";

    async fn call(&self, args: ReadUrlArgs) -> weblens_core::Result<ArticleRecord> {
        let url = args.url.trim();
        Ok(ArticleRecord::from_result(url, self.extractor.extract(url).await))
    }
}

pub struct WikipediaLookupTool {
    client: WikipediaClient,
}

impl WikipediaLookupTool {
    pub fn new(client: WikipediaClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for WikipediaLookupTool {
    type Args = WikipediaLookupArgs;
    type Output = WikiSummary;

    const NAME: &'static str = "wikipedia_lookup";
    const DESCRIPTION: &'static str = "Encyclopedic background from English Wikipedia. Returns {title, summary, url} for the best match (all null when nothing matches).";

    async fn call(&self, args: WikipediaLookupArgs) -> weblens_core::Result<WikiSummary> {
        Ok(self.client.lookup(&args.query, args.sentences).await)
    }
}

pub struct ArxivSearchTool {
    client: ArxivClient,
}

impl ArxivSearchTool {
    pub fn new(client: ArxivClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for ArxivSearchTool {
    type Args = ArxivSearchArgs;
    type Output = Vec<PaperRecord>;

    const NAME: &'static str = "arxiv_search";
    const DESCRIPTION: &'static str = "Search arXiv papers by relevance. Returns [{title, authors, summary, pdf_url, published, primary_category}].";

    async fn call(&self, args: ArxivSearchArgs) -> weblens_core::Result<Vec<PaperRecord>> {
        self.client.search(&args.query, args.max_results as usize).await
    }
}

/// The five lookup tools wired to their live backends.
pub fn standard_registry(a: &AdapterArgs) -> weblens_core::Result<ToolRegistry> {
    let search_client = weblens_local::http_client()?;
    let fetcher = LocalFetcher::new(FetcherConfig {
        insecure_tls: a.insecure_tls,
        ..FetcherConfig::default()
    })?;
    let extract_cfg = ExtractConfig {
        timeout_ms: a.fetch_timeout_ms,
        max_bytes: a.max_bytes,
        ..ExtractConfig::default()
    };
    let backend_timeout = Duration::from_millis(a.search_timeout_ms);

    Ok(ToolRegistry::new()
        .with(WebSearchTool::new(
            Arc::new(DuckDuckGoWeb::with_endpoint(search_client.clone(), &a.ddg_html_endpoint)),
            a.search_timeout_ms,
        ))
        .with(NewsSearchTool::new(
            Arc::new(DuckDuckGoNews::with_endpoint(search_client, &a.ddg_base)),
            a.search_timeout_ms,
        ))
        .with(ReadUrlTool::new(Extractor::new(fetcher, extract_cfg)))
        .with(WikipediaLookupTool::new(
            WikipediaClient::with_endpoint(weblens_local::http_client()?, &a.wikipedia_endpoint)
                .timeout(backend_timeout),
        ))
        .with(ArxivSearchTool::new(
            ArxivClient::with_endpoint(weblens_local::http_client()?, &a.arxiv_endpoint)
                .timeout(backend_timeout),
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use weblens_core::{Error, SearchResponse};

    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<SearchQuery>>,
        results: Vec<SearchResult>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl SearchProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn search(&self, q: &SearchQuery) -> weblens_core::Result<SearchResponse> {
            self.seen.lock().unwrap().push(q.clone());
            if self.fail {
                return Err(Error::Search("HTTP 503".to_string()));
            }
            Ok(SearchResponse {
                results: self.results.clone(),
                provider: "recording".to_string(),
                timings_ms: BTreeMap::new(),
            })
        }
    }

    fn hit(title: &str) -> SearchResult {
        SearchResult {
            title: Some(title.to_string()),
            link: Some(format!("https://example.com/{title}")),
            snippet: None,
            source: None,
            published: None,
            image: None,
        }
    }

    fn web_registry(p: Arc<RecordingProvider>) -> ToolRegistry {
        ToolRegistry::new().with(WebSearchTool::new(p, 5_000))
    }

    fn adapter_args() -> AdapterArgs {
        AdapterArgs {
            ddg_html_endpoint: "http://127.0.0.1:1/html/".to_string(),
            ddg_base: "http://127.0.0.1:1".to_string(),
            wikipedia_endpoint: "http://127.0.0.1:1/w/api.php".to_string(),
            arxiv_endpoint: "http://127.0.0.1:1/api/query".to_string(),
            search_timeout_ms: 2_000,
            fetch_timeout_ms: 2_000,
            max_bytes: 1_000_000,
            insecure_tls: false,
        }
    }

    #[test]
    fn standard_registry_exposes_five_tools_with_object_schemas() {
        let reg = standard_registry(&adapter_args()).unwrap();
        assert_eq!(
            reg.names(),
            vec!["web_search", "news_search", "read_url", "wikipedia_lookup", "arxiv_search"]
        );
        for spec in reg.specs() {
            assert_eq!(spec.parameters["type"], "object", "{}", spec.name);
            assert!(spec.parameters.get("$schema").is_none());
            assert!(!spec.parameters.to_string().contains("$ref"), "{}", spec.name);
            assert_eq!(spec.parameters["required"].as_array().map(Vec::len), Some(1), "{}", spec.name);
        }
        let web = &reg.specs()[0];
        let props = web.parameters["properties"].as_object().unwrap();
        assert!(props.contains_key("query"));
        assert!(props.contains_key("max_results"));
        assert!(props.contains_key("safe_search"));
        assert_eq!(web.parameters["required"], json!(["query"]));
        assert_eq!(web.parameters["additionalProperties"], false);
    }

    #[tokio::test]
    async fn defaults_are_applied_before_reaching_the_backend() {
        let p = Arc::new(RecordingProvider {
            results: vec![hit("a")],
            ..Default::default()
        });
        let reg = web_registry(p.clone());
        let out = reg.call("web_search", json!({"query": "rust"})).await.unwrap();
        assert_eq!(out[0]["title"], "a");

        let seen = p.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].max_results, 5);
        assert_eq!(seen[0].safe_search, SafeSearch::Moderate);
        assert_eq!(seen[0].timeout_ms, Some(5_000));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_backend() {
        let p = Arc::new(RecordingProvider::default());
        let reg = web_registry(p.clone());
        for bad in [
            json!({"query": "x", "max_results": 0}),
            json!({"query": "x", "max_results": 51}),
            json!({"query": "x", "max_results": -3}),
            json!({"query": "x", "safe_search": "extreme"}),
            json!({"query": "x", "page": 2}),
            json!({"query": "   "}),
            json!({}),
            json!("{not json"),
            json!([1, 2]),
        ] {
            let err = reg.call("web_search", bad.clone()).await.unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == "web_search"),
                "{bad} -> {err:?}"
            );
        }
        assert!(p.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let reg = web_registry(Arc::new(RecordingProvider::default()));
        let err = reg.call("spl_func", json!({"n": 4})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("spl_func".to_string()));
        assert_eq!(err.code(), ErrorCode::UnknownTool);
    }

    #[tokio::test]
    async fn empty_results_become_sentinel() {
        let reg = web_registry(Arc::new(RecordingProvider::default()));
        let out = reg.call("web_search", json!({"query": "qwzx"})).await.unwrap();
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["title"], "No results");
        assert!(arr[0]["link"].is_null());
    }

    #[tokio::test]
    async fn empty_news_results_become_sentinel() {
        let p = Arc::new(RecordingProvider::default());
        let reg = ToolRegistry::new().with(NewsSearchTool::new(p.clone(), 5_000));
        let out = reg.call("news_search", json!({"query": "qwzx"})).await.unwrap();
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["title"], "No results");
        assert!(arr[0]["link"].is_null());
        assert!(arr[0]["published"].is_null());
        assert_eq!(p.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_becomes_search_failed_record() {
        let reg = web_registry(Arc::new(RecordingProvider {
            fail: true,
            ..Default::default()
        }));
        let out = reg.call("web_search", json!({"query": "rust"})).await.unwrap();
        assert_eq!(out["error"], "search_failed");
        assert_eq!(out["retryable"], true);
    }

    #[tokio::test]
    async fn news_search_defaults_to_worldwide_region() {
        let p = Arc::new(RecordingProvider {
            results: vec![hit("n")],
            ..Default::default()
        });
        let reg = ToolRegistry::new().with(NewsSearchTool::new(p.clone(), 5_000));
        reg.call("news_search", json!({"query": "election"})).await.unwrap();
        reg.call("news_search", json!({"query": "election", "region": "in-en", "max_results": 2}))
            .await
            .unwrap();
        let seen = p.seen.lock().unwrap();
        assert_eq!(seen[0].region.as_deref(), Some("wt-wt"));
        assert_eq!(seen[1].region.as_deref(), Some("in-en"));
        assert_eq!(seen[1].max_results, 2);
    }

    #[tokio::test]
    async fn read_url_rejects_plain_http_as_record() {
        let reg = standard_registry(&adapter_args()).unwrap();
        let out = reg
            .call("read_url", json!({"url": "http://example.com/a"}))
            .await
            .unwrap();
        assert_eq!(out["error"], "unsupported_scheme");
        assert!(out["text"].is_null());
        assert_eq!(out["url"], "http://example.com/a");
    }

    #[tokio::test]
    async fn wikipedia_sentences_are_range_checked() {
        let reg = standard_registry(&adapter_args()).unwrap();
        let err = reg
            .call("wikipedia_lookup", json!({"query": "Rust", "sentences": 11}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn registering_same_name_replaces_previous_tool() {
        let reg = web_registry(Arc::new(RecordingProvider::default()))
            .with(WebSearchTool::new(Arc::new(RecordingProvider::default()), 1_000));
        assert_eq!(reg.names(), vec!["web_search"]);
    }
}
