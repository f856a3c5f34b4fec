//! Start-up configuration: clap flags, each backed by an environment variable.
//!
//! Everything here is read once; the resulting agent and registry are immutable.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use weblens_local::openai_compat::{ChatModelConfig, OpenAiCompatClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
use weblens_local::search::{DDG_BASE, DDG_HTML_ENDPOINT};
use weblens_local::{arxiv::ARXIV_API_ENDPOINT, wikipedia::WIKIPEDIA_API_ENDPOINT};

use crate::agent::{Agent, AgentConfig};
use crate::tools::{standard_registry, ToolRegistry};

pub const TOKEN_ENV: &str = "HUGGINGFACEHUB_API_TOKEN";

/// Hosted model settings.
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// Access token for the model endpoint.
    #[arg(long = "api-token", env = TOKEN_ENV, hide_env_values = true)]
    pub api_token: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint (`/v1/chat/completions` is appended).
    #[arg(long, env = "WEBLENS_MODEL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub model_base_url: String,
    #[arg(long, env = "WEBLENS_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, env = "WEBLENS_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f64,
    #[arg(long, env = "WEBLENS_MAX_TOKENS")]
    pub max_tokens: Option<u64>,
    /// Per model call.
    #[arg(long, env = "WEBLENS_MODEL_TIMEOUT_MS", default_value_t = 120_000)]
    pub model_timeout_ms: u64,
}

impl ModelArgs {
    pub fn chat_model_config(&self) -> Result<ChatModelConfig> {
        let token = self
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .with_context(|| format!("{TOKEN_ENV} is not set (or pass --api-token)"))?;
        Ok(ChatModelConfig {
            base_url: self.model_base_url.trim().to_string(),
            model: self.model.trim().to_string(),
            api_key: token.to_string(),
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
            timeout_ms: self.model_timeout_ms,
        })
    }
}

/// Agent loop budgets.
#[derive(clap::Args, Debug, Clone)]
pub struct AgentArgs {
    /// Total tool calls allowed per request.
    #[arg(long, env = "WEBLENS_MAX_TOOL_CALLS", default_value_t = 8)]
    pub max_tool_calls: usize,
    /// Model invocations allowed per request.
    #[arg(long, env = "WEBLENS_MAX_TURNS", default_value_t = 10)]
    pub max_turns: usize,
    /// Wall-clock limit per tool call, retries included. Keep it above
    /// 4x `--search-timeout-ms`: wikipedia_lookup and news_search make two requests and each may retry once.
    #[arg(long, env = "WEBLENS_TOOL_TIMEOUT_MS", default_value_t = 30_000)]
    pub tool_timeout_ms: u64,
}

impl AgentArgs {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_tool_calls: self.max_tool_calls,
            max_turns: self.max_turns,
            tool_timeout: Duration::from_millis(self.tool_timeout_ms.max(1)),
        }
    }
}

/// Lookup backend endpoints and fetch limits.
#[derive(clap::Args, Debug, Clone)]
pub struct AdapterArgs {
    #[arg(long, env = "WEBLENS_DDG_HTML_ENDPOINT", default_value = DDG_HTML_ENDPOINT)]
    pub ddg_html_endpoint: String,
    /// Site root for the news token + `news.js` requests.
    #[arg(long, env = "WEBLENS_DDG_BASE", default_value = DDG_BASE)]
    pub ddg_base: String,
    #[arg(long, env = "WEBLENS_WIKIPEDIA_ENDPOINT", default_value = WIKIPEDIA_API_ENDPOINT)]
    pub wikipedia_endpoint: String,
    #[arg(long, env = "WEBLENS_ARXIV_ENDPOINT", default_value = ARXIV_API_ENDPOINT)]
    pub arxiv_endpoint: String,
    /// HTTP timeout per attempt for search, Wikipedia and arXiv requests (clamped to 1-60 s for search).
    #[arg(long, env = "WEBLENS_SEARCH_TIMEOUT_MS", default_value_t = 7_000)]
    pub search_timeout_ms: u64,
    #[arg(long, env = "WEBLENS_FETCH_TIMEOUT_MS", default_value_t = 20_000)]
    pub fetch_timeout_ms: u64,
    /// Cap on bytes read from a page body by read_url.
    #[arg(long, env = "WEBLENS_MAX_BYTES", default_value_t = 5_000_000)]
    pub max_bytes: u64,
    /// Skip TLS certificate verification for read_url page fetches.
    #[arg(long, env = "WEBLENS_INSECURE_TLS")]
    pub insecure_tls: bool,
}

impl AdapterArgs {
    pub fn registry(&self) -> Result<ToolRegistry> {
        standard_registry(self).context("building lookup tools")
    }
}

/// Wire the model client, tools and budgets into one shareable agent.
pub fn build_agent(model: &ModelArgs, agent: &AgentArgs, adapters: &AdapterArgs) -> Result<Agent> {
    let cfg = model.chat_model_config()?;
    tracing::info!(model = %cfg.model, base_url = %cfg.base_url, "model configured");
    let client = weblens_local::http_client().context("building http client")?;
    let chat = OpenAiCompatClient::new(client, cfg).context("configuring model client")?;
    Ok(Agent::new(
        Arc::new(chat),
        Arc::new(adapters.registry()?),
        agent.agent_config(),
    ))
}

/// Load `.env` from the working directory (or a parent) unless `WEBLENS_DOTENV=0`.
///
/// Variables already present in the process environment win.
pub fn load_dotenv() -> Option<std::path::PathBuf> {
    let disabled = std::env::var("WEBLENS_DOTENV")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
        .unwrap_or(false);
    if disabled {
        return None;
    }
    dotenvy::dotenv().ok()
}

/// Install the global tracing subscriber (stderr; `RUST_LOG` overrides the `info` default).
pub fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
