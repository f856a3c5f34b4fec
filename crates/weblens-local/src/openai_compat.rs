//! OpenAI-compatible `chat/completions` client with tool calling.
//!
//! Defaults target the Hugging Face inference router, which speaks the same
//! wire format for hosted open-weight models.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use weblens_core::{ChatMessage, ChatModel, Error, Result, Role, ToolCallRequest, ToolSpec};

pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";

#[derive(Clone)]
pub struct ChatModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub timeout_ms: u64,
}

// Hand-written so the token never ends up in logs.
impl std::fmt::Debug for ChatModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModelConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ChatModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            temperature: Some(0.3),
            max_tokens: None,
            timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    cfg: ChatModelConfig,
}

impl OpenAiCompatClient {
    pub fn new(client: reqwest::Client, cfg: ChatModelConfig) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            return Err(Error::NotConfigured("missing model access token".to_string()));
        }
        if cfg.model.trim().is_empty() {
            return Err(Error::NotConfigured("missing model id".to_string()));
        }
        Ok(Self { client, cfg })
    }

    pub fn base_url(&self) -> &str {
        &self.cfg.base_url
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.cfg.model
    }

    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
        let req = ChatCompletionsRequest {
            model: self.cfg.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools: tools.iter().map(WireTool::from).collect(),
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
            stream: Some(false),
        };

        let resp = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(Duration::from_millis(self.cfg.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.cfg.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(Error::Llm(format!(
                "chat.completions HTTP {status}: {}",
                body.trim()
            )));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("chat.completions returned no choices".to_string()))?;
        Ok(choice.message.into_chat_message())
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: Role,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        // The wire format carries arguments as a JSON-encoded string.
                        arguments: match &c.arguments {
                            serde_json::Value::String(s) => s.clone(),
                            v => v.to_string(),
                        },
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(t: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl ChoiceMessage {
    fn into_chat_message(self) -> ChatMessage {
        let calls = self
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let raw = c.function.arguments.trim();
                // Unparseable arguments are kept verbatim so argument validation can reject them.
                let arguments = if raw.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(raw)
                        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
                };
                ToolCallRequest {
                    id: if c.id.is_empty() {
                        format!("call_{i}")
                    } else {
                        c.id
                    },
                    name: c.function.name,
                    arguments,
                }
            })
            .collect::<Vec<_>>();
        let content = self.content.filter(|s| !s.trim().is_empty());
        ChatMessage::assistant_tool_calls(content, calls)
    }
}
