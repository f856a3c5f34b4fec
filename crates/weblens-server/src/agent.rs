//! Bounded tool-calling loop around a chat model.
//!
//! One request = one transcript. Each turn asks the model for either a final
//! answer or tool calls; tool calls run one at a time in the order given and
//! their results are appended as `tool` turns. Budgets are hard: exceeding
//! either fails the request instead of truncating silently.

use std::sync::Arc;
use std::time::{Duration, Instant};
use weblens_core::{ChatMessage, ChatModel, ToolCallRequest};

use crate::envelope::{error_obj, ErrorCode};
use crate::prompt;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_tool_calls: usize,
    /// Model invocations per request.
    pub max_turns: usize,
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 8,
            max_turns: 10,
            tool_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Model(#[from] weblens_core::Error),
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("the model returned no assistant text")]
    NoAssistantReply,
}

const FINAL_CHANNEL_MARKER: &str = "assistantfinal";

/// gpt-oss replies can carry raw channel markers (`analysis...assistantfinal<answer>`);
/// keep only what follows the last final-channel marker.
pub fn final_answer_text(s: &str) -> String {
    match s.rfind(FINAL_CHANNEL_MARKER) {
        Some(i) => s[i + FINAL_CHANNEL_MARKER.len()..].trim().to_string(),
        None => s.trim().to_string(),
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    cfg: AgentConfig,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>, cfg: AgentConfig) -> Self {
        Self {
            model,
            tools,
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            cfg,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.cfg
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Summarize and fact-check `text`. Callers reject blank text before this.
    pub async fn summarize(&self, text: &str, url: Option<&str>) -> Result<String, AgentError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(prompt::user_prompt(text, url)),
        ];
        self.run(messages).await
    }

    /// Drive the loop from an initial transcript to the last assistant text.
    pub async fn run(&self, mut messages: Vec<ChatMessage>) -> Result<String, AgentError> {
        let specs = self.tools.specs();
        let mut calls_used = 0usize;
        let mut last_text: Option<String> = None;

        for turn in 0..self.cfg.max_turns {
            let t0 = Instant::now();
            let reply = self.model.complete(&messages, &specs).await?;
            tracing::info!(
                turn,
                model = self.model.name(),
                tool_calls = reply.tool_calls.len(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "model turn"
            );

            if let Some(t) = reply.content.as_deref().map(final_answer_text) {
                if !t.is_empty() {
                    last_text = Some(t);
                }
            }
            if reply.is_terminal() {
                return last_text.ok_or(AgentError::NoAssistantReply);
            }

            let requested = reply.tool_calls.len();
            if calls_used + requested > self.cfg.max_tool_calls {
                tracing::warn!(calls_used, requested, max = self.cfg.max_tool_calls, "tool budget exceeded");
                return Err(AgentError::BudgetExceeded(format!(
                    "model requested {requested} tool call(s) with {calls_used} of {} already used",
                    self.cfg.max_tool_calls
                )));
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                calls_used += 1;
                let result = self.execute(&call).await;
                messages.push(ChatMessage::tool_result(call.id, result.to_string()));
            }
        }

        tracing::warn!(max_turns = self.cfg.max_turns, "turn budget exceeded");
        Err(AgentError::BudgetExceeded(format!(
            "no final answer after {} model turns",
            self.cfg.max_turns
        )))
    }

    /// Run one tool call. Every failure becomes a record the model can read.
    async fn execute(&self, call: &ToolCallRequest) -> serde_json::Value {
        let t0 = Instant::now();
        let fut = self.tools.call(&call.name, call.arguments.clone());
        let out = match tokio::time::timeout(self.cfg.tool_timeout, fut).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call rejected");
                error_obj(e.code(), e)
            }
            Err(_) => {
                tracing::warn!(tool = %call.name, timeout_ms = self.cfg.tool_timeout.as_millis() as u64, "tool call timed out");
                error_obj(
                    ErrorCode::Timeout,
                    format!(
                        "{} did not finish within {} ms",
                        call.name,
                        self.cfg.tool_timeout.as_millis()
                    ),
                )
            }
        };
        tracing::info!(
            tool = %call.name,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "tool call"
        );
        out
    }
}
