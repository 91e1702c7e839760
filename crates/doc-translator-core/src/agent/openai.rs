use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{BackendInfo, ChatBackend, ChatReply, ChatRequest, TokenUsage};
use crate::config::{AgentConfig, ThinkingMode};
use crate::error::{Error, Result};

/// OpenAI-compatible chat-completion transport
/// Works with: OpenAI, DeepSeek, Ollama, llama.cpp server, DashScope, etc.
pub struct OpenAiBackend {
    client: Client,
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// Optional API key for authentication
    pub api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "OpenAI Compatible",
            requires_api_key: false, // Optional for local servers
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let url = self.endpoint();
        debug!(
            "POST {} (model {}, {} prompt bytes)",
            url,
            request.model,
            request.user_prompt().len()
        );

        let mut req = self.client.post(&url).json(request);

        // Add API key if configured
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Transport(format!("request timed out: {e}"))
            } else {
                Error::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            warn!("API error: {} - {}", status, body);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        parse_reply(&body)
    }
}

/// Extract `choices[0].message.content` and usage from a response body
pub fn parse_reply(body: &str) -> Result<ChatReply> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::ResponseShape(format!("body is not JSON: {e}")))?;

    let content = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ResponseShape(format!("missing choices[0].message.content in {body}")))?;

    Ok(ChatReply {
        content: content.to_string(),
        usage: TokenUsage::from_response(&value),
    })
}

/// Request fields that switch reasoning on or off, for providers known to accept one
pub fn thinking_fields(base_url: &str, mode: ThinkingMode) -> Map<String, Value> {
    let mut fields = Map::new();
    if mode == ThinkingMode::Default {
        return fields;
    }
    let enable = mode == ThinkingMode::Enable;
    let switch = if enable { "enabled" } else { "disabled" };
    let budget: i64 = if enable { -1 } else { 0 };

    let host = base_url
        .split("://")
        .nth(1)
        .unwrap_or(base_url)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();

    let field = match host {
        "open.bigmodel.cn" | "ark.cn-beijing.volces.com" => Some((
            "thinking",
            json!({"type": switch}),
        )),
        "dashscope.aliyuncs.com" | "api.siliconflow.cn" => Some(("enable_thinking", json!(enable))),
        "generativelanguage.googleapis.com" => Some((
            "google",
            json!({
                "thinking_config": {
                    "thinking_budget": budget,
                    "include_thoughts": enable
                }
            }),
        )),
        _ => None,
    };

    if let Some((name, value)) = field {
        fields.insert(name.to_string(), value);
    } else {
        debug!("No thinking switch known for host {host}");
    }
    fields
}
