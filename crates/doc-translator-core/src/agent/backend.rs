use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Information about a chat backend
#[derive(Debug, Clone)]
pub struct BackendInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether this backend requires an API key
    pub requires_api_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Body of an OpenAI-compatible `/chat/completions` request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub top_p: f32,
    /// Provider-specific fields merged into the top-level body
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    pub fn system_prompt(&self) -> &str {
        self.message("system")
    }

    pub fn user_prompt(&self) -> &str {
        self.message("user")
    }

    fn message(&self, role: &str) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map_or("", |m| m.content.as_str())
    }
}

/// Token accounting reported by one reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub cached_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
}

impl TokenUsage {
    pub const fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Read the optional `usage` object; providers disagree on where the
    /// cached and reasoning counts live, so several spellings are accepted.
    pub fn from_response(body: &Value) -> Self {
        let Some(usage) = body.get("usage") else {
            return Self::default();
        };
        let number = |pointer: &str| usage.pointer(pointer).and_then(Value::as_u64);

        Self {
            prompt_tokens: number("/prompt_tokens").unwrap_or(0),
            completion_tokens: number("/completion_tokens").unwrap_or(0),
            cached_tokens: number("/input_tokens_details/cached_tokens")
                .or_else(|| number("/prompt_tokens_details/cached_tokens"))
                .or_else(|| number("/prompt_cache_hit_tokens"))
                .unwrap_or(0),
            reasoning_tokens: number("/output_tokens_details/reasoning_tokens")
                .or_else(|| number("/completion_tokens_details/reasoning_tokens"))
                .unwrap_or(0),
        }
    }
}

/// Running usage totals, shared by concurrent calls
#[derive(Debug, Default)]
pub struct UsageCounter {
    prompt: AtomicU64,
    cached: AtomicU64,
    completion: AtomicU64,
    reasoning: AtomicU64,
}

impl UsageCounter {
    pub fn add(&self, usage: &TokenUsage) {
        self.prompt.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.cached.fetch_add(usage.cached_tokens, Ordering::Relaxed);
        self.completion.fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.reasoning.fetch_add(usage.reasoning_tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt.load(Ordering::Relaxed),
            cached_tokens: self.cached.load(Ordering::Relaxed),
            completion_tokens: self.completion.load(Ordering::Relaxed),
            reasoning_tokens: self.reasoning.load(Ordering::Relaxed),
        }
    }
}

/// A model reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenUsage,
}

impl ChatReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), usage: TokenUsage::default() }
    }
}

/// Transport for one chat-completion call.
///
/// Implementations make exactly one attempt and classify failures as
/// `Error::Transport`, `Error::HttpStatus` or `Error::ResponseShape`;
/// retrying is the caller's business.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get information about this backend
    fn info(&self) -> BackendInfo;

    /// Get the backend name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;
}
