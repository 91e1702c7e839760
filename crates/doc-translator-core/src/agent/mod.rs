//! Bounded-concurrency chat-completion client.
//!
//! [`AgentClient`] owns the concurrency gate and the retry policy; the actual
//! HTTP call sits behind the [`ChatBackend`] seam so tests can script replies.

mod backend;
mod budget;
pub mod blocking;
mod openai;

pub use backend::{BackendInfo, ChatBackend, ChatReply, ChatRequest, Message, TokenUsage, UsageCounter};
pub use budget::RetryBudget;
pub use openai::{OpenAiBackend, parse_reply, thinking_fields};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::error::{Error, Result};

/// Called with `(completed, total)` after every finished request of a batch
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Rewrites the system prompt for one prompt of a batch: `(system_prompt, prompt) -> system_prompt`
pub type PromptHook = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

pub struct AgentClient {
    backend: Arc<dyn ChatBackend>,
    config: AgentConfig,
    gate: Arc<Semaphore>,
    budget: Arc<RetryBudget>,
    usage: UsageCounter,
    progress: Option<ProgressFn>,
}

impl AgentClient {
    pub fn new(backend: Arc<dyn ChatBackend>, config: AgentConfig, budget: Arc<RetryBudget>) -> Self {
        let permits = config.concurrent.max(1);
        Self {
            backend,
            config,
            gate: Arc::new(Semaphore::new(permits)),
            budget,
            usage: UsageCounter::default(),
            progress: None,
        }
    }

    /// Client talking to the configured OpenAI-compatible endpoint
    pub fn from_config(config: AgentConfig, budget: Arc<RetryBudget>) -> Result<Self> {
        let backend = Arc::new(OpenAiBackend::new(&config)?);
        Ok(Self::new(backend, config, budget))
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn budget(&self) -> &Arc<RetryBudget> {
        &self.budget
    }

    pub fn backend_info(&self) -> BackendInfo {
        self.backend.info()
    }

    /// Usage totals over every reply received so far
    pub fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    fn build_request(&self, prompt: &str, system_prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model_id.clone(),
            messages: vec![Message::system(system_prompt), Message::user(prompt)],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            extra: thinking_fields(&self.config.base_url, self.config.thinking),
        }
    }

    /// Send one prompt.
    ///
    /// Transport failures are retried while both the per-call allowance and the
    /// shared budget last; after that the reply is an empty string. HTTP status
    /// and response shape errors are returned at once.
    pub async fn send(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Ok(prompt.to_string());
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::Transport(format!("concurrency gate closed: {e}")))?;

        let request = self.build_request(prompt, system_prompt);
        let mut retries = 0;

        loop {
            match self.backend.complete(&request).await {
                Ok(reply) => {
                    self.usage.add(&reply.usage);
                    return Ok(reply.content);
                }
                Err(Error::Transport(reason)) => {
                    if retries >= self.config.retry {
                        error!("Request failed after {} retries: {}", retries, reason);
                        return Ok(String::new());
                    }
                    if let Err(exhausted) = self.budget.consume() {
                        warn!("Not retrying ({}): {}", reason, exhausted);
                        return Ok(String::new());
                    }
                    retries += 1;
                    warn!("Request failed ({}), retry {}/{}", reason, retries, self.config.retry);
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send every prompt concurrently; replies come back in submission order.
    ///
    /// `hook`, when given, builds the system prompt for each prompt. The first
    /// call-level error aborts the batch.
    pub async fn send_many(
        &self,
        prompts: &[String],
        system_prompt: &str,
        hook: Option<&PromptHook>,
    ) -> Result<Vec<String>> {
        let total = prompts.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        info!(
            "Sending {} requests to {} (model {}, concurrent {}, temperature {})",
            total,
            self.config.base_url,
            self.config.model_id,
            self.config.concurrent,
            self.config.temperature
        );

        let completed = AtomicUsize::new(0);
        let completed = &completed;

        let mut replies: Vec<(usize, String)> = futures::stream::iter(prompts.iter().enumerate())
            .map(|(index, prompt)| {
                let system = hook.map_or_else(|| system_prompt.to_string(), |h| h(system_prompt, prompt));
                async move {
                    let reply = self.send(prompt, &system).await?;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("Completed {}/{}", done, total);
                    if let Some(ref progress) = self.progress {
                        progress(done, total);
                    }
                    Ok::<_, Error>((index, reply))
                }
            })
            .buffer_unordered(self.config.concurrent.max(1))
            .try_collect()
            .await?;

        replies.sort_unstable_by_key(|(index, _)| *index);

        let usage = self.usage.snapshot();
        info!(
            "Token usage: prompt {} (cached {}), completion {} (reasoning {}), total {}",
            usage.prompt_tokens,
            usage.cached_tokens,
            usage.completion_tokens,
            usage.reasoning_tokens,
            usage.total()
        );
        debug!("Retry budget used: {}/{}", self.budget.used(), self.budget.ceiling());

        Ok(replies.into_iter().map(|(_, reply)| reply).collect())
    }
}
