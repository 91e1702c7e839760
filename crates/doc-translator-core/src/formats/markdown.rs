use std::sync::Arc;

use tracing::info;

use super::{FormatTranslator, InsertOptions, TranslationOutcome};
use crate::agent::PromptHook;
use crate::document::Document;
use crate::error::Result;
use crate::masker::UriMasker;
use crate::segments::prompts;
use crate::splitter;

/// Full-width parentheses the model sometimes writes into LaTeX delimiters
fn repair_math_delimiters(text: &str) -> String {
    text.replace("\\（", "\\(").replace("\\）", "\\)")
}

/// Re-attach the original chunk's surrounding whitespace to its translation
fn keep_outer_whitespace(original: &str, translated: &str) -> String {
    let leading = &original[..original.len() - original.trim_start().len()];
    let trailing = &original[original.trim_end().len()..];
    format!("{leading}{}{trailing}", translated.trim())
}

/// Markdown is translated chunk by chunk as plain text, with link and image
/// targets masked for the whole run.
pub struct MarkdownTranslator<'a> {
    inner: &'a FormatTranslator,
}

impl<'a> MarkdownTranslator<'a> {
    pub const fn new(inner: &'a FormatTranslator) -> Self {
        Self { inner }
    }

    /// Markdown is always rewritten in place; insert modes do not apply
    pub async fn translate(&self, document: &Document, _options: &InsertOptions) -> Result<TranslationOutcome> {
        let config = self.inner.config();
        let text = document.text()?;

        let masker = UriMasker::new();
        let masked = masker.mask(&text)?;
        let chunks = splitter::split(&masked, config.chunk_size);

        let pending: Vec<usize> = (0..chunks.len()).filter(|&i| !chunks[i].trim().is_empty()).collect();
        info!("Markdown split into {} chunks ({} to translate)", chunks.len(), pending.len());
        if pending.is_empty() {
            return Ok(TranslationOutcome {
                document: document.clone(),
                glossary: None,
            });
        }

        let prompts_to_send: Vec<String> = pending.iter().map(|&i| chunks[i].clone()).collect();
        let (glossary, generated) = self.inner.prepare_glossary(&prompts_to_send).await?;

        let hook: Option<PromptHook> = glossary.map(|glossary| {
            Arc::new(move |system: &str, prompt: &str| format!("{system}{}", glossary.inject(prompt))) as PromptHook
        });
        let system_prompt = prompts::markdown_prompt(&config.to_lang, config.custom_prompt.as_deref());

        let replies = self
            .inner
            .agent()
            .send_many(&prompts_to_send, &system_prompt, hook.as_ref())
            .await?;

        let mut translated = chunks.clone();
        for (&index, reply) in pending.iter().zip(&replies) {
            if !reply.trim().is_empty() {
                translated[index] = keep_outer_whitespace(&chunks[index], reply);
            }
        }

        let joined = repair_math_delimiters(&translated.concat());
        let content = masker.unmask(&joined)?;
        info!("Translated markdown document ({} chunks)", pending.len());

        Ok(TranslationOutcome {
            document: document.with_content(content.into_bytes()).with_suffix(".md"),
            glossary: generated,
        })
    }
}
