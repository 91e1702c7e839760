//! Per-format translators.
//!
//! Every format except markdown follows the same two-phase protocol: parse the
//! document into an ordered list of texts plus opaque references back into the
//! structure, translate the list through the segment protocol, then write each
//! translation back through its reference and re-serialize.

pub(crate) mod archive;
mod docx;
mod epub;
mod html;
mod json;
mod markdown;
mod markup;
mod srt;
mod txt;
mod xlsx;

pub use docx::DocxFormat;
pub use epub::EpubFormat;
pub use html::HtmlFormat;
pub use json::JsonFormat;
pub use markdown::MarkdownTranslator;
pub use srt::{SrtEntry, SrtFormat, parse_srt};
pub use txt::TxtFormat;
pub use xlsx::{CellRegion, XlsxFormat};
pub(crate) use docx::paragraphs as docx_paragraphs;
pub(crate) use epub::chapter_bodies;
pub(crate) use xlsx::{read_workbook, write_workbook};

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::agent::AgentClient;
use crate::config::{AppConfig, InsertMode};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::glossary::{Glossary, GlossaryExtractor};
use crate::segments::SegmentTranslator;

/// How a translation is combined with its original on write-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOptions {
    pub mode: InsertMode,
    /// Placed between original and translation for append/prepend
    pub separator: String,
}

impl InsertOptions {
    pub fn new(mode: InsertMode, separator: impl Into<String>) -> Self {
        Self {
            mode,
            separator: separator.into(),
        }
    }

    pub fn apply(&self, original: &str, translated: &str) -> String {
        match self.mode {
            InsertMode::Replace => translated.to_string(),
            InsertMode::Append => format!("{original}{}{translated}", self.separator),
            InsertMode::Prepend => format!("{translated}{}{original}", self.separator),
        }
    }

    /// Like [`apply`](Self::apply), but both sides are trimmed before joining
    pub fn apply_trimmed(&self, original: &str, translated: &str) -> String {
        match self.mode {
            InsertMode::Replace => translated.to_string(),
            _ => self.apply(original.trim(), translated.trim()),
        }
    }
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self::new(InsertMode::Replace, "\n")
    }
}

/// Texts pulled out of a document, with whatever the format needs to put them back
pub struct Extracted<R> {
    pub refs: R,
    pub segments: Vec<String>,
}

impl<R> Extracted<R> {
    pub const fn new(refs: R, segments: Vec<String>) -> Self {
        Self { refs, segments }
    }
}

/// A document format translated through the segment protocol
pub trait SegmentFormat {
    /// Structural references back into the parsed document
    type Refs;

    fn name(&self) -> &'static str;

    fn pre_translate(&self, document: &Document) -> Result<Extracted<Self::Refs>>;

    /// Write `translated[i]` back for the i-th reference and re-serialize.
    /// `originals` and `translated` always have the same length.
    fn post_translate(
        &self,
        refs: Self::Refs,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes>;
}

/// Formats the workflow can translate, selected by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Markdown,
    Txt,
    Srt,
    Json,
    Xlsx,
    Docx,
    Html,
    Epub,
}

impl FormatKind {
    pub const ALL: [Self; 8] = [
        Self::Markdown,
        Self::Txt,
        Self::Srt,
        Self::Json,
        Self::Xlsx,
        Self::Docx,
        Self::Html,
        Self::Epub,
    ];

    /// Registry lookup; `suffix` may be given with or without the leading dot
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.trim_start_matches('.').to_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Txt),
            "srt" => Some(Self::Srt),
            "json" => Some(Self::Json),
            "xlsx" => Some(Self::Xlsx),
            "docx" => Some(Self::Docx),
            "html" | "htm" => Some(Self::Html),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Txt => "txt",
            Self::Srt => "srt",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
            Self::Docx => "docx",
            Self::Html => "html",
            Self::Epub => "epub",
        }
    }

    /// Canonical suffix of exported documents
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Markdown => ".md",
            Self::Txt => ".txt",
            Self::Srt => ".srt",
            Self::Json => ".json",
            Self::Xlsx => ".xlsx",
            Self::Docx => ".docx",
            Self::Html => ".html",
            Self::Epub => ".epub",
        }
    }

    pub const fn default_separator(self) -> &'static str {
        match self {
            Self::Html => " ",
            _ => "\n",
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of translating one document
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub document: Document,
    /// Glossary that was generated during this run, if generation was enabled
    pub glossary: Option<Glossary>,
}

/// Runs format translators against one agent and configuration
pub struct FormatTranslator {
    agent: Arc<AgentClient>,
    config: AppConfig,
}

impl FormatTranslator {
    pub const fn new(agent: Arc<AgentClient>, config: AppConfig) -> Self {
        Self { agent, config }
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn agent(&self) -> &Arc<AgentClient> {
        &self.agent
    }

    pub fn insert_options(&self, kind: FormatKind) -> InsertOptions {
        let separator = self
            .config
            .separator
            .clone()
            .unwrap_or_else(|| kind.default_separator().to_string());
        InsertOptions::new(self.config.insert_mode, separator)
    }

    /// Returns the glossary to inject (configured entries, extended with terms
    /// extracted from `segments` when generation is enabled; configured entries
    /// win) and the extracted glossary on its own.
    pub(crate) async fn prepare_glossary(&self, segments: &[String]) -> Result<(Option<Glossary>, Option<Glossary>)> {
        let mut glossary = Glossary::from_config(&self.config.glossary.entries);
        let mut generated = None;

        if self.config.glossary.enabled {
            let extractor = GlossaryExtractor::new(Arc::clone(&self.agent), &self.config.to_lang);
            let extracted = extractor.extract(segments, self.config.chunk_size).await?;
            glossary.merge(&extracted);
            generated = Some(extracted);
        }

        let active = (!glossary.is_empty()).then_some(glossary);
        Ok((active, generated))
    }

    /// Translate `document` with the translator registered for `kind`
    pub async fn translate_kind(&self, kind: FormatKind, document: &Document) -> Result<TranslationOutcome> {
        let options = self.insert_options(kind);
        match kind {
            FormatKind::Markdown => {
                MarkdownTranslator::new(self)
                    .translate(document, &options)
                    .await
            }
            FormatKind::Txt => self.translate(&TxtFormat, document, &options).await,
            FormatKind::Srt => self.translate(&SrtFormat, document, &options).await,
            FormatKind::Json => {
                let format = JsonFormat::new(&self.config.json_paths)?;
                self.translate(&format, document, &options).await
            }
            FormatKind::Xlsx => {
                let format = XlsxFormat::new(&self.config.translate_regions);
                self.translate(&format, document, &options).await
            }
            FormatKind::Docx => self.translate(&DocxFormat, document, &options).await,
            FormatKind::Html => self.translate(&HtmlFormat, document, &options).await,
            FormatKind::Epub => self.translate(&EpubFormat, document, &options).await,
        }
    }

    /// Drive one segment format end to end
    pub async fn translate<F: SegmentFormat>(
        &self,
        format: &F,
        document: &Document,
        options: &InsertOptions,
    ) -> Result<TranslationOutcome> {
        let Extracted { refs, segments } = format.pre_translate(document)?;

        if segments.is_empty() {
            info!("No translatable text found in {} document", format.name());
            return Ok(TranslationOutcome {
                document: document.clone(),
                glossary: None,
            });
        }
        debug!("Extracted {} segments from {} document", segments.len(), format.name());

        let (glossary, generated) = self.prepare_glossary(&segments).await?;

        let translator = SegmentTranslator::new(
            Arc::clone(&self.agent),
            &self.config.to_lang,
            self.config.custom_prompt.as_deref(),
        )
        .with_glossary(glossary);

        let translated = translator.translate(&segments, self.config.chunk_size).await?;
        if translated.len() != segments.len() {
            return Err(Error::StructuralMismatch {
                expected: segments.len(),
                actual: translated.len(),
            });
        }

        let content = format.post_translate(refs, &segments, &translated, options)?;
        info!("Translated {} document ({} segments)", format.name(), segments.len());

        Ok(TranslationOutcome {
            document: document.with_content(content),
            glossary: generated,
        })
    }
}
