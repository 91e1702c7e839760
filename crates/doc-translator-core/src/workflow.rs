//! Read → (convert) → translate → export.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::agent::{AgentClient, ChatBackend, ProgressFn, RetryBudget, TokenUsage, blocking};
use crate::cache::ConvertCache;
use crate::config::AppConfig;
use crate::converter::{Conversion, Converter, CsvToXlsxConverter, IdentityConverter, converter_for, xlsx_to_csv};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::exporter;
use crate::formats::{FormatKind, FormatTranslator};
use crate::util;

pub const DEFAULT_OUTPUT_DIR: &str = "./output";

pub const GLOSSARY_ATTACHMENT: &str = "glossary";
pub const MD_CACHED_ATTACHMENT: &str = "md_cached";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Created,
    Read,
    /// Converted to markdown (or another natively handled format)
    Converted,
    Translated,
}

/// One document's trip through the translation pipeline.
///
/// The original document is never modified; every translate run starts from
/// a copy of it, with a fresh retry budget.
pub struct Workflow {
    config: AppConfig,
    converter: Arc<dyn Converter>,
    cache: Arc<ConvertCache>,
    backend: Option<Arc<dyn ChatBackend>>,
    progress: Option<ProgressFn>,
    state: WorkflowState,
    original: Option<Document>,
    translated: Option<(FormatKind, Document)>,
    attachments: BTreeMap<String, Document>,
    usage: TokenUsage,
}

impl Workflow {
    pub fn new(config: AppConfig, converter: Arc<dyn Converter>, cache: Arc<ConvertCache>) -> Self {
        Self {
            config,
            converter,
            cache,
            backend: None,
            progress: None,
            state: WorkflowState::Created,
            original: None,
            translated: None,
            attachments: BTreeMap::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Workflow using the configured converter engine and a private cache
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let converter = converter_for(&config.convert_engine)?;
        let cache = Arc::new(ConvertCache::from_config(&config.cache));
        Ok(Self::new(config, converter, cache))
    }

    /// Use `backend` instead of the OpenAI-compatible HTTP backend
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Report `(completed, total)` for every batch of requests
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn state(&self) -> WorkflowState {
        self.state
    }

    pub const fn original(&self) -> Option<&Document> {
        self.original.as_ref()
    }

    /// Token usage of the last translate run
    pub const fn usage(&self) -> TokenUsage {
        self.usage
    }

    // ==========================================================================
    // Input
    // ==========================================================================

    pub fn read_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let document = Document::from_path(path)?;
        self.read_document(document);
        Ok(())
    }

    pub fn read_bytes(&mut self, content: impl Into<Bytes>, stem: &str, suffix: &str) -> Result<()> {
        self.read_document(Document::from_bytes(content, suffix, Some(stem.to_string())));
        Ok(())
    }

    fn read_document(&mut self, document: Document) {
        debug!(
            "Read {} ({} bytes)",
            document.name().unwrap_or_else(|| document.suffix().to_string()),
            document.content().len()
        );
        self.original = Some(document);
        self.translated = None;
        self.attachments.clear();
        self.state = WorkflowState::Read;
    }

    // ==========================================================================
    // Translation
    // ==========================================================================

    fn agent(&self, budget: Arc<RetryBudget>) -> Result<AgentClient> {
        let agent_config = self.config.agent.clone();
        let agent = match &self.backend {
            Some(backend) => AgentClient::new(Arc::clone(backend), agent_config, budget),
            None => AgentClient::from_config(agent_config, budget)?,
        };
        Ok(match &self.progress {
            Some(progress) => agent.with_progress(Arc::clone(progress)),
            None => agent,
        })
    }

    /// Run `converter` through the conversion cache
    async fn convert(&mut self, converter: &dyn Converter, document: &Document) -> Result<Document> {
        let engine = converter.engine().to_string();
        let config_hash = converter.config_hash();

        let conversion = if let Some(hit) = self.cache.get(document, &engine, &config_hash)? {
            info!("Using cached {} conversion", engine);
            self.attachments
                .insert(MD_CACHED_ATTACHMENT.to_string(), hit.document.clone());
            hit
        } else {
            info!("Converting {} document with {}", document.suffix(), engine);
            let conversion: Conversion = converter.convert(document).await?;
            self.cache.put(document, &engine, &config_hash, conversion.clone())?;
            conversion
        };

        for (id, attachment) in conversion.attachments {
            self.attachments.insert(id, attachment);
        }
        self.state = WorkflowState::Converted;
        Ok(conversion.document)
    }

    /// Pick the translator for `document`, converting first when the suffix
    /// has no native translator
    async fn prepare(&mut self, document: Document) -> Result<(FormatKind, Document)> {
        if document.suffix() == ".csv" {
            let converted = self.convert(&CsvToXlsxConverter, &document).await?;
            return Ok((FormatKind::Xlsx, converted));
        }
        match FormatKind::from_suffix(document.suffix()) {
            Some(FormatKind::Markdown) => {
                let converted = self.convert(&IdentityConverter, &document).await?;
                Ok((FormatKind::Markdown, converted))
            }
            Some(kind) => Ok((kind, document)),
            None => {
                let converter = Arc::clone(&self.converter);
                let converted = self.convert(converter.as_ref(), &document).await?;
                let kind = FormatKind::from_suffix(converted.suffix())
                    .ok_or_else(|| Error::UnsupportedFormat(converted.suffix().to_string()))?;
                Ok((kind, converted))
            }
        }
    }

    /// Translate the document that was read; running it again overwrites the
    /// previous translation
    pub async fn translate_async(&mut self) -> Result<()> {
        let original = self.original.clone().ok_or(Error::NotRead)?;
        let (kind, input) = self.prepare(original).await?;

        let budget = Arc::new(RetryBudget::new(self.config.agent.max_total_retries));
        let agent = Arc::new(self.agent(budget)?);
        let translator = FormatTranslator::new(Arc::clone(&agent), self.config.clone());

        info!("Translating {} document into {}", kind, self.config.to_lang);
        let outcome = translator.translate_kind(kind, &input).await?;

        self.attachments.remove(GLOSSARY_ATTACHMENT);
        if self.config.glossary.enabled
            && let Some(glossary) = outcome.glossary
        {
            info!("Generated glossary with {} entries", glossary.len());
            self.attachments
                .insert(GLOSSARY_ATTACHMENT.to_string(), glossary.to_csv_document(None)?);
        }

        self.usage = agent.usage();
        self.translated = Some((kind, outcome.document));
        self.state = WorkflowState::Translated;
        Ok(())
    }

    /// Blocking variant of [`translate_async`](Self::translate_async).
    /// Must not be called from inside a tokio runtime.
    pub fn translate(&mut self) -> Result<()> {
        let workers = self.config.agent.concurrent;
        blocking::block_on(workers, self.translate_async())?
    }

    // ==========================================================================
    // Output
    // ==========================================================================

    pub fn translated(&self) -> Result<&Document> {
        self.translated.as_ref().map(|(_, doc)| doc).ok_or(Error::NotTranslated)
    }

    pub fn translated_kind(&self) -> Result<FormatKind> {
        self.translated.as_ref().map(|(kind, _)| *kind).ok_or(Error::NotTranslated)
    }

    fn translated_as(&self, wanted: FormatKind, to: &str) -> Result<&Document> {
        let (kind, document) = self.translated.as_ref().ok_or(Error::NotTranslated)?;
        if *kind != wanted {
            return Err(Error::UnsupportedExport {
                from: kind.to_string(),
                to: to.to_string(),
            });
        }
        Ok(document)
    }

    fn export_text(&self, kind: FormatKind) -> Result<String> {
        self.translated_as(kind, kind.name())?.text()
    }

    pub fn export_to_markdown(&self) -> Result<String> {
        self.export_text(FormatKind::Markdown)
    }

    pub fn export_to_txt(&self) -> Result<String> {
        self.export_text(FormatKind::Txt)
    }

    pub fn export_to_srt(&self) -> Result<String> {
        self.export_text(FormatKind::Srt)
    }

    pub fn export_to_json(&self) -> Result<String> {
        self.export_text(FormatKind::Json)
    }

    /// Standalone HTML page of the translated document, whatever its format
    pub fn export_to_html(&self) -> Result<String> {
        let (kind, document) = self.translated.as_ref().ok_or(Error::NotTranslated)?;
        exporter::to_html(*kind, document)
    }

    /// Translated markdown zipped with its embedded images as files
    pub fn export_to_mdzip(&self) -> Result<Bytes> {
        let markdown = self.translated_as(FormatKind::Markdown, "mdzip")?.text()?;
        exporter::to_mdzip(&markdown, &self.output_name(None, ".md"))
    }

    pub fn export_to_xlsx(&self) -> Result<Bytes> {
        Ok(self.translated_as(FormatKind::Xlsx, "xlsx")?.content().clone())
    }

    pub fn export_to_docx(&self) -> Result<Bytes> {
        Ok(self.translated_as(FormatKind::Docx, "docx")?.content().clone())
    }

    pub fn export_to_epub(&self) -> Result<Bytes> {
        Ok(self.translated_as(FormatKind::Epub, "epub")?.content().clone())
    }

    /// First sheet of a translated workbook as CSV
    pub fn export_to_csv(&self) -> Result<String> {
        xlsx_to_csv(self.translated_as(FormatKind::Xlsx, "csv")?)
    }

    fn output_name(&self, name: Option<&str>, suffix: &str) -> String {
        name.map_or_else(
            || {
                let stem = self
                    .original
                    .as_ref()
                    .and_then(Document::stem)
                    .unwrap_or("output");
                format!("{stem}{suffix}")
            },
            ToString::to_string,
        )
    }

    fn save(&self, content: &[u8], suffix: &str, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        let name = self.output_name(name, suffix);
        let dir = output_dir.unwrap_or_else(|| Path::new(DEFAULT_OUTPUT_DIR));
        let path = util::write_output(dir, &name, content)?;
        info!("Saved {}", path.display());
        Ok(path)
    }

    pub fn save_as_markdown(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(self.export_to_markdown()?.as_bytes(), ".md", name, output_dir)
    }

    pub fn save_as_txt(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(self.export_to_txt()?.as_bytes(), ".txt", name, output_dir)
    }

    pub fn save_as_srt(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(self.export_to_srt()?.as_bytes(), ".srt", name, output_dir)
    }

    pub fn save_as_json(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(self.export_to_json()?.as_bytes(), ".json", name, output_dir)
    }

    pub fn save_as_html(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(self.export_to_html()?.as_bytes(), ".html", name, output_dir)
    }

    pub fn save_as_mdzip(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(&self.export_to_mdzip()?, ".zip", name, output_dir)
    }

    pub fn save_as_xlsx(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(&self.export_to_xlsx()?, ".xlsx", name, output_dir)
    }

    pub fn save_as_docx(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(&self.export_to_docx()?, ".docx", name, output_dir)
    }

    pub fn save_as_epub(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(&self.export_to_epub()?, ".epub", name, output_dir)
    }

    pub fn save_as_csv(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        self.save(self.export_to_csv()?.as_bytes(), ".csv", name, output_dir)
    }

    /// Save in the translated document's own format; `.csv` input is saved as CSV again
    pub fn save_translated(&self, name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
        let kind = self.translated_kind()?;
        let csv_input = self.original.as_ref().is_some_and(|doc| doc.suffix() == ".csv");
        if csv_input && kind == FormatKind::Xlsx {
            return self.save_as_csv(name, output_dir);
        }
        let document = self.translated()?;
        self.save(document.content(), kind.suffix(), name, output_dir)
    }

    // ==========================================================================
    // Attachments
    // ==========================================================================

    pub fn attachment(&self, id: &str) -> Option<&Document> {
        self.attachments.get(id)
    }

    pub fn attachments(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.attachments.iter().map(|(id, doc)| (id.as_str(), doc))
    }

    /// CSV text (`src,dst` header) of the glossary generated by the last run
    pub fn glossary_csv(&self) -> Option<String> {
        self.attachment(GLOSSARY_ATTACHMENT).and_then(|doc| doc.text().ok())
    }

    /// Write an attachment under its own name into `output_dir`
    pub fn save_attachment(&self, id: &str, output_dir: Option<&Path>) -> Result<Option<PathBuf>> {
        let Some(document) = self.attachment(id) else {
            return Ok(None);
        };
        let name = document.name().unwrap_or_else(|| format!("{id}{}", document.suffix()));
        let dir = output_dir.unwrap_or_else(|| Path::new(DEFAULT_OUTPUT_DIR));
        let path = util::write_output(dir, &name, document.content())?;
        info!("Saved attachment {} to {}", id, path.display());
        Ok(Some(path))
    }
}
