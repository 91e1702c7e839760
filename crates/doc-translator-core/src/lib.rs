//! Document Translator Core Library
//!
//! This library translates documents through an OpenAI-compatible chat API
//! while keeping their structure:
//! - Text extraction and write-back for markdown, txt, srt, json, xlsx, docx, html and epub
//! - Size-bounded segment batching with a tolerant JSON reply decoder
//! - Bounded-concurrency requests sharing one retry budget
//! - Glossary extraction and injection
//! - Conversion seam with a FIFO conversion cache
//! - HTML export for every format, and markdown zip bundles

pub mod agent;
pub mod cache;
pub mod config;
pub mod converter;
pub mod document;
pub mod error;
pub mod exporter;
pub mod formats;
pub mod glossary;
pub mod masker;
pub mod segments;
pub mod splitter;
pub mod util;
pub mod workflow;

pub use agent::{AgentClient, ChatBackend, ChatReply, ChatRequest, RetryBudget, TokenUsage};
pub use cache::{CacheKey, ConvertCache};
pub use config::{AgentConfig, AppConfig, InsertMode, ThinkingMode};
pub use converter::{Conversion, Converter, CsvToXlsxConverter, IdentityConverter};
pub use document::Document;
pub use error::{Error, Result};
pub use formats::{FormatKind, FormatTranslator, InsertOptions, TranslationOutcome};
pub use glossary::{Glossary, GlossaryEntry, GlossaryExtractor};
pub use masker::UriMasker;
pub use segments::SegmentTranslator;
pub use splitter::MarkdownBlockSplitter;
pub use workflow::{Workflow, WorkflowState};
