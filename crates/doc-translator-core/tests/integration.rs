//! Integration tests for doc-translator-core
//!
//! These tests verify the end-to-end workflow:
//! - Segment batching and reply merging against a mock backend
//! - Retry budget accounting across concurrent calls
//! - Read → translate → export for every format, zip-based ones built in memory
//! - Glossary generation reaching the segment and markdown prompts
//! - Glossary attachment and conversion cache

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use doc_translator_core::agent::BackendInfo;
use doc_translator_core::{
    AgentClient, AgentConfig, AppConfig, ChatBackend, ChatReply, ChatRequest, ConvertCache, Document, Error,
    IdentityConverter, InsertMode, Result, RetryBudget, SegmentTranslator, Workflow, WorkflowState,
};
use serde_json::{Map, Value};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

// =============================================================================
// Mock Backend for Testing
// =============================================================================

/// A mock model that answers from a fixed dictionary without network calls.
///
/// Segment prompts get the JSON protocol back, markdown prompts get the
/// dictionary applied line by line, glossary prompts get `glossary_reply`.
struct DictionaryBackend {
    words: HashMap<&'static str, &'static str>,
    glossary_reply: String,
    calls: AtomicUsize,
}

impl DictionaryBackend {
    fn new() -> Self {
        let words = HashMap::from([
            ("hello", "你好"),
            ("world", "世界"),
            ("Hello world", "你好世界"),
            ("Good morning", "早上好"),
            ("See you", "再见"),
            ("# Title", "# 标题"),
            ("Paris is nice.", "巴黎很好。"),
        ]);
        Self {
            words,
            glossary_reply: r#"[{"src": "Paris", "dst": "巴黎"}]"#.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn word(&self, text: &str) -> String {
        self.words
            .get(text)
            .map_or_else(|| format!("<{text}>"), ToString::to_string)
    }

    fn translate_segments(&self, prompt: &str) -> String {
        let Ok(Value::Object(segments)) = serde_json::from_str::<Value>(prompt) else {
            return "not json".to_string();
        };
        let reply: Map<String, Value> = segments
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => Value::String(self.word(&text)),
                    other => other,
                };
                (key, value)
            })
            .collect();
        Value::Object(reply).to_string()
    }

    fn translate_markdown(&self, prompt: &str) -> String {
        prompt
            .lines()
            .map(|line| if line.trim().is_empty() { line.to_string() } else { self.word(line) })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ChatBackend for DictionaryBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "dictionary",
            requires_api_key: false,
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = request.system_prompt();
        let prompt = request.user_prompt();

        let content = if system.contains("glossary extractor") {
            self.glossary_reply.clone()
        } else if system.contains("Translate the input markdown text") {
            self.translate_markdown(prompt)
        } else {
            self.translate_segments(prompt)
        };
        Ok(ChatReply::new(content))
    }
}

/// A backend that always replies with the same text
struct FixedBackend(&'static str);

#[async_trait]
impl ChatBackend for FixedBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "fixed",
            requires_api_key: false,
        }
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatReply> {
        Ok(ChatReply::new(self.0))
    }
}

/// Answers like [`DictionaryBackend`] and keeps every system prompt it was sent
struct RecordingBackend {
    inner: DictionaryBackend,
    system_prompts: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn new() -> Self {
        Self {
            inner: DictionaryBackend::new(),
            system_prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts_with(&self, marker: &str) -> Vec<String> {
        self.system_prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|prompt| prompt.contains(marker))
            .cloned()
            .collect()
    }

    /// System prompts of translation requests (not glossary extraction),
    /// split into (segment prompts, markdown prompts)
    fn translation_prompts(&self) -> (Vec<String>, Vec<String>) {
        self.system_prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|prompt| !prompt.contains("glossary extractor"))
            .cloned()
            .partition(|prompt| !prompt.contains("Translate the input markdown text"))
    }
}

#[async_trait]
impl ChatBackend for RecordingBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "recording",
            requires_api_key: false,
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.system_prompts
            .lock()
            .unwrap()
            .push(request.system_prompt().to_string());
        self.inner.complete(request).await
    }
}

/// Hands every prompt back unchanged, so every segment "translates" to itself
struct EchoBackend;

#[async_trait]
impl ChatBackend for EchoBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "echo",
            requires_api_key: false,
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        Ok(ChatReply::new(request.user_prompt()))
    }
}

/// A backend whose connection always drops
struct UnreachableBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatBackend for UnreachableBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "unreachable",
            requires_api_key: false,
        }
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Transport("connection reset".to_string()))
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

fn agent_config() -> AgentConfig {
    AgentConfig {
        retry_delay_ms: 1,
        concurrent: 4,
        ..AgentConfig::default()
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        agent: agent_config(),
        ..AppConfig::default()
    }
}

fn agent(backend: Arc<dyn ChatBackend>, ceiling: usize) -> Arc<AgentClient> {
    Arc::new(AgentClient::new(backend, agent_config(), Arc::new(RetryBudget::new(ceiling))))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn workflow(config: AppConfig, backend: Arc<dyn ChatBackend>) -> Workflow {
    Workflow::new(config, Arc::new(IdentityConverter), Arc::new(ConvertCache::new(4))).with_backend(backend)
}

fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn zip_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

fn zip_text(bytes: &[u8], name: &str) -> String {
    String::from_utf8(zip_entry(bytes, name)).unwrap()
}

fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t>Paris is nice.</w:t></w:r></w:p></w:body></w:document>"#;

fn docx_fixture() -> Vec<u8> {
    zip_of(&[
        ("[Content_Types].xml", "<Types/>"),
        ("word/document.xml", DOCUMENT_XML),
    ])
}

fn xlsx_fixture() -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut("A1").set_value_string("hello");
    sheet.get_cell_mut("B1").set_value_string("world");
    sheet.get_cell_mut("A2").set_value_number(42);
    let mut out = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut out).unwrap();
    out.into_inner()
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#;

const PACKAGE_OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0"><manifest><item id="c1" href="chapter.xhtml" media-type="application/xhtml+xml"/></manifest><spine><itemref idref="c1"/></spine></package>"#;

const CHAPTER_XHTML: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Chapter</title></head><body><h1>hello</h1><p>Caf&eacute; &amp; bar</p><p>Hello world</p></body></html>"#;

fn epub_fixture() -> Vec<u8> {
    zip_of(&[
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", PACKAGE_OPF),
        ("OEBPS/chapter.xhtml", CHAPTER_XHTML),
    ])
}

// =============================================================================
// Segment Translation Tests
// =============================================================================

#[tokio::test]
async fn test_segments_translated_in_order() {
    let translator = SegmentTranslator::new(agent(Arc::new(DictionaryBackend::new()), 10), "中文", None);

    let result = translator.translate(&strings(&["hello", "world"]), 3000).await.unwrap();
    assert_eq!(result, strings(&["你好", "世界"]));
}

#[tokio::test]
async fn test_many_small_chunks_keep_order() {
    let backend = Arc::new(DictionaryBackend::new());
    let translator = SegmentTranslator::new(agent(backend.clone(), 10), "中文", None);

    let segments: Vec<String> = (0..30).map(|i| format!("line {i}")).collect();
    let result = translator.translate(&segments, 40).await.unwrap();

    let expected: Vec<String> = segments.iter().map(|s| format!("<{s}>")).collect();
    assert_eq!(result, expected);
    assert!(backend.calls.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_unparsable_reply_keeps_originals() {
    let translator = SegmentTranslator::new(agent(Arc::new(FixedBackend("I cannot help with that")), 10), "中文", None);

    let result = translator.translate(&strings(&["hello", "world"]), 3000).await.unwrap();
    assert_eq!(result, strings(&["hello", "world"]));
}

#[tokio::test]
async fn test_partial_reply_falls_back_per_key() {
    let translator = SegmentTranslator::new(agent(Arc::new(FixedBackend(r#"{"0":"你好"}"#)), 10), "中文", None);

    let result = translator.translate(&strings(&["hello", "world"]), 3000).await.unwrap();
    assert_eq!(result, strings(&["你好", "world"]));
}

#[tokio::test]
async fn test_fenced_reply_is_accepted() {
    let reply = "```json\n{\"0\": \"你好\", \"1\": \"世界\",}\n```";
    let translator = SegmentTranslator::new(agent(Arc::new(FixedBackend(reply)), 10), "中文", None);

    let result = translator.translate(&strings(&["hello", "world"]), 3000).await.unwrap();
    assert_eq!(result, strings(&["你好", "世界"]));
}

#[tokio::test]
async fn test_retry_budget_shared_across_chunks() {
    let backend = Arc::new(UnreachableBackend {
        calls: AtomicUsize::new(0),
    });
    let client = agent(backend.clone(), 1);
    let translator = SegmentTranslator::new(Arc::clone(&client), "中文", None);

    // Each segment lands in its own chunk.
    let segments = strings(&["aaaa", "bbbb", "cccc"]);
    let result = translator.translate(&segments, 16).await.unwrap();

    assert_eq!(result, segments);
    // Three first attempts plus the single retry the budget allows.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    assert!(client.budget().is_exhausted());
}

// =============================================================================
// Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_workflow_txt() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("\u{feff}Good morning\n\nSee you\n", "notes", ".txt").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.state(), WorkflowState::Translated);
    assert_eq!(wf.export_to_txt().unwrap(), "早上好\n\n再见\n");
    assert!(matches!(wf.export_to_json(), Err(Error::UnsupportedExport { .. })));
}

#[tokio::test]
async fn test_workflow_txt_append_mode() {
    let config = AppConfig {
        insert_mode: InsertMode::Append,
        ..test_config()
    };
    let mut wf = workflow(config, Arc::new(DictionaryBackend::new()));
    wf.read_bytes("Good morning\n", "notes", ".txt").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.export_to_txt().unwrap(), "Good morning\n早上好\n");
}

#[tokio::test]
async fn test_workflow_json() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(r#"{"greeting": "hello", "count": 3, "nested": ["world"]}"#, "data", ".json")
        .unwrap();
    wf.translate_async().await.unwrap();

    let value: Value = serde_json::from_str(&wf.export_to_json().unwrap()).unwrap();
    assert_eq!(value["greeting"], "你好");
    assert_eq!(value["count"], 3);
    assert_eq!(value["nested"][0], "世界");
}

#[tokio::test]
async fn test_workflow_srt() {
    let srt = "1\n00:00:01,000 --> 00:00:02,000\nhello\n\n2\n00:00:03,000 --> 00:00:04,000\nworld\n";
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(srt, "movie", ".srt").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(
        wf.export_to_srt().unwrap(),
        "1\n00:00:01,000 --> 00:00:02,000\n你好\n\n2\n00:00:03,000 --> 00:00:04,000\n世界\n\n"
    );
}

#[tokio::test]
async fn test_workflow_markdown_masks_links() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("# Title\n\n[hello](https://example.com/a)\n", "readme", ".md")
        .unwrap();
    wf.translate_async().await.unwrap();

    let out = wf.export_to_markdown().unwrap();
    assert!(out.starts_with("# 标题\n\n"));
    // The link target never reached the model and comes back untouched.
    assert!(out.contains("(https://example.com/a)"));
}

#[tokio::test]
async fn test_workflow_glossary_attachment() {
    let mut config = test_config();
    config.glossary.enabled = true;

    let mut wf = workflow(config, Arc::new(DictionaryBackend::new()));
    wf.read_bytes("Paris is nice.\n", "trip", ".txt").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.export_to_txt().unwrap(), "巴黎很好。\n");
    let csv = wf.glossary_csv().unwrap();
    assert!(csv.starts_with('\u{feff}'));
    assert!(csv.contains("src,dst"));
    assert!(csv.contains("Paris,巴黎"));
}

#[tokio::test]
async fn test_workflow_without_glossary_has_no_attachment() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("hello\n", "a", ".txt").unwrap();
    wf.translate_async().await.unwrap();

    assert!(wf.glossary_csv().is_none());
}

#[tokio::test]
async fn test_workflow_state_errors() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    assert!(matches!(wf.translate_async().await, Err(Error::NotRead)));

    wf.read_bytes("hello", "a", ".txt").unwrap();
    assert!(matches!(wf.export_to_txt(), Err(Error::NotTranslated)));
}

#[tokio::test]
async fn test_workflow_does_not_modify_original() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("hello\n", "a", ".txt").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.original().unwrap().content().as_ref(), b"hello\n");
    assert_eq!(wf.export_to_txt().unwrap(), "你好\n");
}

#[tokio::test]
async fn test_workflow_markdown_conversion_is_cached() {
    let cache = Arc::new(ConvertCache::new(4));
    let backend: Arc<dyn ChatBackend> = Arc::new(DictionaryBackend::new());

    let mut first = Workflow::new(test_config(), Arc::new(IdentityConverter), Arc::clone(&cache))
        .with_backend(Arc::clone(&backend));
    first.read_bytes("hello\n", "a", ".md").unwrap();
    first.translate_async().await.unwrap();
    assert!(first.attachment("md_cached").is_none());
    assert_eq!(cache.len(), 1);

    let mut second = Workflow::new(test_config(), Arc::new(IdentityConverter), Arc::clone(&cache))
        .with_backend(backend);
    second.read_bytes("hello\n", "b", ".md").unwrap();
    second.translate_async().await.unwrap();
    assert!(second.attachment("md_cached").is_some());
    assert_eq!(second.export_to_markdown().unwrap(), "你好\n");
}

#[tokio::test]
async fn test_workflow_csv_round_trip() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("hello,world\n", "table", ".csv").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.export_to_csv().unwrap(), "你好,世界\n");
}

#[tokio::test]
async fn test_workflow_save_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("nested/out");

    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("hello\n", "greeting", ".txt").unwrap();
    wf.translate_async().await.unwrap();

    let path = wf.save_as_txt(None, Some(&out_dir)).unwrap();
    assert_eq!(path, out_dir.join("greeting.txt"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "你好\n");

    let renamed = wf.save_translated(Some("custom.txt"), Some(&out_dir)).unwrap();
    assert_eq!(renamed, out_dir.join("custom.txt"));
}

#[tokio::test]
async fn test_workflow_docx() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(docx_fixture(), "report", ".docx").unwrap();
    wf.translate_async().await.unwrap();

    let docx = wf.export_to_docx().unwrap();
    let xml = zip_text(&docx, "word/document.xml");
    assert!(xml.contains(r#"<w:t xml:space="preserve">你好世界</w:t>"#));
    assert!(xml.contains("巴黎很好。"));
    assert!(!xml.contains("Paris is nice."));
    assert_eq!(zip_text(&docx, "[Content_Types].xml"), "<Types/>");

    let html = wf.export_to_html().unwrap();
    assert!(html.contains("<title>report</title>"));
    assert!(html.contains(r#"<h1 class="pre-line">你好世界</h1>"#));
    assert!(html.contains(r#"<p class="pre-line">巴黎很好。</p>"#));
}

#[tokio::test]
async fn test_workflow_xlsx() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(xlsx_fixture(), "sheet", ".xlsx").unwrap();
    wf.translate_async().await.unwrap();

    let xlsx = wf.export_to_xlsx().unwrap();
    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(xlsx.to_vec()), true).unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    assert_eq!(sheet.get_value("A1"), "你好");
    assert_eq!(sheet.get_value("B1"), "世界");
    assert_eq!(sheet.get_value("A2"), "42");

    let html = wf.export_to_html().unwrap();
    assert!(html.contains(r#"<td class="pre-line">你好</td><td class="pre-line">世界</td>"#));
    assert_eq!(wf.export_to_csv().unwrap(), "你好,世界\n42,\n");
}

#[tokio::test]
async fn test_workflow_html() {
    let page = "<html><head><title>hello</title></head><body><p>Hello world</p><img alt=\"world\" src=\"a.png\"><script>var hello = 1;</script></body></html>";
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(page, "index", ".html").unwrap();
    wf.translate_async().await.unwrap();

    let out = wf.export_to_html().unwrap();
    assert!(out.contains("<title>你好</title>"));
    assert!(out.contains("<p>你好世界</p>"));
    assert!(out.contains(r#"alt="世界""#));
    assert!(out.contains("<script>var hello = 1;</script>"));
}

#[tokio::test]
async fn test_workflow_html_unchanged_text_round_trips() {
    let page = "<p>Caf&eacute; &amp; bar</p><p>Tom &amp; Jerry & friends</p><p>It&rsquo;s fine</p>";
    let mut wf = workflow(test_config(), Arc::new(EchoBackend));
    wf.read_bytes(page, "page", ".html").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.translated().unwrap().content().as_ref(), page.as_bytes());
    assert_eq!(wf.export_to_html().unwrap(), page);
}

#[tokio::test]
async fn test_workflow_epub() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(epub_fixture(), "book", ".epub").unwrap();
    wf.translate_async().await.unwrap();

    let epub = wf.export_to_epub().unwrap();
    assert_eq!(zip_names(&epub)[0], "mimetype");
    let chapter = zip_text(&epub, "OEBPS/chapter.xhtml");
    assert!(chapter.contains("<h1>你好</h1>"));
    assert!(chapter.contains("<p>你好世界</p>"));
    assert!(chapter.contains("<title>Chapter</title>"));
    assert!(chapter.contains("&lt;Café &amp; bar&gt;"));

    let html = wf.export_to_html().unwrap();
    assert!(html.contains("<p>你好世界</p>"));
}

#[tokio::test]
async fn test_workflow_epub_unchanged_text_round_trips() {
    let mut wf = workflow(test_config(), Arc::new(EchoBackend));
    wf.read_bytes(epub_fixture(), "book", ".epub").unwrap();
    wf.translate_async().await.unwrap();

    let epub = wf.export_to_epub().unwrap();
    assert_eq!(zip_text(&epub, "OEBPS/chapter.xhtml"), CHAPTER_XHTML);
}

#[tokio::test]
async fn test_workflow_srt_and_json_html_exports() {
    let srt = "1\n00:00:01,000 --> 00:00:02,000\nhello\n";
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(srt, "movie", ".srt").unwrap();
    wf.translate_async().await.unwrap();
    assert!(wf.export_to_html().unwrap().contains(r#"<td class="pre-line">你好</td>"#));

    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes(r#"{"a": "world"}"#, "data", ".json").unwrap();
    wf.translate_async().await.unwrap();
    assert!(wf.export_to_html().unwrap().contains("世界"));
}

#[tokio::test]
async fn test_workflow_markdown_exports() {
    let markdown = "# Title\n\n![logo](data:image/png;base64,UE5H)\n";
    let mut wf = workflow(test_config(), Arc::new(EchoBackend));
    wf.read_bytes(markdown, "doc", ".md").unwrap();
    wf.translate_async().await.unwrap();

    let html = wf.export_to_html().unwrap();
    assert!(html.contains("<h1>Title</h1>"));

    let zip = wf.export_to_mdzip().unwrap();
    let names = zip_names(&zip);
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], "doc.md");
    assert!(names[1].starts_with("images/") && names[1].ends_with(".png"));
    assert_eq!(zip_entry(&zip, &names[1]), b"PNG");
    assert!(zip_text(&zip, "doc.md").contains(&format!("![logo](./{})", names[1])));

    let mut txt = workflow(test_config(), Arc::new(EchoBackend));
    txt.read_bytes("hello", "a", ".txt").unwrap();
    txt.translate_async().await.unwrap();
    assert!(matches!(txt.export_to_mdzip(), Err(Error::UnsupportedExport { .. })));
}

#[tokio::test]
async fn test_glossary_reaches_segment_prompts() {
    let mut config = test_config();
    config.glossary.enabled = true;
    let backend = Arc::new(RecordingBackend::new());

    let mut wf = workflow(config, backend.clone());
    wf.read_bytes(docx_fixture(), "report", ".docx").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(backend.prompts_with("glossary extractor").len(), 1);
    let (segment_prompts, markdown_prompts) = backend.translation_prompts();
    assert!(markdown_prompts.is_empty());
    assert!(!segment_prompts.is_empty());
    for prompt in &segment_prompts {
        assert!(prompt.contains("Here is the reference glossary:"));
        assert!(prompt.contains("Paris=>巴黎"));
    }
    assert!(wf.glossary_csv().unwrap().contains("Paris,巴黎"));
}

#[tokio::test]
async fn test_glossary_reaches_markdown_prompts() {
    let mut config = test_config();
    config.glossary.enabled = true;
    let backend = Arc::new(RecordingBackend::new());

    let mut wf = workflow(config, backend.clone());
    wf.read_bytes("Paris is nice.\n", "trip", ".md").unwrap();
    wf.translate_async().await.unwrap();

    assert_eq!(wf.export_to_markdown().unwrap(), "巴黎很好。\n");
    let (segment_prompts, markdown_prompts) = backend.translation_prompts();
    assert!(segment_prompts.is_empty());
    assert!(!markdown_prompts.is_empty());
    for prompt in &markdown_prompts {
        assert!(prompt.contains("Paris=>巴黎"));
    }
}

#[tokio::test]
async fn test_glossary_disabled_leaves_prompts_clean() {
    let backend = Arc::new(RecordingBackend::new());
    let mut wf = workflow(test_config(), backend.clone());
    wf.read_bytes(docx_fixture(), "report", ".docx").unwrap();
    wf.translate_async().await.unwrap();

    assert!(backend.prompts_with("glossary extractor").is_empty());
    assert!(backend.prompts_with("Here is the reference glossary:").is_empty());
}

#[tokio::test]
async fn test_blocking_translate_inside_runtime_is_refused() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("hello\n", "a", ".txt").unwrap();
    assert!(matches!(wf.translate(), Err(Error::NestedRuntime)));
}

#[test]
fn test_blocking_translate() {
    let mut wf = workflow(test_config(), Arc::new(DictionaryBackend::new()));
    wf.read_bytes("hello\n", "a", ".txt").unwrap();
    wf.translate().unwrap();

    assert_eq!(wf.export_to_txt().unwrap(), "你好\n");
}

// =============================================================================
// Cache Tests
// =============================================================================

#[test]
fn test_cache_evicts_oldest_first() {
    use doc_translator_core::Conversion;

    let cache = ConvertCache::new(2);
    let docs: Vec<Document> = ["a", "b", "c"]
        .iter()
        .map(|text| Document::from_bytes(text.to_string(), ".md", None))
        .collect();

    for doc in &docs {
        cache
            .put(doc, "identity", "", Conversion::new(doc.clone()))
            .unwrap();
    }

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&docs[0], "identity", "").unwrap().is_none());
    assert!(cache.get(&docs[1], "identity", "").unwrap().is_some());
    assert!(cache.get(&docs[2], "identity", "").unwrap().is_some());
}
