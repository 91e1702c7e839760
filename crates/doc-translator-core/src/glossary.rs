//! Term glossary: extraction through the segment protocol and injection into prompts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentClient;
use crate::config::GlossaryEntryConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::segments::{DecoderChain, pack_segments, prompts};

const DEFAULT_CSV_STEM: &str = "glossary_gen";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub src: String,
    pub dst: String,
}

/// Ordered `src => dst` dictionary; the first entry for a given `src` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

impl Glossary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        let mut glossary = Self::new();
        for (src, dst) in pairs {
            glossary.insert(src, dst);
        }
        glossary
    }

    pub fn from_config(entries: &[GlossaryEntryConfig]) -> Self {
        Self::from_pairs(entries.iter().map(|e| (e.src.clone(), e.dst.clone())))
    }

    /// Add an entry unless `src` is already present; returns whether it was added
    pub fn insert(&mut self, src: impl Into<String>, dst: impl Into<String>) -> bool {
        let src = src.into();
        if src.is_empty() || self.get(&src).is_some() {
            return false;
        }
        self.entries.push(GlossaryEntry { src, dst: dst.into() });
        true
    }

    pub fn get(&self, src: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.src == src)
            .map(|e| e.dst.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlossaryEntry> {
        self.entries.iter()
    }

    /// Add entries from `other` whose `src` is not known yet
    pub fn merge(&mut self, other: &Self) {
        for entry in &other.entries {
            self.insert(entry.src.clone(), entry.dst.clone());
        }
    }

    /// Glossary block for a system prompt, listing only the terms that occur
    /// literally in `text`. Empty when nothing matches.
    pub fn inject(&self, text: &str) -> String {
        let matches: Vec<_> = self
            .entries
            .iter()
            .filter(|e| text.contains(e.src.as_str()))
            .collect();
        if matches.is_empty() {
            return String::new();
        }

        let mut block = String::from("\nHere is the reference glossary:\n");
        for entry in matches {
            block.push_str(&entry.src);
            block.push_str("=>");
            block.push_str(&entry.dst);
            block.push('\n');
        }
        block.push_str("Glossary ends\n");
        block
    }

    /// CSV text with a UTF-8 BOM and a `src,dst` header
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["src", "dst"])
            .map_err(|e| Error::Csv(e.to_string()))?;
        for entry in &self.entries {
            writer
                .write_record([&entry.src, &entry.dst])
                .map_err(|e| Error::Csv(e.to_string()))?;
        }
        let bytes = writer.into_inner().map_err(|e| Error::Csv(e.to_string()))?;
        Ok(format!("\u{feff}{}", String::from_utf8(bytes)?))
    }

    /// CSV export as a document (`glossary_gen.csv` unless a stem is given)
    pub fn to_csv_document(&self, stem: Option<&str>) -> Result<Document> {
        let csv = self.to_csv()?;
        Ok(Document::from_bytes(
            csv.into_bytes(),
            ".csv",
            Some(stem.unwrap_or(DEFAULT_CSV_STEM).to_string()),
        ))
    }

    /// Read a `src,dst` CSV (BOM and header optional)
    pub fn from_csv(text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut glossary = Self::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::Csv(e.to_string()))?;
            let (Some(src), Some(dst)) = (record.get(0), record.get(1)) else {
                continue;
            };
            if row == 0 && src == "src" && dst == "dst" {
                continue;
            }
            glossary.insert(src, dst);
        }
        Ok(glossary)
    }
}

/// Collect `{src, dst}` objects from a decoded reply into `glossary`
fn collect_entries(glossary: &mut Glossary, reply: &Value) -> usize {
    let Some(items) = reply.as_array() else {
        warn!("Glossary reply is not a JSON list; skipped");
        return 0;
    };

    let mut added = 0;
    for item in items {
        let src = item.get("src").and_then(Value::as_str).map(str::trim);
        let dst = item.get("dst").and_then(Value::as_str).map(str::trim);
        let (Some(src), Some(dst)) = (src, dst) else {
            debug!("Skipping glossary item without src/dst: {}", item);
            continue;
        };
        if dst.is_empty() || src.contains("<ph-") {
            continue;
        }
        if glossary.insert(src, dst) {
            added += 1;
        }
    }
    added
}

/// Extracts names and places through the segment protocol
pub struct GlossaryExtractor {
    agent: Arc<AgentClient>,
    system_prompt: String,
    decoder: DecoderChain,
}

impl GlossaryExtractor {
    pub fn new(agent: Arc<AgentClient>, to_lang: &str) -> Self {
        Self {
            agent,
            system_prompt: prompts::glossary_prompt(to_lang),
            decoder: DecoderChain::default(),
        }
    }

    pub async fn extract(&self, segments: &[String], chunk_size: usize) -> Result<Glossary> {
        let mut glossary = Glossary::new();
        if segments.is_empty() {
            return Ok(glossary);
        }

        let packed = pack_segments(segments, chunk_size);
        info!("Extracting glossary from {} chunks", packed.chunks.len());

        let prompts = packed
            .chunks
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Json(e.to_string()))?;

        let replies = self.agent.send_many(&prompts, &self.system_prompt, None).await?;
        for reply in replies.iter().filter(|r| !r.trim().is_empty()) {
            match self.decoder.decode(reply) {
                Ok(value) => {
                    collect_entries(&mut glossary, &value);
                }
                Err(e) => warn!("Glossary chunk skipped: {}", e),
            }
        }

        info!("Glossary extracted with {} entries", glossary.len());
        Ok(glossary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inject_matching_terms() {
        let glossary = Glossary::from_pairs([("Paris", "巴黎")]);
        let block = glossary.inject("I visited Paris");
        assert!(block.contains("Paris=>巴黎"));
        assert!(block.starts_with("\nHere is the reference glossary:\n"));
        assert!(block.ends_with("Glossary ends\n"));
    }

    #[test]
    fn test_inject_no_match_is_empty() {
        let glossary = Glossary::from_pairs([("Paris", "巴黎")]);
        assert_eq!(glossary.inject("I visited Rome"), "");
    }

    #[test]
    fn test_inject_lists_only_matches() {
        let glossary = Glossary::from_pairs([("Paris", "巴黎"), ("Rome", "罗马")]);
        let block = glossary.inject("Rome");
        assert!(block.contains("Rome=>罗马"));
        assert!(!block.contains("Paris"));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let mut glossary = Glossary::from_pairs([("Jobs", "乔布斯"), ("Jobs", "工作")]);
        assert_eq!(glossary.get("Jobs"), Some("乔布斯"));

        glossary.merge(&Glossary::from_pairs([("Jobs", "x"), ("Shanghai", "上海")]));
        assert_eq!(glossary.get("Jobs"), Some("乔布斯"));
        assert_eq!(glossary.len(), 2);
    }

    #[test]
    fn test_csv_has_bom_and_header() {
        let glossary = Glossary::from_pairs([("Bill Gates", "比尔盖茨"), ("a,b", "c")]);
        let csv = glossary.to_csv().unwrap();
        assert!(csv.starts_with("\u{feff}src,dst\n"));
        assert!(csv.contains("Bill Gates,比尔盖茨\n"));
        assert!(csv.contains("\"a,b\",c\n"));

        let back = Glossary::from_csv(&csv).unwrap();
        assert_eq!(back, glossary);
    }

    #[test]
    fn test_csv_document_name() {
        let doc = Glossary::new().to_csv_document(None).unwrap();
        assert_eq!(doc.name().as_deref(), Some("glossary_gen.csv"));
    }

    #[test]
    fn test_collect_entries_skips_bad_items() {
        let mut glossary = Glossary::new();
        let reply = json!([
            {"src": "Jobs", "dst": "乔布斯"},
            {"src": "<ph-abc123>", "dst": "x"},
            {"src": "NoDst"},
            "junk",
            {"src": "Jobs", "dst": "dup"}
        ]);
        assert_eq!(collect_entries(&mut glossary, &reply), 1);
        assert_eq!(glossary.get("Jobs"), Some("乔布斯"));
    }
}
