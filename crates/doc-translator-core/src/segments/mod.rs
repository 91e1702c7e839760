//! Index-keyed segment protocol.
//!
//! A list of texts is sent to the model as JSON objects `{"0": "...", "1": "..."}`
//! bounded by a byte budget, and the replies are merged back by key. A reply
//! that cannot be decoded costs only its own chunk: those keys keep their
//! original text.

mod decoder;
pub mod prompts;

pub use decoder::{DecoderChain, JsonDecoder, LenientDecoder, StrictDecoder};

use std::ops::Range;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::agent::{AgentClient, PromptHook};
use crate::error::{Error, Result};
use crate::glossary::Glossary;

/// Segments split into size-bounded chunks
#[derive(Debug, Clone, Default)]
pub struct PackedSegments {
    /// Every key with its original text, in order
    pub originals: Map<String, Value>,
    pub chunks: Vec<Map<String, Value>>,
    /// Key ranges that were cut out of a single oversized segment
    pub merged: Vec<Range<usize>>,
}

impl PackedSegments {
    /// Rebuild one output per input segment from per-key values
    pub fn reassemble(&self, values: &Map<String, Value>) -> Vec<String> {
        let flat: Vec<String> = values.values().map(value_to_text).collect();
        let mut result = Vec::with_capacity(flat.len());
        let mut last_end = 0;

        for range in &self.merged {
            result.extend_from_slice(&flat[last_end..range.start]);
            result.push(flat[range.clone()].concat());
            last_end = range.end;
        }
        result.extend_from_slice(&flat[last_end..]);
        result
    }
}

fn json_len(text: &str) -> usize {
    serde_json::to_string(text).map_or(text.len() + 2, |s| s.len())
}

/// Serialized size of `"key":"value"` inside an object
fn entry_len(key: &str, value: &str) -> usize {
    json_len(key) + 1 + json_len(value)
}

/// Serialized size of `{key: value}` on its own
fn single_len(key: &str, value: &str) -> usize {
    entry_len(key, value) + 2
}

/// Cut an oversized segment at line boundaries so each piece fits on its own where possible
fn split_segment(segment: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for line in segment.split_inclusive('\n') {
        let mut next = current.clone();
        next.push_str(line);
        if single_len("0", &next) > chunk_size {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            pieces.push(line.to_string());
        } else {
            current = next;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    if pieces.is_empty() {
        pieces.push(String::new());
    }
    pieces
}

/// Assign stringified ordinal keys and pack them into chunks of at most
/// `chunk_size` serialized bytes. A chunk is never empty; one holding a single
/// oversized line may exceed the limit.
pub fn pack_segments(segments: &[String], chunk_size: usize) -> PackedSegments {
    let mut expanded: Vec<String> = Vec::with_capacity(segments.len());
    let mut merged = Vec::new();

    for segment in segments {
        if single_len(&expanded.len().to_string(), segment) > chunk_size {
            let start = expanded.len();
            expanded.extend(split_segment(segment, chunk_size));
            if expanded.len() - start > 1 {
                merged.push(start..expanded.len());
            }
        } else {
            expanded.push(segment.clone());
        }
    }

    let mut originals = Map::new();
    let mut chunks = Vec::new();
    let mut chunk = Map::new();
    let mut chunk_len = 2; // "{}"

    for (index, text) in expanded.into_iter().enumerate() {
        let key = index.to_string();
        let separator = usize::from(!chunk.is_empty());
        let added = entry_len(&key, &text) + separator;

        if !chunk.is_empty() && chunk_len + added > chunk_size {
            chunks.push(std::mem::take(&mut chunk));
            chunk_len = 2 + entry_len(&key, &text);
        } else {
            chunk_len += added;
        }
        chunk.insert(key.clone(), Value::String(text.clone()));
        originals.insert(key, Value::String(text));
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }

    PackedSegments { originals, chunks, merged }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Overwrite the keys of `chunk` in `target` with the values found in `reply`.
/// Returns the number of keys taken from the reply.
fn merge_reply(target: &mut Map<String, Value>, chunk: &Map<String, Value>, reply: &Value) -> usize {
    let Some(reply) = reply.as_object() else {
        warn!("Reply is not a JSON object; keeping {} original segments", chunk.len());
        return 0;
    };

    let mut taken = 0;
    for (key, value) in reply {
        if !chunk.contains_key(key) {
            warn!("Ignoring unknown key '{}' in reply", key);
            continue;
        }
        if value.is_null() {
            continue;
        }
        target.insert(key.clone(), Value::String(value_to_text(value)));
        taken += 1;
    }

    if taken < chunk.len() {
        let missing: Vec<_> = chunk.keys().filter(|k| !reply.contains_key(*k)).collect();
        if !missing.is_empty() {
            warn!("Reply is missing keys {:?}; keeping their original text", missing);
        }
    }
    taken
}

/// Translates lists of texts through the segment protocol
pub struct SegmentTranslator {
    agent: Arc<AgentClient>,
    system_prompt: String,
    glossary: Option<Glossary>,
    decoder: DecoderChain,
}

impl SegmentTranslator {
    pub fn new(agent: Arc<AgentClient>, to_lang: &str, custom_prompt: Option<&str>) -> Self {
        Self {
            agent,
            system_prompt: prompts::segments_prompt(to_lang, custom_prompt),
            glossary: None,
            decoder: DecoderChain::default(),
        }
    }

    /// Inject matching glossary entries into each chunk's system prompt
    #[must_use]
    pub fn with_glossary(mut self, glossary: Option<Glossary>) -> Self {
        self.glossary = glossary.filter(|g| !g.is_empty());
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: DecoderChain) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Translate `segments`; the result always has the same length and order
    pub async fn translate(&self, segments: &[String], chunk_size: usize) -> Result<Vec<String>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let packed = pack_segments(segments, chunk_size);
        info!(
            "Translating {} segments in {} chunks (chunk size {})",
            segments.len(),
            packed.chunks.len(),
            chunk_size
        );

        let prompts = packed
            .chunks
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Json(e.to_string()))?;

        let hook: Option<PromptHook> = self.glossary.clone().map(|glossary| {
            Arc::new(move |system: &str, prompt: &str| format!("{system}{}", glossary.inject(prompt)))
                as PromptHook
        });

        let replies = self
            .agent
            .send_many(&prompts, &self.system_prompt, hook.as_ref())
            .await?;

        let mut translated = packed.originals.clone();
        for (chunk, reply) in packed.chunks.iter().zip(&replies) {
            if reply.trim().is_empty() {
                warn!("Empty reply for a chunk of {} segments; keeping originals", chunk.len());
                continue;
            }
            match self.decoder.decode(reply) {
                Ok(value) => {
                    let taken = merge_reply(&mut translated, chunk, &value);
                    debug!("Merged {}/{} segments from reply", taken, chunk.len());
                }
                Err(e) => warn!("{}; keeping {} original segments", e, chunk.len()),
            }
        }

        let result = packed.reassemble(&translated);
        if result.len() != segments.len() {
            return Err(Error::StructuralMismatch {
                expected: segments.len(),
                actual: result.len(),
            });
        }
        Ok(result)
    }
}
