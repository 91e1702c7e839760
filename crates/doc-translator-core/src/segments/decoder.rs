use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// One strategy for turning a model reply into JSON
pub trait JsonDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, text: &str) -> Option<Value>;
}

/// Plain `serde_json` parse of the trimmed reply; only objects and arrays count
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictDecoder;

impl JsonDecoder for StrictDecoder {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn decode(&self, text: &str) -> Option<Value> {
        serde_json::from_str::<Value>(text.trim())
            .ok()
            .filter(|value| value.is_object() || value.is_array())
    }
}

/// Best-effort decoding of what models tend to send back.
///
/// Strips a surrounding code fence, unwraps an object that was encoded as a
/// JSON string, cuts out the outermost bracketed region and parses it as
/// JSON5 (trailing commas, single quotes, comments, unquoted keys).
#[derive(Debug, Default, Clone, Copy)]
pub struct LenientDecoder;

impl LenientDecoder {
    fn strip_fence(text: &str) -> &str {
        let text = text.trim();
        let Some(rest) = text.strip_prefix("```") else {
            return text;
        };
        // Drop the info string (```json) up to the first newline
        let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
        body.trim_end().strip_suffix("```").unwrap_or(body).trim()
    }

    fn outer_region(text: &str) -> Option<&str> {
        let start = text.find(['{', '['])?;
        let close = if text[start..].starts_with('{') { '}' } else { ']' };
        let end = text.rfind(close)?;
        (end > start).then(|| &text[start..=end])
    }

    fn decode_depth(text: &str, depth: usize) -> Option<Value> {
        let text = Self::strip_fence(text);

        if let Ok(value) = json5::from_str::<Value>(text) {
            return match value {
                Value::String(inner) if depth < 2 => Self::decode_depth(&inner, depth + 1),
                Value::String(_) => None,
                other => Some(other),
            };
        }

        let region = Self::outer_region(text)?;
        json5::from_str::<Value>(region)
            .or_else(|_| serde_json::from_str::<Value>(region).map_err(|e| e.to_string()))
            .ok()
    }
}

impl JsonDecoder for LenientDecoder {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn decode(&self, text: &str) -> Option<Value> {
        Self::decode_depth(text, 0)
    }
}

/// Decoders tried in order until one succeeds
pub struct DecoderChain {
    decoders: Vec<Box<dyn JsonDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn JsonDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn decode(&self, text: &str) -> Result<Value> {
        for decoder in &self.decoders {
            if let Some(value) = decoder.decode(text) {
                debug!("Decoded reply with {} decoder", decoder.name());
                return Ok(value);
            }
        }
        let preview: String = text.chars().take(120).collect();
        Err(Error::SegmentDecode(format!("no decoder accepted reply: {preview}")))
    }
}

impl Default for DecoderChain {
    /// Strict first, then lenient
    fn default() -> Self {
        Self::new(vec![Box::new(StrictDecoder), Box::new(LenientDecoder)])
    }
}

impl std::fmt::Debug for DecoderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.decoders.iter().map(|d| d.name()).collect();
        f.debug_struct("DecoderChain").field("decoders", &names).finish()
    }
}
