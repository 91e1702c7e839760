use std::collections::HashSet;

use bytes::Bytes;
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

use super::{Extracted, InsertOptions, SegmentFormat};
use crate::document::Document;
use crate::error::{Error, Result};

/// JSON: string leaves under the configured JSONPath matches are segments.
///
/// Values are replaced in place; insert modes other than replace do not apply
/// to structured data.
pub struct JsonFormat {
    paths: Vec<JsonPath>,
}

pub struct JsonTargets {
    root: Value,
    /// JSON Pointer of each extracted string, in segment order
    pointers: Vec<String>,
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Collect every string leaf below `node`, skipping pointers already seen
fn collect_strings(
    node: &Value,
    pointer: &str,
    seen: &mut HashSet<String>,
    pointers: &mut Vec<String>,
    segments: &mut Vec<String>,
) {
    match node {
        Value::String(text) => {
            if seen.insert(pointer.to_string()) {
                pointers.push(pointer.to_string());
                segments.push(text.clone());
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_pointer = format!("{pointer}/{}", escape_token(key));
                collect_strings(child, &child_pointer, seen, pointers, segments);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let child_pointer = format!("{pointer}/{index}");
                collect_strings(child, &child_pointer, seen, pointers, segments);
            }
        }
        _ => {}
    }
}

impl JsonFormat {
    pub fn new(paths: &[String]) -> Result<Self> {
        let paths = paths
            .iter()
            .map(|p| JsonPath::parse(p).map_err(|e| Error::Json(format!("bad JSONPath '{p}': {e}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths })
    }
}

impl SegmentFormat for JsonFormat {
    type Refs = JsonTargets;

    fn name(&self) -> &'static str {
        "json"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<JsonTargets>> {
        let root: Value =
            serde_json::from_str(&document.text()?).map_err(|e| Error::Json(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut pointers = Vec::new();
        let mut segments = Vec::new();

        for path in &self.paths {
            let matches = path.query_located(&root);
            for location in matches.locations() {
                let pointer = location.to_json_pointer();
                if let Some(node) = root.pointer(&pointer) {
                    collect_strings(node, &pointer, &mut seen, &mut pointers, &mut segments);
                }
            }
        }
        debug!("JSONPath matches yielded {} strings", segments.len());

        Ok(Extracted::new(JsonTargets { root, pointers }, segments))
    }

    fn post_translate(
        &self,
        refs: JsonTargets,
        _originals: &[String],
        translated: &[String],
        _options: &InsertOptions,
    ) -> Result<Bytes> {
        let JsonTargets { mut root, pointers } = refs;
        for (pointer, text) in pointers.iter().zip(translated) {
            if let Some(slot) = root.pointer_mut(pointer) {
                *slot = Value::String(text.clone());
            }
        }
        let pretty = serde_json::to_string_pretty(&root).map_err(|e| Error::Json(e.to_string()))?;
        Ok(Bytes::from(pretty))
    }
}
