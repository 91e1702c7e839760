use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;

use super::{Extracted, InsertOptions, SegmentFormat};
use crate::document::Document;
use crate::error::{Error, Result};

#[allow(clippy::unwrap_used)]
static BLOCK_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

#[allow(clippy::unwrap_used)]
static TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}:\d{2}:\d{2}[,.]\d{1,3})\s*-->\s*(\d{1,2}:\d{2}:\d{2}[,.]\d{1,3})(.*)$").unwrap()
});

/// One subtitle cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtEntry {
    pub index: usize,
    pub start: String,
    pub end: String,
    /// Anything after the end timestamp (position hints)
    pub settings: String,
    pub text: String,
}

impl SrtEntry {
    fn timing(&self) -> String {
        format!("{} --> {}{}", self.start, self.end, self.settings)
    }
}

/// Parse SRT text into cues. Blocks are separated by blank lines; each holds
/// an index line, a `start --> end` line, and zero or more text lines.
pub fn parse_srt(text: &str) -> Result<Vec<SrtEntry>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text).replace("\r\n", "\n");
    let mut entries = Vec::new();

    for (position, block) in BLOCK_SEPARATOR.split(&text).enumerate() {
        let block = block.trim_matches('\n');
        if block.trim().is_empty() {
            continue;
        }
        let entry = position + 1;
        let mut lines = block.lines();

        let index = lines
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .parse::<usize>()
            .map_err(|e| Error::Srt {
                entry,
                reason: format!("bad index: {e}"),
            })?;

        let timing = lines.next().unwrap_or_default();
        let caps = TIMING.captures(timing).ok_or_else(|| Error::Srt {
            entry,
            reason: format!("bad timing line '{timing}'"),
        })?;

        entries.push(SrtEntry {
            index,
            start: caps[1].to_string(),
            end: caps[2].to_string(),
            settings: caps[3].trim_end().to_string(),
            text: lines.collect::<Vec<_>>().join("\n"),
        });
    }
    Ok(entries)
}

/// Re-serialize cues with sequential indices
pub fn compose_srt(entries: &[SrtEntry]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&(i + 1).to_string());
        out.push('\n');
        out.push_str(&entry.timing());
        out.push('\n');
        out.push_str(entry.text.trim_end_matches('\n'));
        out.push_str("\n\n");
    }
    out
}

/// SubRip subtitles: the text of every non-blank cue is a segment
pub struct SrtFormat;

pub struct SrtCues {
    entries: Vec<SrtEntry>,
    /// Entry index of each segment
    slots: Vec<usize>,
}

impl SegmentFormat for SrtFormat {
    type Refs = SrtCues;

    fn name(&self) -> &'static str {
        "srt"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<SrtCues>> {
        let entries = parse_srt(&document.text()?)?;
        let (slots, segments) = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.text.trim().is_empty())
            .map(|(slot, entry)| (slot, entry.text.clone()))
            .unzip();
        Ok(Extracted::new(SrtCues { entries, slots }, segments))
    }

    fn post_translate(
        &self,
        refs: SrtCues,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes> {
        let SrtCues { mut entries, slots } = refs;
        for ((slot, original), translation) in slots.into_iter().zip(originals).zip(translated) {
            if let Some(entry) = entries.get_mut(slot) {
                entry.text = options.apply_trimmed(original, translation);
            }
        }
        Ok(Bytes::from(compose_srt(&entries)))
    }
}
