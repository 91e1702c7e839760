use bytes::Bytes;

use super::{Extracted, InsertOptions, SegmentFormat};
use crate::document::Document;
use crate::error::Result;

/// Plain text: every non-blank line is a segment
pub struct TxtFormat;

/// One line without its terminator, plus the terminator as written
/// (`\r\n`, `\n`, or nothing on an unterminated last line)
struct Line {
    text: String,
    ending: &'static str,
}

fn split_lines(text: &str) -> Vec<Line> {
    text.split_inclusive('\n')
        .map(|piece| {
            let (text, ending) = if let Some(line) = piece.strip_suffix("\r\n") {
                (line, "\r\n")
            } else if let Some(line) = piece.strip_suffix('\n') {
                (line, "\n")
            } else {
                (piece, "")
            };
            Line {
                text: text.to_string(),
                ending,
            }
        })
        .collect()
}

pub struct TxtLines {
    lines: Vec<Line>,
}

impl SegmentFormat for TxtFormat {
    type Refs = TxtLines;

    fn name(&self) -> &'static str {
        "txt"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<TxtLines>> {
        let lines = split_lines(&document.text()?);
        let segments = lines
            .iter()
            .filter(|line| !line.text.trim().is_empty())
            .map(|line| line.text.clone())
            .collect();

        Ok(Extracted::new(TxtLines { lines }, segments))
    }

    fn post_translate(
        &self,
        refs: TxtLines,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes> {
        let mut pairs = originals.iter().zip(translated);
        let mut output = String::new();

        for line in refs.lines {
            let pair = if line.text.trim().is_empty() { None } else { pairs.next() };
            match pair {
                Some((original, translation)) => output.push_str(&options.apply_trimmed(original, translation)),
                None => output.push_str(&line.text),
            }
            output.push_str(line.ending);
        }
        Ok(Bytes::from(output))
    }
}
