use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use super::archive::{self, Entry};
use super::{Extracted, InsertOptions, SegmentFormat};
use crate::document::Document;
use crate::error::{Error, Result};

const DOCUMENT_XML: &str = "word/document.xml";

/// Elements that start a new text group: paragraphs, and drawings or pictures
/// sitting between runs of the same paragraph.
fn is_group_boundary(name: &[u8]) -> bool {
    matches!(name, b"w:p" | b"w:drawing" | b"w:pict" | b"w:object")
}

/// Tracks which text group a `w:t` belongs to while streaming the document.
/// Both passes feed the same events, so group numbers line up.
#[derive(Default)]
struct Grouping {
    current: Option<usize>,
    count: usize,
    in_text: bool,
}

impl Grouping {
    fn boundary(&mut self) {
        self.current = None;
    }

    fn open_text(&mut self) -> usize {
        self.in_text = true;
        *self.current.get_or_insert_with(|| {
            self.count += 1;
            self.count - 1
        })
    }
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Docx(e.to_string())
}

/// Text of every group, in document order
fn collect_groups(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut grouping = Grouping::default();
    let mut groups: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => {
                let group = grouping.open_text();
                if group == groups.len() {
                    groups.push(String::new());
                }
            }
            Event::End(e) if e.name().as_ref() == b"w:t" => grouping.in_text = false,
            Event::Start(e) | Event::Empty(e) if is_group_boundary(e.name().as_ref()) => grouping.boundary(),
            Event::End(e) if is_group_boundary(e.name().as_ref()) => grouping.boundary(),
            Event::Text(t) if grouping.in_text => {
                if let Some(group) = grouping.current {
                    groups[group].push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(groups)
}

/// Rewrite the document: the first `w:t` of a translated group receives the
/// whole replacement text, the group's other `w:t` elements are emptied.
fn rewrite(xml: &str, replacements: &HashMap<usize, String>) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut grouping = Grouping::default();
    let mut filled: Option<usize> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        match event {
            Event::Start(ref e) if e.name().as_ref() == b"w:t" => {
                let group = grouping.open_text();
                if replacements.contains_key(&group) && filled != Some(group) {
                    let mut start = BytesStart::new("w:t");
                    start.push_attribute(("xml:space", "preserve"));
                    writer.write_event(Event::Start(start)).map_err(xml_error)?;
                } else {
                    writer.write_event(event).map_err(xml_error)?;
                }
            }
            Event::Text(_) if grouping.in_text && grouping.current.is_some_and(|g| replacements.contains_key(&g)) => {}
            Event::End(ref e) if e.name().as_ref() == b"w:t" => {
                grouping.in_text = false;
                if let Some(group) = grouping.current
                    && let Some(text) = replacements.get(&group)
                    && filled != Some(group)
                {
                    writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_error)?;
                    filled = Some(group);
                }
                writer.write_event(event).map_err(xml_error)?;
            }
            Event::Start(ref e) | Event::Empty(ref e) if is_group_boundary(e.name().as_ref()) => {
                grouping.boundary();
                writer.write_event(event).map_err(xml_error)?;
            }
            Event::End(ref e) if is_group_boundary(e.name().as_ref()) => {
                grouping.boundary();
                writer.write_event(event).map_err(xml_error)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(xml_error)?,
        }
    }
    Ok(writer.into_inner().into_inner())
}

/// One body paragraph with its heading level (`Title` counts as level 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Paragraph {
    pub level: Option<u8>,
    pub text: String,
}

fn heading_level(style: &str) -> Option<u8> {
    if style.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let digits = style.strip_prefix("Heading").or_else(|| style.strip_prefix("heading"))?;
    digits.trim().parse::<u8>().ok().filter(|level| (1..=6).contains(level))
}

/// Non-empty paragraphs of `word/document.xml`; `w:br` becomes a newline
pub(crate) fn paragraphs(content: &[u8]) -> Result<Vec<Paragraph>> {
    let entries = archive::read_entries(content, Error::Docx)?;
    let body = archive::find(&entries, DOCUMENT_XML)
        .ok_or_else(|| Error::Docx(format!("missing {DOCUMENT_XML}")))?;
    let xml = String::from_utf8(body.data.clone())?;

    let mut reader = Reader::from_str(&xml);
    let mut out = Vec::new();
    let mut current: Option<Paragraph> = None;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == b"w:p" => {
                current = Some(Paragraph { level: None, text: String::new() });
            }
            Event::End(e) if e.name().as_ref() == b"w:p" => {
                out.extend(current.take().filter(|p| !p.text.trim().is_empty()));
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"w:pStyle" => {
                if let Some(paragraph) = current.as_mut()
                    && let Some(val) = e.try_get_attribute("w:val").map_err(xml_error)?
                {
                    paragraph.level = heading_level(&val.unescape_value().map_err(xml_error)?);
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"w:br" => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.text.push('\n');
                }
            }
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(t) if in_text => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.text.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Word documents: each run of text between paragraph or drawing boundaries
/// is one segment
pub struct DocxFormat;

pub struct DocxParts {
    entries: Vec<Entry>,
    xml: String,
    /// Group number of each segment
    groups: Vec<usize>,
}

impl SegmentFormat for DocxFormat {
    type Refs = DocxParts;

    fn name(&self) -> &'static str {
        "docx"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<DocxParts>> {
        let entries = archive::read_entries(document.content(), Error::Docx)?;
        let body = archive::find(&entries, DOCUMENT_XML)
            .ok_or_else(|| Error::Docx(format!("missing {DOCUMENT_XML}")))?;
        let xml = String::from_utf8(body.data.clone())?;

        let mut groups = Vec::new();
        let mut segments = Vec::new();
        for (index, text) in collect_groups(&xml)?.into_iter().enumerate() {
            if !text.trim().is_empty() {
                groups.push(index);
                segments.push(text);
            }
        }
        debug!("Found {} text groups in {}", segments.len(), DOCUMENT_XML);

        Ok(Extracted::new(DocxParts { entries, xml, groups }, segments))
    }

    fn post_translate(
        &self,
        refs: DocxParts,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes> {
        let DocxParts { mut entries, xml, groups } = refs;

        let replacements: HashMap<usize, String> = groups
            .into_iter()
            .zip(originals.iter().zip(translated))
            .map(|(group, (original, translation))| (group, options.apply(original, translation)))
            .collect();

        let rewritten = rewrite(&xml, &replacements)?;
        if let Some(entry) = entries.iter_mut().find(|e| e.name == DOCUMENT_XML) {
            entry.data = rewritten;
        }
        Ok(Bytes::from(archive::write_entries(&entries, Error::Docx)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsertMode;
    use zip::CompressionMethod;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">   </w:t></w:r></w:p><w:p><w:r><w:t>A &amp; B</w:t></w:r><w:r><w:drawing><wp:inline/></w:drawing></w:r><w:r><w:t>after</w:t></w:r></w:p></w:body></w:document>"#;

    fn docx() -> Document {
        let entries = vec![
            Entry {
                name: "[Content_Types].xml".to_string(),
                method: CompressionMethod::Deflated,
                data: b"<Types/>".to_vec(),
            },
            Entry {
                name: DOCUMENT_XML.to_string(),
                method: CompressionMethod::Deflated,
                data: BODY.as_bytes().to_vec(),
            },
        ];
        Document::from_bytes(archive::write_entries(&entries, Error::Docx).unwrap(), ".docx", None)
    }

    fn body_of(content: &[u8]) -> String {
        let entries = archive::read_entries(content, Error::Docx).unwrap();
        String::from_utf8(archive::find(&entries, DOCUMENT_XML).unwrap().data.clone()).unwrap()
    }

    #[test]
    fn test_groups_split_by_paragraph_and_drawing() {
        let Extracted { segments, refs } = DocxFormat.pre_translate(&docx()).unwrap();
        assert_eq!(segments, vec!["Hello world", "A & B", "after"]);
        assert_eq!(refs.groups, vec![0, 2, 3]);
    }

    #[test]
    fn test_first_text_element_receives_translation() {
        let Extracted { refs, segments } = DocxFormat.pre_translate(&docx()).unwrap();
        let translated = vec!["你好世界".to_string(), "甲 & 乙".to_string(), "之后".to_string()];

        let out = DocxFormat
            .post_translate(refs, &segments, &translated, &InsertOptions::default())
            .unwrap();
        let body = body_of(&out);

        assert!(body.contains(r#"<w:t xml:space="preserve">你好世界</w:t>"#));
        assert!(body.contains("<w:b/></w:rPr><w:t></w:t>"));
        assert!(body.contains("甲 &amp; 乙"));
        assert!(body.contains("<wp:inline/></w:drawing>"));
        assert!(body.contains(r#"<w:t xml:space="preserve">   </w:t>"#));

        let again = DocxFormat
            .pre_translate(&Document::from_bytes(out, ".docx", None))
            .unwrap();
        assert_eq!(again.segments, translated);
    }

    #[test]
    fn test_append_mode_keeps_original() {
        let Extracted { refs, segments } = DocxFormat.pre_translate(&docx()).unwrap();
        let translated = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let options = InsertOptions::new(InsertMode::Append, "\n");

        let out = DocxFormat.post_translate(refs, &segments, &translated, &options).unwrap();
        assert!(body_of(&out).contains("Hello world\nx"));
    }

    #[test]
    fn test_missing_document_xml() {
        let entries = vec![Entry {
            name: "other.xml".to_string(),
            method: CompressionMethod::Stored,
            data: Vec::new(),
        }];
        let doc = Document::from_bytes(archive::write_entries(&entries, Error::Docx).unwrap(), ".docx", None);
        assert!(matches!(DocxFormat.pre_translate(&doc), Err(Error::Docx(_))));
    }

    #[test]
    fn test_paragraphs_with_headings() {
        let xml = r#"<w:document><w:body><w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p><w:p><w:r><w:t>One</w:t><w:br/><w:t>two</w:t></w:r></w:p><w:p/></w:body></w:document>"#;
        let entries = vec![Entry {
            name: DOCUMENT_XML.to_string(),
            method: CompressionMethod::Deflated,
            data: xml.as_bytes().to_vec(),
        }];
        let content = archive::write_entries(&entries, Error::Docx).unwrap();

        assert_eq!(
            paragraphs(&content).unwrap(),
            vec![
                Paragraph { level: Some(2), text: "Intro".to_string() },
                Paragraph { level: None, text: "One\ntwo".to_string() },
            ]
        );
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
    }
}
