use std::ops::Range;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose;
use bytes::Bytes;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::{debug, warn};
use zip::CompressionMethod;

use super::archive::{self, Entry};
use super::markup;
use super::{Extracted, InsertOptions, SegmentFormat};
use crate::config::InsertMode;
use crate::document::Document;
use crate::error::{Error, Result};

const CONTAINER: &str = "META-INF/container.xml";
const MIMETYPE: &str = "mimetype";

/// Text directly inside these elements is never translated
const EXCLUDED_PARENTS: &[&str] = &["style", "script", "head", "title", "meta"];

const CONTENT_TYPES: &[&str] = &["application/xhtml+xml", "text/html"];

fn epub_error(e: impl std::fmt::Display) -> Error {
    Error::Epub(e.to_string())
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(epub_error)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value().map_err(epub_error)?.into_owned()));
        }
    }
    Ok(None)
}

/// Path of the package document named by `META-INF/container.xml`
fn package_path(container: &str) -> Result<String> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event().map_err(epub_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => return Err(Error::Epub("container.xml names no rootfile".to_string())),
            _ => {}
        }
    }
}

/// Resolve `href` against the directory of the package document
fn resolve(base_dir: &str, href: &str) -> String {
    let href = urlencoding::decode(href).map_or_else(|_| href.to_string(), |h| h.into_owned());
    let href = href.split('#').next().unwrap_or_default();

    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Manifest entries with an (X)HTML media type, resolved to archive paths.
/// Spine items come first in reading order, the rest follow in manifest order.
fn content_documents(opf: &str, base_dir: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(opf);
    let mut items: Vec<(String, String)> = Vec::new();
    let mut spine: Vec<String> = Vec::new();
    loop {
        match reader.read_event().map_err(epub_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"item" => {
                let media_type = attribute(&e, b"media-type")?.unwrap_or_default();
                if !CONTENT_TYPES.contains(&media_type.as_str()) {
                    continue;
                }
                if let Some(href) = attribute(&e, b"href")? {
                    let id = attribute(&e, b"id")?.unwrap_or_default();
                    items.push((id, resolve(base_dir, &href)));
                }
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"itemref" => {
                spine.extend(attribute(&e, b"idref")?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut paths: Vec<String> = spine
        .iter()
        .filter_map(|idref| items.iter().find(|(id, _)| id == idref))
        .map(|(_, path)| path.clone())
        .collect();
    for (_, path) in items {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn entry_text(entries: &[Entry], name: &str) -> Result<Option<String>> {
    archive::find(entries, name)
        .map(|entry| String::from_utf8(entry.data.clone()).map_err(Error::from))
        .transpose()
}

/// Byte span of one text node and its parent element (lowercased local name)
struct TextNode {
    span: Range<usize>,
    parent: Option<String>,
}

fn offset(position: u64) -> Result<usize> {
    usize::try_from(position).map_err(epub_error)
}

/// Text nodes of an (X)HTML document in document order
fn text_nodes(source: &str) -> Result<Vec<TextNode>> {
    let mut reader = Reader::from_str(source);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut open: Vec<String> = Vec::new();
    let mut nodes = Vec::new();
    loop {
        let start = offset(reader.buffer_position())?;
        match reader.read_event().map_err(epub_error)? {
            Event::Start(e) => open.push(String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase()),
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if let Some(depth) = open.iter().rposition(|tag| *tag == name) {
                    open.truncate(depth);
                }
            }
            Event::Text(_) => nodes.push(TextNode {
                span: start..offset(reader.buffer_position())?,
                parent: open.last().cloned(),
            }),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(nodes)
}

/// Replacement of one byte range of a content document
#[derive(Debug, Clone)]
struct Edit {
    span: Range<usize>,
    replacement: String,
}

/// Apply non-overlapping edits in source order
fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| e.span.start);
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for edit in edits {
        if edit.span.start < last {
            continue;
        }
        out.push_str(&source[last..edit.span.start]);
        out.push_str(&edit.replacement);
        last = edit.span.end;
    }
    out.push_str(&source[last..]);
    out
}

/// Archive entries plus the content documents the package lists
struct Book {
    entries: Vec<Entry>,
    documents: Vec<String>,
}

fn open_book(content: &[u8]) -> Result<Book> {
    let entries = archive::read_entries(content, Error::Epub)?;

    let container = entry_text(&entries, CONTAINER)?
        .ok_or_else(|| Error::Epub(format!("missing {CONTAINER}")))?;
    let opf_path = package_path(&container)?;
    let opf = entry_text(&entries, &opf_path)?
        .ok_or_else(|| Error::Epub(format!("missing package document {opf_path}")))?;
    let base_dir = opf_path.rsplit_once('/').map_or("", |(dir, _)| dir);

    let documents = content_documents(&opf, base_dir)?;
    Ok(Book { entries, documents })
}

#[allow(clippy::unwrap_used)]
static BODY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").unwrap());

fn body_of(source: &str) -> &str {
    BODY.captures(source)
        .and_then(|caps| caps.get(1))
        .map_or(source, |body| body.as_str())
}

/// Point `<img>` elements at data URIs built from the archive entries they reference
fn inline_images(source: &str, dir: &str, entries: &[Entry]) -> Result<String> {
    let on_image = element!("img[src]", |el| {
        if let Some(src) = el.get_attribute("src")
            && !src.starts_with("data:")
            && let Some(image) = archive::find(entries, &resolve(dir, &src))
        {
            let mime = mime_guess::from_path(&image.name).first_or_octet_stream();
            let data = general_purpose::STANDARD.encode(&image.data);
            el.set_attribute("src", &format!("data:{};base64,{data}", mime.essence_str()))?;
        }
        Ok(())
    });

    rewrite_str(
        source,
        RewriteStrSettings {
            element_content_handlers: vec![on_image],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(epub_error)
}

/// Body markup of every content document in reading order, images inlined
pub(crate) fn chapter_bodies(content: &[u8]) -> Result<Vec<String>> {
    let book = open_book(content)?;
    let mut bodies = Vec::with_capacity(book.documents.len());
    for path in &book.documents {
        let Some(source) = entry_text(&book.entries, path)? else {
            continue;
        };
        let dir = path.rsplit_once('/').map_or("", |(dir, _)| dir);
        let page = inline_images(&source, dir, &book.entries)?;
        bodies.push(body_of(&page).trim().to_string());
    }
    Ok(bodies)
}

struct ContentFile {
    entry: usize,
    source: String,
}

/// EPUB books: text nodes of every (X)HTML document in the manifest
pub struct EpubFormat;

pub struct EpubParts {
    entries: Vec<Entry>,
    files: Vec<ContentFile>,
    /// `(file, text span)` of each segment
    targets: Vec<(usize, Range<usize>)>,
}

impl SegmentFormat for EpubFormat {
    type Refs = EpubParts;

    fn name(&self) -> &'static str {
        "epub"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<EpubParts>> {
        let Book { entries, documents } = open_book(document.content())?;

        let mut files = Vec::new();
        let mut targets = Vec::new();
        let mut segments = Vec::new();

        for path in documents {
            let Some(entry) = entries.iter().position(|e| e.name == path) else {
                warn!("Manifest item {} not found in archive", path);
                continue;
            };
            let source = String::from_utf8(entries[entry].data.clone())?;
            let file = files.len();

            for node in text_nodes(&source)? {
                if node.parent.as_deref().is_none_or(|parent| EXCLUDED_PARENTS.contains(&parent)) {
                    continue;
                }
                let text = markup::decode(&source[node.span.clone()]);
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    segments.push(trimmed.to_string());
                    targets.push((file, node.span));
                }
            }
            files.push(ContentFile { entry, source });
        }
        debug!("Collected {} text nodes from {} content documents", segments.len(), files.len());

        Ok(Extracted::new(EpubParts { entries, files, targets }, segments))
    }

    fn post_translate(
        &self,
        refs: EpubParts,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes> {
        let EpubParts { mut entries, files, targets } = refs;
        let mut edits: Vec<Vec<Edit>> = vec![Vec::new(); files.len()];

        for ((file, span), (original, translation)) in targets.into_iter().zip(originals.iter().zip(translated)) {
            let file_source = &files[file].source;
            let (leading, _, trailing) = markup::split_whitespace(&file_source[span.clone()]);
            let text = match options.mode {
                InsertMode::Replace => translation.trim().to_string(),
                _ => options.apply(original, translation),
            };
            if text == *original {
                continue;
            }
            edits[file].push(Edit {
                replacement: format!("{leading}{}{trailing}", markup::encode_text(&text)),
                span,
            });
        }

        for (file, file_edits) in files.into_iter().zip(edits) {
            if !file_edits.is_empty() {
                entries[file.entry].data = apply_edits(&file.source, file_edits).into_bytes();
            }
        }

        // The OCF container requires `mimetype` first and uncompressed.
        let (mut ordered, rest): (Vec<Entry>, Vec<Entry>) = entries.into_iter().partition(|e| e.name == MIMETYPE);
        for entry in &mut ordered {
            entry.method = CompressionMethod::Stored;
        }
        ordered.extend(rest);

        Ok(Bytes::from(archive::write_entries(&ordered, Error::Epub)?))
    }
}
