//! Standalone renditions of translated documents.
//!
//! Every format can be exported as a single HTML page rendered through the
//! askama templates under `templates/`. Markdown can additionally be bundled
//! as a zip with its embedded base64 images written out as files.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use askama::Template;
use base64::Engine as _;
use base64::engine::general_purpose;
use bytes::Bytes;
use pulldown_cmark::{Options, Parser, html};
use regex::{Captures, Regex};
use tracing::{debug, warn};
use zip::CompressionMethod;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::formats::archive::{self, Entry};
use crate::formats::{FormatKind, SrtEntry, chapter_bodies, docx_paragraphs, parse_srt, read_workbook};

/// Folder inside a markdown zip that receives the extracted images
pub const IMAGE_FOLDER: &str = "images";

#[allow(clippy::unwrap_used)]
static EMBEDDED_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(data:([^;,)]+)[^,)]*;base64,([A-Za-z0-9+/=\s]+)\)").unwrap()
});

// =============================================================================
// Templates
// =============================================================================

#[derive(Template)]
#[template(path = "markdown.html")]
struct MarkdownPage<'a> {
    title: &'a str,
    body: String,
}

#[derive(Template)]
#[template(path = "text.html")]
struct TextPage<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Template)]
#[template(path = "srt.html")]
struct SubtitlePage<'a> {
    title: &'a str,
    cues: &'a [SrtEntry],
}

#[derive(Template)]
#[template(path = "json.html")]
struct JsonPage<'a> {
    title: &'a str,
    json: String,
}

struct Sheet {
    name: String,
    rows: Vec<Vec<String>>,
}

#[derive(Template)]
#[template(path = "xlsx.html")]
struct WorkbookPage<'a> {
    title: &'a str,
    sheets: Vec<Sheet>,
}

struct Block {
    tag: String,
    text: String,
}

#[derive(Template)]
#[template(path = "docx.html")]
struct WordPage<'a> {
    title: &'a str,
    paragraphs: Vec<Block>,
}

#[derive(Template)]
#[template(path = "epub.html")]
struct BookPage<'a> {
    title: &'a str,
    chapters: Vec<String>,
}

fn render(page: &impl Template) -> Result<String> {
    page.render().map_err(|e| Error::Export(e.to_string()))
}

// =============================================================================
// HTML
// =============================================================================

/// CommonMark with tables, footnotes, strikethrough and task lists
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

fn sheets(content: &[u8]) -> Result<Vec<Sheet>> {
    let book = read_workbook(content)?;
    Ok(book
        .get_sheet_collection()
        .iter()
        .map(|sheet| {
            let (max_col, max_row) = sheet.get_highest_column_and_row();
            let rows = (1..=max_row)
                .map(|row| {
                    (1..=max_col)
                        .map(|col| {
                            sheet
                                .get_cell((col, row))
                                .map(|cell| cell.get_value().to_string())
                                .unwrap_or_default()
                        })
                        .collect()
                })
                .collect();
            Sheet {
                name: sheet.get_name().to_string(),
                rows,
            }
        })
        .collect())
}

/// A standalone HTML page showing `document`, which holds `kind` content
pub fn to_html(kind: FormatKind, document: &Document) -> Result<String> {
    let title = document.stem().unwrap_or("document");
    debug!("Rendering {} document as HTML", kind);

    match kind {
        FormatKind::Html => document.text(),
        FormatKind::Markdown => render(&MarkdownPage {
            title,
            body: markdown_to_html(&document.text()?),
        }),
        FormatKind::Txt => render(&TextPage {
            title,
            text: &document.text()?,
        }),
        FormatKind::Srt => render(&SubtitlePage {
            title,
            cues: &parse_srt(&document.text()?)?,
        }),
        FormatKind::Json => {
            let value: serde_json::Value =
                serde_json::from_str(&document.text()?).map_err(|e| Error::Json(e.to_string()))?;
            let json = serde_json::to_string_pretty(&value).map_err(|e| Error::Json(e.to_string()))?;
            render(&JsonPage { title, json })
        }
        FormatKind::Xlsx => render(&WorkbookPage {
            title,
            sheets: sheets(document.content())?,
        }),
        FormatKind::Docx => {
            let paragraphs = docx_paragraphs(document.content())?
                .into_iter()
                .map(|paragraph| Block {
                    tag: paragraph.level.map_or_else(|| "p".to_string(), |level| format!("h{level}")),
                    text: paragraph.text,
                })
                .collect();
            render(&WordPage { title, paragraphs })
        }
        FormatKind::Epub => render(&BookPage {
            title,
            chapters: chapter_bodies(document.content())?,
        }),
    }
}

// =============================================================================
// Markdown zip
// =============================================================================

fn image_extension(mime: &str) -> String {
    let subtype = mime.rsplit('/').next().unwrap_or_default();
    mime_guess::get_mime_extensions_str(mime)
        .and_then(|exts| exts.iter().find(|ext| **ext == subtype).or_else(|| exts.first()))
        .map_or_else(|| "bin".to_string(), |ext| (*ext).to_string())
}

/// Zip holding `<markdown_name>` with every inline base64 image moved to
/// `images/<md5 prefix>.<ext>` and its link rewritten to the relative path.
pub fn to_mdzip(markdown: &str, markdown_name: &str) -> Result<Bytes> {
    let mut images: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    let rewritten = EMBEDDED_IMAGE.replace_all(markdown, |caps: &Captures<'_>| {
        let encoded: String = caps[3].chars().filter(|c| !c.is_whitespace()).collect();
        let Ok(data) = general_purpose::STANDARD.decode(&encoded) else {
            warn!("Embedded image with invalid base64 kept inline");
            return caps[0].to_string();
        };
        let digest = format!("{:x}", md5::compute(encoded.as_bytes()));
        let name = format!("{}.{}", &digest[..8], image_extension(&caps[2]));
        let link = format!("![{}](./{IMAGE_FOLDER}/{name})", &caps[1]);
        images.entry(name).or_insert(data);
        link
    });
    debug!("Extracted {} embedded images", images.len());

    let mut entries = vec![Entry {
        name: markdown_name.to_string(),
        method: CompressionMethod::Deflated,
        data: rewritten.into_owned().into_bytes(),
    }];
    entries.extend(images.into_iter().map(|(name, data)| Entry {
        name: format!("{IMAGE_FOLDER}/{name}"),
        method: CompressionMethod::Deflated,
        data,
    }));

    Ok(Bytes::from(archive::write_entries(&entries, Error::Export)?))
}
