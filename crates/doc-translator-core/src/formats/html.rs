use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use lol_html::html_content::{ContentType, EndTag};
use lol_html::{HandlerResult, RewriteStrSettings, element, rewrite_str, text};

use super::markup;
use super::{Extracted, InsertOptions, SegmentFormat};
use crate::config::InsertMode;
use crate::document::Document;
use crate::error::{Error, Result};

/// Content of these elements is passed through verbatim
const SKIPPED: &[&str] = &["script", "style", "pre", "code", "kbd", "samp", "var", "noscript"];

/// Elements whose direct text children are translated
const SAFE_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "q", "caption", "span", "a", "strong", "em", "b", "i",
    "u", "td", "th", "button", "label", "legend", "option", "figcaption", "summary", "details", "div", "title",
];

/// Starting one of these closes an open `p`
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset", "figcaption", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "main", "menu", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

/// Translatable attributes per element; `title` applies everywhere
fn safe_attributes(tag: &str) -> &'static [&'static str] {
    match tag {
        "img" => &["alt", "title"],
        "input" | "textarea" => &["placeholder", "title"],
        "area" => &["alt", "title"],
        _ => &["title"],
    }
}

type TagSet = &'static [&'static str];

const P_SCOPE: TagSet = &["button", "table", "td", "th", "caption", "template", "object", "html"];
const TABLE_SCOPE: TagSet = &["table", "template", "html"];

/// Open elements whose end tag may be omitted when `next` starts,
/// and the elements that stop the search
fn implied_end(next: &str) -> Option<(TagSet, TagSet)> {
    let (closed, boundaries): (TagSet, TagSet) = match next {
        _ if CLOSES_P.contains(&next) => (&["p"], P_SCOPE),
        "li" => (&["li"], &["ul", "ol", "menu", "html"]),
        "dt" | "dd" => (&["dt", "dd"], &["dl", "html"]),
        "option" => (&["option"], &["select", "datalist", "optgroup", "html"]),
        "optgroup" => (&["option", "optgroup"], &["select", "html"]),
        "td" | "th" => (&["td", "th"], TABLE_SCOPE),
        "tr" => (&["tr", "td", "th"], TABLE_SCOPE),
        "thead" | "tbody" | "tfoot" => (&["thead", "tbody", "tfoot", "tr", "td", "th"], TABLE_SCOPE),
        _ => return None,
    };
    Some((closed, boundaries))
}

/// Stack of open elements (outermost first), keyed so end tag callbacks
/// can find their own entry after implied ends have moved things
#[derive(Default)]
struct OpenElements {
    next_id: u64,
    open: Vec<(u64, String)>,
}

impl OpenElements {
    fn close_implied(&mut self, next: &str) {
        let Some((closed, boundaries)) = implied_end(next) else {
            return;
        };
        for (depth, (_, tag)) in self.open.iter().enumerate().rev() {
            if boundaries.contains(&tag.as_str()) {
                return;
            }
            if closed.contains(&tag.as_str()) {
                self.open.truncate(depth);
                return;
            }
        }
    }

    fn push(&mut self, tag: String) -> u64 {
        self.next_id += 1;
        self.open.push((self.next_id, tag));
        self.next_id
    }

    fn close(&mut self, id: u64) {
        if let Some(depth) = self.open.iter().rposition(|(open, _)| *open == id) {
            self.open.truncate(depth);
        }
    }

    fn parent(&self) -> Option<&str> {
        self.open.last().map(|(_, tag)| tag.as_str())
    }

    fn is_skipped(&self) -> bool {
        self.open.iter().any(|(_, tag)| SKIPPED.contains(&tag.as_str()))
    }
}

/// A translatable position met while walking the page
enum Found<'a> {
    Text { parent: Option<&'a str>, skipped: bool, raw: &'a str },
    Attribute { raw: &'a str },
}

impl Found<'_> {
    /// Decoded text when this position yields a segment
    fn segment(&self) -> Option<String> {
        let raw = match *self {
            Self::Text { parent, skipped, raw } => {
                if skipped || !parent.is_some_and(|p| SAFE_TAGS.contains(&p)) {
                    return None;
                }
                raw
            }
            Self::Attribute { raw } => raw,
        };
        let text = markup::decode(raw);
        (!text.trim().is_empty()).then(|| text.into_owned())
    }
}

/// Replacement for one visited position, as raw markup
type Rewrite = Option<String>;

fn html_error(e: impl std::fmt::Display) -> Error {
    Error::Html(e.to_string())
}

/// Stream `source` through the rewriter, calling `visit` for every text node
/// and candidate attribute in document order. Positions `visit` leaves alone
/// are written back byte for byte.
fn walk_html<F>(source: &str, visit: F) -> Result<String>
where
    F: FnMut(Found<'_>) -> Rewrite,
{
    let stack = Rc::new(RefCell::new(OpenElements::default()));
    let visit = RefCell::new(visit);
    let pending = RefCell::new(String::new());

    let on_element = element!("*", |el| {
        let tag = el.tag_name().to_ascii_lowercase();
        let skipped = {
            let mut open = stack.borrow_mut();
            open.close_implied(&tag);
            open.is_skipped() || SKIPPED.contains(&tag.as_str())
        };

        if !skipped {
            for &name in safe_attributes(&tag) {
                let Some(raw) = el.get_attribute(name) else {
                    continue;
                };
                if let Some(value) = (visit.borrow_mut())(Found::Attribute { raw: &raw }) {
                    el.set_attribute(name, &value)?;
                }
            }
        }

        if let Some(handlers) = el.end_tag_handlers() {
            let id = stack.borrow_mut().push(tag);
            let stack = Rc::clone(&stack);
            let handler: lol_html::EndTagHandler<'static> =
                Box::new(move |_: &mut EndTag<'_>| -> HandlerResult {
                    stack.borrow_mut().close(id);
                    Ok(())
                });
            handlers.push(handler);
        }
        Ok(())
    });

    let on_text = text!("*", |chunk| {
        if !chunk.last_in_text_node() {
            pending.borrow_mut().push_str(chunk.as_str());
            chunk.remove();
            return Ok(());
        }

        let split = !pending.borrow().is_empty();
        let raw = {
            let mut pending = pending.borrow_mut();
            pending.push_str(chunk.as_str());
            std::mem::take(&mut *pending)
        };
        if raw.is_empty() {
            return Ok(());
        }

        let rewrite = {
            let open = stack.borrow();
            (visit.borrow_mut())(Found::Text {
                parent: open.parent(),
                skipped: open.is_skipped(),
                raw: &raw,
            })
        };
        match rewrite {
            Some(replacement) => chunk.replace(&replacement, ContentType::Html),
            None if split => chunk.replace(&raw, ContentType::Html),
            None => {}
        }
        Ok(())
    });

    rewrite_str(
        source,
        RewriteStrSettings {
            element_content_handlers: vec![on_element, on_text],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(html_error)
}

/// HTML pages: direct text of content elements plus a few descriptive attributes
pub struct HtmlFormat;

pub struct HtmlSource {
    source: String,
}

impl SegmentFormat for HtmlFormat {
    type Refs = HtmlSource;

    fn name(&self) -> &'static str {
        "html"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<HtmlSource>> {
        let source = document.text()?;
        let mut segments = Vec::new();

        walk_html(&source, |found| {
            segments.extend(found.segment());
            None
        })?;

        Ok(Extracted::new(HtmlSource { source }, segments))
    }

    fn post_translate(
        &self,
        refs: HtmlSource,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes> {
        let mut pairs = originals.iter().zip(translated);

        let out = walk_html(&refs.source, |found| {
            let is_text = matches!(found, Found::Text { .. });
            found.segment()?;
            let (original, translation) = pairs.next()?;

            let text = if is_text && options.mode == InsertMode::Replace {
                let (leading, _, trailing) = markup::split_whitespace(original);
                format!("{leading}{}{trailing}", translation.trim())
            } else {
                options.apply(original, translation)
            };
            if text == *original {
                return None;
            }
            Some(if is_text {
                markup::encode_text(&text).into_owned()
            } else {
                markup::encode_attribute(&text).into_owned()
            })
        })?;

        Ok(Bytes::from(out))
    }
}
