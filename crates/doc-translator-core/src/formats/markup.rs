//! Text helpers shared by the HTML and EPUB formats.

use std::borrow::Cow;

/// Entity-decoded text against the full HTML5 table.
/// Unknown references and bare `&` come through as literal text.
pub fn decode(raw: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(raw)
}

/// Escape `&`, `<` and `>` for a text node
pub fn encode_text(text: &str) -> Cow<'_, str> {
    html_escape::encode_text(text)
}

/// Escape a value written between double quotes
pub fn encode_attribute(value: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(value)
}

/// Split `text` into its leading whitespace, core and trailing whitespace
pub fn split_whitespace(text: &str) -> (&str, &str, &str) {
    let core_start = text.len() - text.trim_start().len();
    let core_end = text.trim_end().len().max(core_start);
    (&text[..core_start], &text[core_start..core_end], &text[core_end..])
}
