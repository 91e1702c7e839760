//! Size-bounded, structure-aware splitting of markdown text.
//!
//! Text is first cut into logical blocks (fenced code, headings, blank-line
//! separated paragraphs) and the blocks are then packed greedily into chunks.
//! Concatenating the chunks reproduces the input byte for byte, unless a fenced
//! block had to be broken up: each fragment of such a block carries its own
//! opening and closing fence.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^ {0,3}#{1,6}(?:[ \t]|\r?\n|$)").unwrap()
});

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^ {0,3}(`{3,}|~{3,})").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockKind {
    Text,
    Heading,
    Fence {
        open: String,
        /// Closing fence line, absent when the fence runs to end of text
        close: Option<String>,
        marker: String,
    },
}

#[derive(Debug, Clone)]
struct Block {
    text: String,
    kind: BlockKind,
}

impl Block {
    const fn text(text: String) -> Self {
        Self { text, kind: BlockKind::Text }
    }

    fn len(&self) -> usize {
        self.text.len()
    }
}

/// Splits markdown into chunks of at most `max_block_size` bytes.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownBlockSplitter {
    pub max_block_size: usize,
}

impl MarkdownBlockSplitter {
    pub const fn new(max_block_size: usize) -> Self {
        Self { max_block_size }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        split(text, self.max_block_size)
    }
}

/// Split `text` into ordered chunks bounded by `max_block_size` bytes.
///
/// A single line longer than the limit is emitted as its own chunk.
pub fn split(text: &str, max_block_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let blocks: Vec<Block> = logical_blocks(text)
        .into_iter()
        .flat_map(|block| {
            if block.len() > max_block_size {
                split_oversized(block, max_block_size)
            } else {
                vec![block]
            }
        })
        .collect();

    pack(blocks, max_block_size)
}

/// Like [`split`] but drops chunks that contain only whitespace.
pub fn split_non_blank(text: &str, max_block_size: usize) -> Vec<String> {
    split(text, max_block_size)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Opening fence marker of `line`, if it starts a fenced block
fn fence_marker(line: &str) -> Option<&str> {
    FENCE_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn closes_fence(line: &str, marker: &str) -> bool {
    let Some(found) = fence_marker(line) else {
        return false;
    };
    let rest = line.trim_start().trim_start_matches(|c| c == '`' || c == '~');
    found.starts_with(&marker[..1]) && found.len() >= marker.len() && rest.trim().is_empty()
}

fn logical_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_kind = BlockKind::Text;
    let mut after_blank = false;
    let mut fence: Option<(String, String)> = None; // (marker, open line)
    let mut fence_body = String::new();

    let flush = |blocks: &mut Vec<Block>, current: &mut String, kind: &mut BlockKind| {
        if !current.is_empty() {
            blocks.push(Block {
                text: std::mem::take(current),
                kind: std::mem::replace(kind, BlockKind::Text),
            });
        }
        *kind = BlockKind::Text;
    };

    for line in text.split_inclusive('\n') {
        if let Some((marker, open)) = fence.take() {
            if closes_fence(line, &marker) {
                let mut whole = open.clone();
                whole.push_str(&fence_body);
                whole.push_str(line);
                blocks.push(Block {
                    text: whole,
                    kind: BlockKind::Fence {
                        open,
                        close: Some(line.to_string()),
                        marker,
                    },
                });
                fence_body.clear();
            } else {
                fence_body.push_str(line);
                fence = Some((marker, open));
            }
            continue;
        }

        if let Some(marker) = fence_marker(line) {
            flush(&mut blocks, &mut current, &mut current_kind);
            fence = Some((marker.to_string(), line.to_string()));
            after_blank = false;
            continue;
        }

        if is_blank(line) {
            current.push_str(line);
            after_blank = true;
            continue;
        }

        if HEADING_RE.is_match(line) {
            flush(&mut blocks, &mut current, &mut current_kind);
            current.push_str(line);
            current_kind = BlockKind::Heading;
        } else if after_blank || current_kind == BlockKind::Heading {
            flush(&mut blocks, &mut current, &mut current_kind);
            current.push_str(line);
        } else {
            current.push_str(line);
        }
        after_blank = false;
    }

    if let Some((marker, open)) = fence {
        let mut whole = open.clone();
        whole.push_str(&fence_body);
        blocks.push(Block {
            text: whole,
            kind: BlockKind::Fence { open, close: None, marker },
        });
    }
    flush(&mut blocks, &mut current, &mut current_kind);

    blocks
}

/// Group lines so that each group stays within `budget` bytes where possible
fn pack_lines<'a>(lines: impl Iterator<Item = &'a str>, budget: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && current.len() + line.len() > budget {
            groups.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn split_oversized(block: Block, max_block_size: usize) -> Vec<Block> {
    match block.kind {
        BlockKind::Fence { open, close, marker } => {
            let close_len = close.as_ref().map_or(marker.len() + 1, String::len);
            let budget = max_block_size.saturating_sub(open.len() + close_len).max(1);
            let body = &block.text[open.len()..block.text.len() - close.as_ref().map_or(0, String::len)];
            let groups = pack_lines(body.split_inclusive('\n'), budget);
            let count = groups.len();

            groups
                .into_iter()
                .enumerate()
                .map(|(i, group)| {
                    let last = i + 1 == count;
                    let mut text = open.clone();
                    text.push_str(&group);
                    let closing = match (&close, last) {
                        (Some(close), true) => close.clone(),
                        (None, true) => String::new(),
                        (Some(close), false) if close.ends_with('\n') => close.clone(),
                        (Some(close), false) => format!("{close}\n"),
                        (None, false) => format!("{marker}\n"),
                    };
                    if !closing.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&closing);
                    Block {
                        text,
                        kind: BlockKind::Fence {
                            open: open.clone(),
                            close: close.clone(),
                            marker: marker.clone(),
                        },
                    }
                })
                .collect()
        }
        BlockKind::Heading => vec![block],
        BlockKind::Text => pack_lines(block.text.split_inclusive('\n'), max_block_size)
            .into_iter()
            .map(Block::text)
            .collect(),
    }
}

fn pack(blocks: Vec<Block>, max_block_size: usize) -> Vec<String> {
    fn emit(chunks: &mut Vec<String>, parts: &mut Vec<Block>) {
        if !parts.is_empty() {
            chunks.push(parts.drain(..).map(|b| b.text).collect());
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<Block> = Vec::new();
    let mut size = 0;

    for block in blocks {
        if current.is_empty() || size + block.len() <= max_block_size {
            size += block.len();
            current.push(block);
            continue;
        }

        let ends_with_heading = current
            .last()
            .is_some_and(|b| b.kind == BlockKind::Heading);

        if ends_with_heading && current.len() > 1 {
            // Keep the heading together with the content it introduces
            if let Some(heading) = current.pop() {
                emit(&mut chunks, &mut current);
                if heading.len() + block.len() <= max_block_size {
                    size = heading.len() + block.len();
                    current.push(heading);
                    current.push(block);
                } else {
                    chunks.push(heading.text);
                    size = block.len();
                    current.push(block);
                }
            }
        } else {
            emit(&mut chunks, &mut current);
            size = block.len();
            current.push(block);
        }
    }
    emit(&mut chunks, &mut current);

    chunks
}
