use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::Result;

/// An immutable document: raw bytes plus the suffix that decides how it is handled.
///
/// Content lives in a reference-counted buffer, so cloning never copies the bytes.
/// Translators receive a clone and produce a new document through [`Document::with_content`].
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    content: Bytes,
    /// Lowercased suffix including the leading dot (e.g. ".docx")
    suffix: String,
    stem: Option<String>,
    path: Option<PathBuf>,
}

impl Document {
    pub fn from_bytes(
        content: impl Into<Bytes>,
        suffix: impl AsRef<str>,
        stem: Option<String>,
    ) -> Self {
        Self {
            content: content.into(),
            suffix: normalize_suffix(suffix.as_ref()),
            stem,
            path: None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)?;
        let suffix = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(ToString::to_string);

        Ok(Self {
            content: Bytes::from(content),
            suffix: normalize_suffix(suffix),
            stem,
            path: Some(path.to_path_buf()),
        })
    }

    pub const fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn stem(&self) -> Option<&str> {
        self.stem.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File name built from stem and suffix, if a stem is known
    pub fn name(&self) -> Option<String> {
        self.stem.as_ref().map(|stem| format!("{stem}{}", self.suffix))
    }

    /// Content decoded as UTF-8 with a leading byte-order mark removed
    pub fn text(&self) -> Result<String> {
        let text = String::from_utf8(self.content.to_vec())?;
        Ok(match text.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => text,
        })
    }

    /// Copy of this document carrying new content
    #[must_use]
    pub fn with_content(&self, content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Copy of this document carrying a new suffix (e.g. the markdown variant)
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            suffix: normalize_suffix(suffix),
            ..self.clone()
        }
    }

    /// Content-based identity (MD5 hex)
    pub fn cache_id(&self) -> String {
        format!("{:x}", md5::compute(&self.content))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("suffix", &self.suffix)
            .field("stem", &self.stem)
            .field("size", &self.content.len())
            .finish_non_exhaustive()
    }
}

fn normalize_suffix(suffix: &str) -> String {
    let suffix = suffix.trim().to_lowercase();
    if suffix.is_empty() || suffix.starts_with('.') {
        suffix
    } else {
        format!(".{suffix}")
    }
}
