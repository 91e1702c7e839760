//! Placeholder masking for markdown link and image targets.
//!
//! `[label](target)` becomes `[label](<ph-1a2b3c>)` before the text goes to the
//! model, so URLs and paths come back untouched. Labels stay translatable.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use regex::{Captures, Regex};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(!?\[.*?\])\((.*?)\)").unwrap()
});

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"<ph-([a-zA-Z0-9]+)>").unwrap()
});

/// Mapping from placeholder id to the original target it replaced.
///
/// Safe to share between tasks; ids are unique within one masker.
#[derive(Debug, Default)]
pub struct UriMasker {
    targets: Mutex<HashMap<String, String>>,
}

impl UriMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded targets
    pub fn len(&self) -> usize {
        self.targets.lock().map_or(0, |t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, target: &str) -> Result<String> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|e| Error::Mask(format!("lock poisoned: {e}")))?;
        loop {
            let id = Uuid::new_v4().simple().to_string()[..6].to_string();
            if !targets.contains_key(&id) {
                targets.insert(id.clone(), target.to_string());
                return Ok(id);
            }
        }
    }

    /// Replace every link/image target in `text` with a placeholder
    pub fn mask(&self, text: &str) -> Result<String> {
        let mut failure = None;
        let masked = LINK_RE.replace_all(text, |caps: &Captures<'_>| {
            match self.register(&caps[2]) {
                Ok(id) => format!("{}(<ph-{id}>)", &caps[1]),
                Err(e) => {
                    failure.get_or_insert(e);
                    caps[0].to_string()
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        debug!("Masked {} link targets", self.len());
        Ok(masked.into_owned())
    }

    /// Restore placeholders recorded by this masker; unknown ids are left as-is
    pub fn unmask(&self, text: &str) -> Result<String> {
        let targets = self
            .targets
            .lock()
            .map_err(|e| Error::Mask(format!("lock poisoned: {e}")))?;
        let restored = PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| {
            targets
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(restored.into_owned())
    }
}

/// Mask `text` with a fresh masker and return both
pub fn mask(text: &str) -> Result<(String, UriMasker)> {
    let masker = UriMasker::new();
    let masked = masker.mask(text)?;
    Ok((masked, masker))
}

pub fn unmask(text: &str, masker: &UriMasker) -> Result<String> {
    masker.unmask(text)
}
