use crate::document::Document;

/// Cache key for converted documents.
///
/// Keys are opaque MD5 hashes of all relevant inputs, ensuring:
/// - Same suffix + content + engine + engine settings = same key
/// - Any change to inputs produces a different key
/// - Keys are fixed-length (32 hex chars) for consistent storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: String,
}

impl CacheKey {
    pub fn new(suffix: &str, content: &[u8], engine: &str, config_hash: &str) -> Self {
        // Null-byte separators keep ("a", "bc") and ("ab", "c") apart.
        let mut context = md5::Context::new();
        context.consume(suffix.to_lowercase().as_bytes());
        context.consume(b"\0");
        context.consume(content);
        context.consume(b"\0");
        context.consume(engine.to_lowercase().as_bytes());
        context.consume(b"\0");
        context.consume(config_hash.as_bytes());

        Self {
            hash: format!("{:x}", context.compute()),
        }
    }

    pub fn for_document(document: &Document, engine: &str, config_hash: &str) -> Self {
        Self::new(document.suffix(), document.content(), engine, config_hash)
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}
