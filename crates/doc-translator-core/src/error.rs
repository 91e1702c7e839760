use thiserror::Error;

/// Unified error type for doc-translator-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Agent operations (transport, HTTP status, reply shape, retry budget)
/// - Segment protocol and structural checks
/// - Per-format parsing and re-serialization
/// - Workflow state, cache and configuration
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Agent Errors
    // ==========================================================================
    /// Connection failure or timeout talking to the chat-completion endpoint
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The reply body lacks the expected `choices[0].message.content`
    #[error("unexpected response shape: {0}")]
    ResponseShape(String),

    /// The shared retry ceiling for this run was crossed
    #[error("retry budget exhausted after {0} retries")]
    BudgetExhausted(usize),

    // ==========================================================================
    // Segment Errors
    // ==========================================================================
    /// A model reply could not be decoded, even leniently
    #[error("failed to decode segment reply: {0}")]
    SegmentDecode(String),

    /// Translated segment count differs from the extracted count
    #[error("structural mismatch: expected {expected} segments, got {actual}")]
    StructuralMismatch { expected: usize, actual: usize },

    // ==========================================================================
    // Format Errors
    // ==========================================================================
    #[error("invalid docx: {0}")]
    Docx(String),

    #[error("invalid xlsx: {0}")]
    Xlsx(String),

    #[error("invalid html: {0}")]
    Html(String),

    #[error("invalid epub: {0}")]
    Epub(String),

    #[error("invalid srt at entry {entry}: {reason}")]
    Srt { entry: usize, reason: String },

    #[error("invalid json: {0}")]
    Json(String),

    #[error("invalid csv: {0}")]
    Csv(String),

    /// Document content is not valid UTF-8 where text is required
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    // ==========================================================================
    // Workflow Errors
    // ==========================================================================
    /// `translate` was called before any document was read
    #[error("no document has been read")]
    NotRead,

    /// An export was requested before `translate` completed
    #[error("document has not been translated")]
    NotTranslated,

    /// A blocking entry point was called from inside a tokio runtime
    #[error("blocking call inside an async runtime; use the async API instead")]
    NestedRuntime,

    /// No translator handles this suffix
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The translated document cannot be exported in the requested format
    #[error("cannot export {from} document as {to}")]
    UnsupportedExport { from: String, to: String },

    /// Rendering or packaging an export failed
    #[error("export failed: {0}")]
    Export(String),

    /// The external converter failed
    #[error("conversion failed: {0}")]
    Convert(String),

    // ==========================================================================
    // Cache & Masking Errors
    // ==========================================================================
    #[error("cache error: {0}")]
    Cache(String),

    /// Placeholder table could not be accessed
    #[error("masking failed: {0}")]
    Mask(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
