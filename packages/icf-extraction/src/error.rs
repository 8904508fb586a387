//! Typed errors for the ICF extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Two classes matter to callers:
//! - [`ExtractionError`] is per-variable and recoverable. The engine and
//!   orchestrator absorb it into an `ERROR` result, it never aborts a run.
//! - [`RegistryError`], [`IngestError`], [`ConfigError`] and
//!   [`AssembleError`] are fatal and stop the pipeline before (or instead
//!   of) writing a report.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while extracting a single variable.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// AI service unavailable or failed
    #[error("AI service error: {0}")]
    AI(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The AI answered, but not with the structure we asked for
    #[error("malformed {stage} response: {reason}")]
    MalformedResponse {
        stage: &'static str,
        reason: String,
        raw: String,
    },

    /// A query did not answer within the per-call timeout
    #[error("{stage} query timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl ExtractionError {
    /// Raw response text attached to the error, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractionError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Fatal errors while loading the variable registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("registry CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("registry is missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("section {section_id}: unrecognized complexity label '{label}'")]
    UnknownComplexity { section_id: String, label: String },

    #[error("section {section_id}: unrecognized availability value '{value}'")]
    UnknownAvailability { section_id: String, value: String },

    #[error("duplicate section id '{section_id}' at row {row}")]
    DuplicateSection { section_id: String, row: usize },

    #[error("no variables loaded from {}", path.display())]
    Empty { path: PathBuf },
}

/// Fatal errors while building the document store.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("protocol not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read protocol: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported protocol format '{extension}': use .txt, .pdf or .docx")]
    UnsupportedFormat { extension: String },

    /// The file has a supported extension but its contents could not be read
    #[error("failed to decode {format} protocol: {reason}")]
    Decode { format: &'static str, reason: String },

    #[error("no text could be extracted from {source_name}")]
    Empty { source_name: String },

    #[error("page {page} appears after page {previous}; pages must be in strictly increasing order")]
    PageOrder { previous: u32, page: u32 },
}

/// Fatal configuration errors, raised before any variable is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{variable} is not set")]
    MissingCredential { variable: &'static str },

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors while writing the report artefacts.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for registry loading.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type alias for ingest operations.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
