//! Error types for Project Flare.

use thiserror::Error;

/// Top-level error type for Flare operations.
#[derive(Debug, Error)]
pub enum FlareError {
    /// GPU-related errors
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Effect document errors
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// GPU-specific errors.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Failed to initialize GPU
    #[error("GPU initialization failed: {0}")]
    InitFailed(String),

    /// Buffer allocation failed
    #[error("Buffer allocation failed: {0}")]
    BufferAlloc(String),

    /// Compute dispatch error
    #[error("Compute dispatch error: {0}")]
    DispatchError(String),

    /// Buffer readback failed
    #[error("GPU readback failed: {0}")]
    Readback(String),
}

/// Effect document load/save errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document text is not valid for the schema
    #[error("Failed to parse effect document: {0}")]
    Parse(String),

    /// Failed to serialize the document
    #[error("Failed to serialize effect document: {0}")]
    Serialize(String),

    /// Document written by an incompatible schema
    #[error("Unsupported document version: expected {expected}, found {found}")]
    UnsupportedVersion {
        /// Highest version this build reads
        expected: u32,
        /// Version found in the document
        found: u32,
    },
}

/// Result type alias for Flare operations.
pub type FlareResult<T> = Result<T, FlareError>;

/// Result type alias for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

/// Result type alias for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;
