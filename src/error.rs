// In: src/error.rs

//! This module defines the single, unified error type for the entire phi engine.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Degenerate data (constant columns, fewer rows than centroids, empty clusters)
//! is never an error: those paths have well-defined fallbacks in the kernels.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhiError {
    // =========================================================================
    // === High-Level, Semantic Errors
    // =========================================================================
    /// A container, payload, blob or opcode stream is malformed or truncated.
    /// Always fatal; never retried.
    #[error("Format error: {0}")]
    FormatError(String),

    /// The input handed to `compress` is outside what the engine accepts.
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// A user-supplied configuration carries out-of-range tunables.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from `ndarray` while reshaping decoded buffers.
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while parsing a config override.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    // =========================================================================
    // === Low-Level Kernel Errors
    // =========================================================================
    #[error("Zstd operation failed: {0}")]
    ZstdError(String),

    #[error("Buffer length mismatch: expected a multiple of {0}, got {1}")]
    BufferMismatch(usize, usize),
}

impl PhiError {
    /// Shorthand used by the parsers for truncation errors.
    pub(crate) fn truncated(what: &str, needed: usize, available: usize) -> Self {
        PhiError::FormatError(format!(
            "Truncated {}: need {} bytes, have {}",
            what, needed, available
        ))
    }
}
