//! This module defines the core, strongly-typed data representations used
//! throughout the phi engine.
//!
//! It includes the detector's `DataKind`, the input/output unions handed to and
//! returned from the public API, and the `CodeWidth` tag used for packed codes.

pub mod code_width;
pub mod data_kind;

// Re-export the main type(s) for easier access.
pub use code_width::CodeWidth;
pub use data_kind::{CompressInput, DataKind, Decompressed};
