// In: src/bridge/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Bridge Layer
// ====================================================================================
//
// The `bridge` is the sole public-facing API of the phi engine. It resolves
// presets, validates configuration and owns the container format. Everything
// below it (`pipeline`, `kernels`) works on plain slices and arrays.
//
// Data Flow (Compression):
//
//   1. [Stateless API (compress)]            -> Receives bytes, text or an array
//         |
//         `-> a. Resolves the preset into a `CompressionConfig`
//         |
//         `-> b. Calls the pure engine with the input and config
//
//   2. [Pipeline Engine (pipeline::orchestrator)] -> Detects, routes, entropy-codes
//         |
//         `-> Calls `format::encode_container` and returns the container bytes
//
//
// Data Flow (Decompression):
//
//   1. [Pipeline Engine (pipeline::orchestrator)] -> Receives `&[u8]`
//         |
//         `-> `format::decode_container`, entropy decode, dispatch on mode
//
//   2. [Stateless API (decompress)]           -> Returns `Decompressed` to the caller
//
// ====================================================================================
pub mod format;
pub mod stateless_api;

// --- Stateless API ---
pub use stateless_api::{compress, compress_with_config, decompress, inspect};

// --- Format Constants and Structs ---
pub use format::{ContainerInfo, DType, Mode};

#[cfg(test)]
mod tests;
