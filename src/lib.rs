//! This file is the root of the `phi_engine` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`pipeline`, `kernels`, etc.)
//!     so the Rust compiler knows they exist.
//! 2.  Re-exporting the small public surface: `compress`, `decompress`,
//!     `inspect` and the types they take and return.
//!
//! ```
//! let compressed = phi_engine::compress("Hello, World! ".repeat(50).as_str(), "phi-global", None)?;
//! let restored = phi_engine::decompress(&compressed)?;
//! assert_eq!(restored.into_bytes().unwrap(), "Hello, World! ".repeat(50).as_bytes());
//! # Ok::<(), phi_engine::PhiError>(())
//! ```

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The golden ratio. Drives match tie-breaking in the symbolic codec and the
/// seeding percentile of the clustering initializer.
pub const PHI: f64 = 1.618033988749895;

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod bridge;
pub mod config;
pub mod error;
pub mod kernels;
pub mod metrics;
pub mod pipeline;
pub mod types;

mod traits;
mod utils;

//==================================================================================
// 2. Public Re-exports
//==================================================================================
pub use bridge::{compress, compress_with_config, decompress, inspect, ContainerInfo, Mode};
pub use config::{resolve_preset, CompressionConfig, Preset};
pub use error::PhiError;
pub use observability::enable_verbose_logging;
pub use types::{CompressInput, DataKind, Decompressed};
