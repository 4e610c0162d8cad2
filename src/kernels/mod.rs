//! This module is the "Workshop" of the phi engine. It contains pure, stateless,
//! high-performance transformation functions.
//!
//! Each submodule implements one stage of a codec. Kernels know nothing about
//! containers, presets or data-type detection; the `pipeline` module composes
//! them.

pub mod blob;
pub mod dod_rle;
pub mod pca;
pub mod pq;
pub mod quantize;
pub mod residual;
pub mod symbolic;
pub mod zstd;
