//! The canonical representation of packed integer widths.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PhiError;

/// The narrowest unsigned integer type used to store a stream of codes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodeWidth {
    U8,
    U16,
    U32,
}

impl CodeWidth {
    /// The smallest width able to hold `max_value`.
    pub fn for_max_value(max_value: u64) -> Result<Self, PhiError> {
        match max_value {
            v if v <= u8::MAX as u64 => Ok(Self::U8),
            v if v <= u16::MAX as u64 => Ok(Self::U16),
            v if v <= u32::MAX as u64 => Ok(Self::U32),
            v => Err(PhiError::InvalidConfig(format!(
                "Code value {} does not fit in 32 bits",
                v
            ))),
        }
    }

    /// The width holding every level of a `bits`-bit quantizer (`2^bits - 1`).
    pub fn for_bits(bits: u8) -> Result<Self, PhiError> {
        if bits == 0 || bits > 32 {
            return Err(PhiError::InvalidConfig(format!(
                "Bit depth must be within 1..=32, got {}",
                bits
            )));
        }
        Self::for_max_value((1u64 << bits) - 1)
    }

    /// The width holding every index of a codebook with `n_centroids` entries.
    pub fn for_centroids(n_centroids: usize) -> Result<Self, PhiError> {
        Self::for_max_value(n_centroids.saturating_sub(1) as u64)
    }

    /// Size in bytes of one packed code.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

impl fmt::Display for CodeWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
