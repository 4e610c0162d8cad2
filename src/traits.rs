//! This module defines shared traits used across different kernels.

use num_traits::{PrimInt, Unsigned};

use crate::types::CodeWidth;

/// An unsigned integer type that can hold quantization levels or centroid
/// indices on the wire. Every code is carried as `u32` in memory and narrowed
/// to one of these types when packed.
pub trait CodeWord: PrimInt + Unsigned + bytemuck::Pod {
    /// The on-disk width tag for this type.
    const WIDTH: CodeWidth;
}

// Implement the trait for all supported code widths.
macro_rules! impl_code_word {
    ($T:ty, $W:expr) => {
        impl CodeWord for $T {
            const WIDTH: CodeWidth = $W;
        }
    };
}

impl_code_word!(u8, CodeWidth::U8);
impl_code_word!(u16, CodeWidth::U16);
impl_code_word!(u32, CodeWidth::U32);
