//! This module provides a set of shared, low-level utility functions used
//! throughout the phi engine.
//!
//! Its primary responsibilities include:
//! 1.  Providing safe, validated conversions between raw byte slices and typed slices.
//! 2.  Narrowing `u32` code streams to their packed on-disk width and back.
//!
//! All typed buffers are written in host byte order through `bytemuck`; the
//! container format is little-endian, so big-endian targets are rejected at
//! compile time.

use crate::error::PhiError;
use crate::traits::CodeWord;
use crate::types::CodeWidth;

const _: () = assert!(
    cfg!(target_endian = "little"),
    "the phi container format is little-endian and typed buffers are cast in host order"
);

//==================================================================================
// 1. Core Utility Functions
//==================================================================================

/// Copies a typed slice into a fresh byte vector.
pub fn typed_slice_to_bytes<T: bytemuck::Pod>(data: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(data).to_vec()
}

/// Reads a byte slice as a vector of `T`, tolerating arbitrary alignment.
///
/// # Errors
/// Returns `PhiError::BufferMismatch` if the length is not a multiple of `size_of::<T>()`.
pub fn bytes_to_typed_vec<T: bytemuck::Pod>(bytes: &[u8]) -> Result<Vec<T>, PhiError> {
    let size = std::mem::size_of::<T>();
    if bytes.len() % size != 0 {
        return Err(PhiError::BufferMismatch(size, bytes.len()));
    }
    Ok(bytes
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

//==================================================================================
// 2. Code Packing
//==================================================================================

fn pack_as<T: CodeWord>(codes: &[u32]) -> Result<Vec<u8>, PhiError> {
    let narrowed = codes
        .iter()
        .map(|&c| {
            T::from(c).ok_or_else(|| {
                PhiError::InternalError(format!("Code {} does not fit in {}", c, T::WIDTH))
            })
        })
        .collect::<Result<Vec<T>, PhiError>>()?;
    Ok(typed_slice_to_bytes(&narrowed))
}

fn unpack_as<T: CodeWord>(bytes: &[u8]) -> Result<Vec<u32>, PhiError> {
    let typed: Vec<T> = bytes_to_typed_vec(bytes)?;
    // Widening to u32 never fails for the supported widths.
    Ok(typed.into_iter().map(|c| c.to_u32().unwrap_or(0)).collect())
}

/// Narrows a `u32` code stream to `width` bytes per code.
pub fn pack_codes(codes: &[u32], width: CodeWidth) -> Result<Vec<u8>, PhiError> {
    match width {
        CodeWidth::U8 => pack_as::<u8>(codes),
        CodeWidth::U16 => pack_as::<u16>(codes),
        CodeWidth::U32 => pack_as::<u32>(codes),
    }
}

/// Widens a packed code stream back to `u32`.
pub fn unpack_codes(bytes: &[u8], width: CodeWidth) -> Result<Vec<u32>, PhiError> {
    match width {
        CodeWidth::U8 => unpack_as::<u8>(bytes),
        CodeWidth::U16 => unpack_as::<u16>(bytes),
        CodeWidth::U32 => unpack_as::<u32>(bytes),
    }
}
