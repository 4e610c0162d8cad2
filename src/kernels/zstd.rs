//! This module contains the pure, stateless kernels for the entropy backend.
//!
//! This is the Final Stage transform of every codec. It takes a byte buffer
//! that has already been shaped by the preceding layers and applies Zstandard.
//! The interface is deliberately narrow so the backend stays a black box:
//!
//! ```text
//! u32 uncompressed_len | zstd frame (absent when uncompressed_len == 0)
//! ```
//!
//! This module is a safe, panic-free wrapper around the `zstd` crate.

use std::io::Read;

use crate::error::PhiError;

/// Size of the uncompressed-length prefix.
pub const LEN_PREFIX: usize = 4;

/// Upper bound on speculative pre-allocation while decoding untrusted input.
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

//==================================================================================
// 1. Public API
//==================================================================================

/// Compresses `input_bytes`, prepending the uncompressed size.
pub fn encode(input_bytes: &[u8], level: i32) -> Result<Vec<u8>, PhiError> {
    let uncompressed_len = u32::try_from(input_bytes.len()).map_err(|_| {
        PhiError::UnsupportedInput(format!(
            "Payload of {} bytes exceeds the 4 GiB container limit",
            input_bytes.len()
        ))
    })?;

    let mut output_buf = Vec::with_capacity(LEN_PREFIX + input_bytes.len() / 2);
    output_buf.extend_from_slice(&uncompressed_len.to_le_bytes());
    if input_bytes.is_empty() {
        return Ok(output_buf);
    }

    // Compress the data and append it to the buffer.
    let mut encoder = zstd::stream::Encoder::new(&mut output_buf, level)
        .map_err(|e| PhiError::ZstdError(e.to_string()))?;
    std::io::Write::write_all(&mut encoder, input_bytes)
        .map_err(|e| PhiError::ZstdError(e.to_string()))?;
    // `finish` is essential to finalize the Zstd frame.
    encoder
        .finish()
        .map_err(|e| PhiError::ZstdError(e.to_string()))?;

    Ok(output_buf)
}

/// Reverses `encode`, checking the decoded size against the prefix.
pub fn decode(input_bytes: &[u8]) -> Result<Vec<u8>, PhiError> {
    if input_bytes.len() < LEN_PREFIX {
        return Err(PhiError::truncated(
            "entropy length prefix",
            LEN_PREFIX,
            input_bytes.len(),
        ));
    }
    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(&input_bytes[..LEN_PREFIX]);
    let uncompressed_len = u32::from_le_bytes(len_bytes) as usize;

    // The actual compressed data starts *after* the header.
    let compressed_data = &input_bytes[LEN_PREFIX..];
    if uncompressed_len == 0 {
        return Ok(Vec::new());
    }

    let mut decompressed_data = Vec::with_capacity(uncompressed_len.min(MAX_PREALLOC));
    let decoder = zstd::stream::read::Decoder::new(compressed_data)
        .map_err(|e| PhiError::ZstdError(e.to_string()))?;
    // Read at most one byte past the declared size; anything longer is a mismatch.
    decoder
        .take(uncompressed_len as u64 + 1)
        .read_to_end(&mut decompressed_data)
        .map_err(|e| PhiError::ZstdError(e.to_string()))?;

    if decompressed_data.len() != uncompressed_len {
        return Err(PhiError::FormatError(format!(
            "Decompressed size does not match header. Expected {}, got {}.",
            uncompressed_len,
            decompressed_data.len()
        )));
    }

    Ok(decompressed_data)
}

//==================================================================================
// 2. Unit Tests
//==================================================================================
