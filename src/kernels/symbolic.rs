//! This module contains the symbolic (text/bytes) codec: a greedy sliding-window
//! dictionary matcher that emits an opcode stream, the opcode wire format, and
//! the entropy-coded payload built from it.
//!
//! The scan is a small state machine over the input:
//! 1. A run of 3+ identical bytes becomes `Run(byte, count)`, capped at 255.
//! 2. Otherwise the longest backward match of 3..=255 bytes inside the window
//!    becomes `Match(offset, length)`. Among equal-length candidates the offset
//!    closest to `floor(window_span / φ)` wins; a strictly longer match always wins.
//! 3. Otherwise the byte is emitted as `Literal(byte)`.
//!
//! Matches may overlap the bytes they produce (`offset < length`); the decoder
//! copies one byte at a time so this reconstructs correctly.
//!
//! Payload layout:
//! ```text
//! u32 original_len | u32 opcode_count | entropy(serialized opcodes)
//! ```

use std::io::Cursor;

use crate::error::PhiError;
use crate::kernels::{blob, zstd};
use crate::PHI;

//==================================================================================
// 0. Constants
//==================================================================================

/// Default sliding-window size. Offsets must fit the `u16` wire field.
pub const WINDOW_SIZE: usize = 32768;
pub const MIN_MATCH: usize = 3;
pub const MAX_MATCH: usize = 255;
pub const MAX_RUN: usize = 255;
/// Most candidates visited per position; bounds work on degenerate inputs.
pub const MAX_CHAIN: usize = 8192;

const HASH_BITS: u32 = 15;
const NO_POS: usize = usize::MAX;
/// Cap on speculative pre-allocation from an untrusted length header.
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

const TAG_LITERAL: u8 = 0;
const TAG_MATCH: u8 = 1;
const TAG_RUN: u8 = 2;

//==================================================================================
// 1. Opcode Model
//==================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Literal(u8),
    /// Copy `length` bytes starting `offset` bytes back from the output end.
    Match { offset: u16, length: u8 },
    Run { byte: u8, count: u8 },
}

impl Opcode {
    /// Number of output bytes this opcode produces.
    pub fn output_len(&self) -> usize {
        match self {
            Opcode::Literal(_) => 1,
            Opcode::Match { length, .. } => *length as usize,
            Opcode::Run { count, .. } => *count as usize,
        }
    }
}

//==================================================================================
// 2. Dictionary Matcher
//==================================================================================

/// The greedy sliding-window matcher. Holds configuration only; all scan
/// state lives inside a single `encode` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryMatcher {
    window_size: usize,
}

impl Default for DictionaryMatcher {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
        }
    }
}

impl DictionaryMatcher {
    /// Creates a matcher with a custom window, clamped to `1..=u16::MAX`.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.clamp(1, u16::MAX as usize),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Scans `data` into an opcode stream.
    pub fn encode(&self, data: &[u8]) -> Vec<Opcode> {
        let n = data.len();
        let mut opcodes = Vec::new();
        let mut chains = HashChains::new(n);
        let mut i = 0;

        while i < n {
            chains.insert_until(data, i);

            // Runs of 3+ identical bytes.
            if i + 2 < n && data[i] == data[i + 1] && data[i + 1] == data[i + 2] {
                let byte = data[i];
                let mut count = 1;
                while i + count < n && data[i + count] == byte && count < MAX_RUN {
                    count += 1;
                }
                opcodes.push(Opcode::Run {
                    byte,
                    count: count as u8,
                });
                i += count;
                continue;
            }

            match self.longest_match(data, i, &chains) {
                Some((offset, length)) => {
                    opcodes.push(Opcode::Match {
                        offset: offset as u16,
                        length: length as u8,
                    });
                    i += length;
                }
                None => {
                    opcodes.push(Opcode::Literal(data[i]));
                    i += 1;
                }
            }
        }

        opcodes
    }

    /// Finds the longest match for position `i`, breaking length ties toward
    /// the golden-ratio point of the window.
    fn longest_match(&self, data: &[u8], i: usize, chains: &HashChains) -> Option<(usize, usize)> {
        let n = data.len();
        if i + MIN_MATCH > n {
            return None;
        }
        let window_start = i.saturating_sub(self.window_size);
        let target_offset = ((i - window_start) as f64 / PHI).floor() as usize;

        let mut best: Option<(usize, usize)> = None;
        let mut best_dist = usize::MAX;
        let mut candidate = chains.head_for(data, i);
        let mut visited = 0;

        // Chains are ordered nearest-first, so the first out-of-window entry ends the walk.
        while candidate != NO_POS && candidate >= window_start && visited < MAX_CHAIN {
            let mut length = 0;
            while length < MAX_MATCH && i + length < n && data[candidate + length] == data[i + length]
            {
                length += 1;
            }

            if length >= MIN_MATCH {
                let offset = i - candidate;
                let dist = offset.abs_diff(target_offset);
                let better = match best {
                    None => true,
                    Some((best_offset, best_len)) => {
                        length > best_len
                            || (length == best_len
                                && (dist < best_dist || (dist == best_dist && offset > best_offset)))
                    }
                };
                if better {
                    best = Some((offset, length));
                    best_dist = dist;
                }
            }

            candidate = chains.prev[candidate];
            visited += 1;
        }

        best
    }
}

/// Hash-chain index over every 3-byte prefix seen so far.
struct HashChains {
    head: Vec<usize>,
    prev: Vec<usize>,
    inserted: usize,
}

impl HashChains {
    fn new(n: usize) -> Self {
        Self {
            head: vec![NO_POS; 1 << HASH_BITS],
            prev: vec![NO_POS; n],
            inserted: 0,
        }
    }

    fn hash(data: &[u8], pos: usize) -> usize {
        let key = (data[pos] as u32) | ((data[pos + 1] as u32) << 8) | ((data[pos + 2] as u32) << 16);
        (key.wrapping_mul(2654435761) >> (32 - HASH_BITS)) as usize
    }

    /// Indexes every position before `end` that starts a full 3-byte prefix.
    fn insert_until(&mut self, data: &[u8], end: usize) {
        while self.inserted < end {
            let pos = self.inserted;
            if pos + MIN_MATCH <= data.len() {
                let h = Self::hash(data, pos);
                self.prev[pos] = self.head[h];
                self.head[h] = pos;
            }
            self.inserted += 1;
        }
    }

    fn head_for(&self, data: &[u8], pos: usize) -> usize {
        self.head[Self::hash(data, pos)]
    }
}

/// Replays an opcode stream left-to-right.
///
/// # Errors
/// A match reaching before the start of the output is a `FormatError`.
pub fn decode_opcodes(opcodes: &[Opcode], expected_len: usize) -> Result<Vec<u8>, PhiError> {
    let mut output = Vec::with_capacity(expected_len.min(MAX_PREALLOC));
    for opcode in opcodes {
        match *opcode {
            Opcode::Literal(byte) => output.push(byte),
            Opcode::Match { offset, length } => {
                let offset = offset as usize;
                if offset == 0 || offset > output.len() {
                    return Err(PhiError::FormatError(format!(
                        "Match offset {} outside decoded output of {} bytes",
                        offset,
                        output.len()
                    )));
                }
                let mut src = output.len() - offset;
                // Byte at a time so overlapping copies see freshly written bytes.
                for _ in 0..length {
                    let byte = output[src];
                    output.push(byte);
                    src += 1;
                }
            }
            Opcode::Run { byte, count } => {
                output.resize(output.len() + count as usize, byte);
            }
        }
    }
    Ok(output)
}

//==================================================================================
// 3. Opcode Wire Format
//==================================================================================

/// Serializes opcodes as a tag byte plus fixed-width fields.
pub fn serialize_opcodes(opcodes: &[Opcode]) -> Vec<u8> {
    let mut out = Vec::with_capacity(opcodes.len() * 3);
    for opcode in opcodes {
        match *opcode {
            Opcode::Literal(byte) => {
                out.push(TAG_LITERAL);
                out.push(byte);
            }
            Opcode::Match { offset, length } => {
                out.push(TAG_MATCH);
                out.extend_from_slice(&offset.to_le_bytes());
                out.push(length);
            }
            Opcode::Run { byte, count } => {
                out.push(TAG_RUN);
                out.push(byte);
                out.push(count);
            }
        }
    }
    out
}

/// Parses exactly `count` opcodes, requiring the buffer to be fully consumed.
pub fn deserialize_opcodes(bytes: &[u8], count: usize) -> Result<Vec<Opcode>, PhiError> {
    let mut cursor = Cursor::new(bytes);
    // Each opcode takes at least two bytes.
    let mut opcodes = Vec::with_capacity(count.min(bytes.len() / 2));
    for _ in 0..count {
        let tag = blob::read_u8(&mut cursor, "opcode tag")?;
        let opcode = match tag {
            TAG_LITERAL => Opcode::Literal(blob::read_u8(&mut cursor, "literal")?),
            TAG_MATCH => {
                let offset = blob::read_u16(&mut cursor, "match offset")?;
                let length = blob::read_u8(&mut cursor, "match length")?;
                Opcode::Match { offset, length }
            }
            TAG_RUN => {
                let byte = blob::read_u8(&mut cursor, "run byte")?;
                let count = blob::read_u8(&mut cursor, "run count")?;
                Opcode::Run { byte, count }
            }
            other => {
                return Err(PhiError::FormatError(format!(
                    "Unknown opcode tag {} at offset {}",
                    other,
                    cursor.position() - 1
                )))
            }
        };
        opcodes.push(opcode);
    }
    if (cursor.position() as usize) != bytes.len() {
        return Err(PhiError::FormatError(format!(
            "Opcode stream has {} trailing bytes",
            bytes.len() - cursor.position() as usize
        )));
    }
    Ok(opcodes)
}

//==================================================================================
// 4. Public Codec API
//==================================================================================

/// Compresses bytes into a symbolic payload.
pub fn compress(data: &[u8], entropy_level: i32) -> Result<Vec<u8>, PhiError> {
    let opcodes = DictionaryMatcher::default().encode(data);
    let serialized = serialize_opcodes(&opcodes);
    log::debug!(
        "symbolic: {} bytes -> {} opcodes ({} serialized bytes)",
        data.len(),
        opcodes.len(),
        serialized.len()
    );

    let mut payload = Vec::with_capacity(8 + serialized.len() / 2);
    payload.extend_from_slice(&blob::len_to_u32(data.len(), "symbolic input")?.to_le_bytes());
    payload.extend_from_slice(&blob::len_to_u32(opcodes.len(), "opcode count")?.to_le_bytes());
    payload.extend_from_slice(&zstd::encode(&serialized, entropy_level)?);
    Ok(payload)
}

/// Reverses `compress`. Truncated or malformed streams are fatal.
pub fn decompress(payload: &[u8]) -> Result<Vec<u8>, PhiError> {
    let mut cursor = Cursor::new(payload);
    let original_len = blob::read_u32(&mut cursor, "symbolic original length")? as usize;
    let opcode_count = blob::read_u32(&mut cursor, "symbolic opcode count")? as usize;
    let serialized = zstd::decode(&payload[cursor.position() as usize..])?;

    let opcodes = deserialize_opcodes(&serialized, opcode_count)?;
    let output = decode_opcodes(&opcodes, original_len)?;
    if output.len() != original_len {
        return Err(PhiError::FormatError(format!(
            "Symbolic stream decoded to {} bytes, header declares {}",
            output.len(),
            original_len
        )));
    }
    Ok(output)
}

//==================================================================================
// 5. Unit Tests
//==================================================================================
