// In: src/bridge/format.rs

//! Defines the on-disk container and its constants.
//! This is the single source of truth for the byte layout every compressed
//! buffer starts with. Everything after the header is mode-specific and owned
//! by the pipeline.
//!
//! Layout (little-endian):
//! ```text
//! u16 magic | u16 version | u8 mode | u8 flags | u8 ndim | u8 dtype
//! ndim x u32 shape | u32 payload_len | payload [| u32 crc32]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

use crate::error::PhiError;
use crate::kernels::blob;

//==================================================================================
// I. Constants
//==================================================================================

/// The magic number identifying a phi container ("PH").
pub const MAGIC: u16 = 0x5048;
/// The current container format version.
pub const FORMAT_VERSION: u16 = 3150;
/// Size of the fixed part of the header, before the shape.
pub const FIXED_HEADER_LEN: usize = 8;
/// Size of the trailing CRC-32 when `flags::CHECKSUM` is set.
pub const CHECKSUM_LEN: usize = 4;

/// Bits of the container's `flags` byte.
pub mod flags {
    /// The payload went through the zstd entropy stage.
    pub const ENTROPY: u8 = 0x08;
    /// The embeddings payload was produced by block PQ.
    pub const HAS_PQ: u8 = 0x10;
    /// The embeddings payload carries a residual correction.
    pub const HAS_RESIDUAL: u8 = 0x20;
    /// A CRC-32 of the payload follows it.
    pub const CHECKSUM: u8 = 0x40;

    pub const KNOWN: u8 = ENTROPY | HAS_PQ | HAS_RESIDUAL | CHECKSUM;
}

//==================================================================================
// II. Mode & DType Tags
//==================================================================================

/// Which codec produced the payload.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    Embeddings = 0,
    TimeseriesDoD = 3,
    Symbolic = 4,
}

impl TryFrom<u8> for Mode {
    type Error = PhiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Embeddings),
            3 => Ok(Mode::TimeseriesDoD),
            4 => Ok(Mode::Symbolic),
            other => Err(PhiError::FormatError(format!("Unknown mode: {}", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Embeddings => "Embeddings",
            Mode::TimeseriesDoD => "TimeseriesDoD",
            Mode::Symbolic => "Symbolic",
        };
        f.write_str(name)
    }
}

/// Element type of the original input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    Bytes = 0,
    Float32 = 1,
}

impl TryFrom<u8> for DType {
    type Error = PhiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DType::Bytes),
            1 => Ok(DType::Float32),
            other => Err(PhiError::FormatError(format!("Unknown dtype tag: {}", other))),
        }
    }
}

impl Mode {
    /// The dtype every container of this mode carries.
    pub fn dtype(&self) -> DType {
        match self {
            Mode::Symbolic => DType::Bytes,
            Mode::Embeddings | Mode::TimeseriesDoD => DType::Float32,
        }
    }

    fn check_shape(&self, shape: &[u32]) -> Result<(), PhiError> {
        let ok = match self {
            Mode::Symbolic => shape.len() == 1,
            Mode::Embeddings => shape.len() >= 2,
            Mode::TimeseriesDoD => shape.len() == 2,
        };
        if ok {
            Ok(())
        } else {
            Err(PhiError::FormatError(format!(
                "{} container cannot have shape {:?}",
                self, shape
            )))
        }
    }
}

//==================================================================================
// III. The Container
//==================================================================================

/// A parsed container. `payload` is still entropy-coded when
/// `flags::ENTROPY` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub mode: Mode,
    pub flags: u8,
    pub shape: Vec<u32>,
    pub dtype: DType,
    pub payload: Vec<u8>,
}

/// Header fields only, as returned by `peek_info`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub format_version: u16,
    pub mode: Mode,
    pub flags: u8,
    pub shape: Vec<u32>,
    pub dtype: DType,
    pub header_size: usize,
    pub payload_size: usize,
    pub total_size: usize,
}

impl ContainerInfo {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Packs a container. When `flags` carries `CHECKSUM`, a CRC-32 of `payload`
/// is appended.
pub fn encode_container(
    mode: Mode,
    flags: u8,
    shape: &[usize],
    payload: &[u8],
) -> Result<Vec<u8>, PhiError> {
    if flags & !flags::KNOWN != 0 {
        return Err(PhiError::InternalError(format!(
            "Unknown container flags: {:#04x}",
            flags
        )));
    }
    let ndim = u8::try_from(shape.len()).map_err(|_| {
        PhiError::UnsupportedInput(format!("Arrays of rank {} are not supported", shape.len()))
    })?;
    let shape_u32 = shape
        .iter()
        .map(|&dim| blob::len_to_u32(dim, "Shape dimension"))
        .collect::<Result<Vec<_>, _>>()?;
    mode.check_shape(&shape_u32)
        .map_err(|e| PhiError::InternalError(e.to_string()))?;

    let mut out = Vec::with_capacity(
        FIXED_HEADER_LEN + 4 * shape.len() + 4 + payload.len() + CHECKSUM_LEN,
    );
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(mode as u8);
    out.push(flags);
    out.push(ndim);
    out.push(mode.dtype() as u8);
    for dim in &shape_u32 {
        out.extend_from_slice(&dim.to_le_bytes());
    }
    blob::write_blob(&mut out, payload)?;
    if flags & flags::CHECKSUM != 0 {
        out.extend_from_slice(&blob::compute_crc32(payload).to_le_bytes());
    }
    Ok(out)
}

/// Parses and validates everything up to and including the payload length.
fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<(ContainerInfo, usize), PhiError> {
    let total_size = cursor.get_ref().len();
    if total_size < FIXED_HEADER_LEN {
        return Err(PhiError::truncated("container header", FIXED_HEADER_LEN, total_size));
    }

    let magic = blob::read_u16(cursor, "magic")?;
    if magic != MAGIC {
        return Err(PhiError::FormatError(format!(
            "Invalid magic number: expected {:#06x}, got {:#06x}",
            MAGIC, magic
        )));
    }
    let version = blob::read_u16(cursor, "format version")?;
    if version != FORMAT_VERSION {
        return Err(PhiError::FormatError(format!(
            "Unsupported format version: expected {}, got {}",
            FORMAT_VERSION, version
        )));
    }

    let mode = Mode::try_from(blob::read_u8(cursor, "mode")?)?;
    let flags = blob::read_u8(cursor, "flags")?;
    if flags & !flags::KNOWN != 0 {
        return Err(PhiError::FormatError(format!("Unknown container flags: {:#04x}", flags)));
    }
    if flags & flags::HAS_RESIDUAL != 0 && flags & flags::HAS_PQ == 0 {
        return Err(PhiError::FormatError("Residual flag set without PQ".into()));
    }
    let ndim = blob::read_u8(cursor, "ndim")? as usize;
    let dtype = DType::try_from(blob::read_u8(cursor, "dtype")?)?;
    if dtype != mode.dtype() {
        return Err(PhiError::FormatError(format!(
            "{} container with dtype {:?}",
            mode, dtype
        )));
    }

    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(blob::read_u32(cursor, "shape")?);
    }
    mode.check_shape(&shape)?;

    let payload_size = blob::read_u32(cursor, "payload length")? as usize;
    let header_size = cursor.position() as usize;

    // SECURITY: the declared payload must fit in what is left of the buffer.
    let trailer = if flags & flags::CHECKSUM != 0 { CHECKSUM_LEN } else { 0 };
    let needed = payload_size.saturating_add(trailer);
    let available = total_size - header_size;
    if needed > available {
        return Err(PhiError::truncated("container payload", needed, available));
    }
    if needed < available {
        return Err(PhiError::FormatError(format!(
            "Container has {} trailing bytes",
            available - needed
        )));
    }

    let info = ContainerInfo {
        format_version: version,
        mode,
        flags,
        shape,
        dtype,
        header_size,
        payload_size,
        total_size,
    };
    Ok((info, header_size))
}

/// Reads the header without touching the payload.
pub fn peek_info(bytes: &[u8]) -> Result<ContainerInfo, PhiError> {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor).map(|(info, _)| info)
}

/// The exact inverse of `encode_container`. Verifies the checksum if present.
pub fn decode_container(bytes: &[u8]) -> Result<Container, PhiError> {
    let mut cursor = Cursor::new(bytes);
    let (info, start) = read_header(&mut cursor)?;
    let end = start + info.payload_size;
    let payload = &bytes[start..end];

    if info.has_flag(flags::CHECKSUM) {
        let mut crc = [0u8; CHECKSUM_LEN];
        crc.copy_from_slice(&bytes[end..end + CHECKSUM_LEN]);
        let expected = u32::from_le_bytes(crc);
        if !blob::verify_crc32(payload, expected) {
            return Err(PhiError::FormatError(format!(
                "Checksum mismatch: stored {:#010x}, computed {:#010x}",
                expected,
                blob::compute_crc32(payload)
            )));
        }
    }

    Ok(Container {
        mode: info.mode,
        flags: info.flags,
        shape: info.shape,
        dtype: info.dtype,
        payload: payload.to_vec(),
    })
}
