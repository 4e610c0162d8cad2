// In: src/pipeline/orchestrator.rs

//! Mode dispatch between the public API and the codecs.
//!
//! Compression validates the input, asks the detector for a verdict, routes
//! to the symbolic, timeseries or embeddings codec, runs the entropy stage and
//! wraps the result in a container. Decompression parses the container and
//! dispatches on its mode alone; the detector is never consulted.

use ndarray::{Array2, ArrayD, ArrayViewD, Ix2, IxDyn};

use crate::bridge::format::{self, flags, Mode};
use crate::config::CompressionConfig;
use crate::error::PhiError;
use crate::kernels::{dod_rle, symbolic, zstd};
use crate::pipeline::{detector, numeric};
use crate::types::{CompressInput, DataKind, Decompressed};

/// A finished container plus what was decided on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub kind: DataKind,
    pub mode: Mode,
    /// Payload size before the entropy stage.
    pub raw_payload_size: usize,
}

/// A codec payload ready for the entropy stage.
struct RawPayload {
    mode: Mode,
    flags: u8,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

//==================================================================================
// 1. Compression
//==================================================================================

/// Rank >= 2, at least one row and one column, all values finite.
fn validate_numeric(array: &ArrayViewD<f32>) -> Result<(), PhiError> {
    if array.ndim() < 2 {
        return Err(PhiError::UnsupportedInput(format!(
            "Numeric input must have rank >= 2, got shape {:?}",
            array.shape()
        )));
    }
    if array.is_empty() {
        return Err(PhiError::UnsupportedInput(format!(
            "Numeric input is empty, shape {:?}",
            array.shape()
        )));
    }
    if let Some(pos) = array.iter().position(|v| !v.is_finite()) {
        return Err(PhiError::UnsupportedInput(format!(
            "Numeric input contains a non-finite value at flat index {}",
            pos
        )));
    }
    Ok(())
}

/// Collapses every axis after the first: `[n, d1, d2, ..] -> [n, d1 * d2 * ..]`.
fn flatten_rows(array: &ArrayViewD<f32>) -> Result<Array2<f32>, PhiError> {
    let rows = array.shape()[0];
    let cols = array.len() / rows;
    Ok(Array2::from_shape_vec((rows, cols), array.iter().copied().collect())?)
}

fn encode_symbolic(bytes: &[u8], config: &CompressionConfig) -> Result<RawPayload, PhiError> {
    Ok(RawPayload {
        mode: Mode::Symbolic,
        flags: 0,
        shape: vec![bytes.len()],
        bytes: symbolic::compress(bytes, config.entropy_level)?,
    })
}

fn encode_numeric(
    array: &ArrayViewD<f32>,
    kind: DataKind,
    config: &CompressionConfig,
) -> Result<RawPayload, PhiError> {
    validate_numeric(array)?;
    let shape = array.shape().to_vec();

    if kind == DataKind::Timeseries {
        if let Ok(series) = array.view().into_dimensionality::<Ix2>() {
            return Ok(RawPayload {
                mode: Mode::TimeseriesDoD,
                flags: 0,
                shape,
                bytes: dod_rle::encode(series, config.timeseries_bits)?,
            });
        }
        log::debug!(
            "orchestrator: timeseries verdict on rank {} input, using the embeddings path",
            array.ndim()
        );
    }

    let matrix = flatten_rows(array)?;
    let encoded = numeric::compress(matrix.view(), config)?;
    let mut f = 0;
    if encoded.has_pq {
        f |= flags::HAS_PQ;
    }
    if encoded.has_residual {
        f |= flags::HAS_RESIDUAL;
    }
    Ok(RawPayload {
        mode: Mode::Embeddings,
        flags: f,
        shape,
        bytes: encoded.payload,
    })
}

/// Compresses `input` under an already validated `config`.
pub fn compress(
    input: &CompressInput,
    config: &CompressionConfig,
    filename_hint: Option<&str>,
) -> Result<Compressed, PhiError> {
    let kind = detector::detect(input, filename_hint);
    log::debug!("orchestrator: detected {}", kind);

    let raw = match input {
        CompressInput::Bytes(bytes) => encode_symbolic(bytes, config)?,
        CompressInput::Text(text) => encode_symbolic(text.as_bytes(), config)?,
        CompressInput::Numeric(array) => encode_numeric(array, kind, config)?,
    };

    let entropy_coded = zstd::encode(&raw.bytes, config.entropy_level)?;
    let mut container_flags = raw.flags | flags::ENTROPY;
    if config.embed_checksum {
        container_flags |= flags::CHECKSUM;
    }
    let bytes = format::encode_container(raw.mode, container_flags, &raw.shape, &entropy_coded)?;

    Ok(Compressed {
        bytes,
        kind,
        mode: raw.mode,
        raw_payload_size: raw.bytes.len(),
    })
}

//==================================================================================
// 2. Decompression
//==================================================================================

/// Entropy backend failures while decoding mean the payload is corrupt.
fn payload_error(err: PhiError) -> PhiError {
    match err {
        PhiError::ZstdError(msg) => {
            PhiError::FormatError(format!("Corrupt entropy-coded payload: {}", msg))
        }
        other => other,
    }
}

fn shape_mismatch(mode: Mode, decoded: &[usize], declared: &[usize]) -> PhiError {
    PhiError::FormatError(format!(
        "{} payload decoded to shape {:?}, header declares {:?}",
        mode, decoded, declared
    ))
}

/// Decodes a container produced by `compress`.
pub fn decompress(bytes: &[u8]) -> Result<Decompressed, PhiError> {
    let container = format::decode_container(bytes)?;
    let shape: Vec<usize> = container.shape.iter().map(|&d| d as usize).collect();

    let raw = if container.flags & flags::ENTROPY != 0 {
        zstd::decode(&container.payload).map_err(payload_error)?
    } else {
        container.payload
    };

    match container.mode {
        Mode::Symbolic => {
            let data = symbolic::decompress(&raw).map_err(payload_error)?;
            if data.len() != shape[0] {
                return Err(shape_mismatch(container.mode, &[data.len()], &shape));
            }
            Ok(Decompressed::Bytes(data))
        }
        Mode::TimeseriesDoD => {
            let series = dod_rle::decode_with_shape(&raw, (shape[0], shape[1]))?;
            if series.shape() != shape.as_slice() {
                return Err(shape_mismatch(container.mode, series.shape(), &shape));
            }
            Ok(Decompressed::Numeric(series.into_dyn()))
        }
        Mode::Embeddings => {
            let cols = shape[1..]
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(|| {
                    PhiError::FormatError(format!("{} shape {:?} overflows", container.mode, shape))
                })?;
            let decoded = numeric::decompress(&raw)?;
            let meta = &decoded.metadata;
            let has_pq = container.flags & flags::HAS_PQ != 0;
            let has_residual = container.flags & flags::HAS_RESIDUAL != 0;
            if meta.has_pq() != has_pq || meta.has_residual() != has_residual {
                return Err(PhiError::FormatError(format!(
                    "Container flags {:#04x} disagree with the numeric metadata",
                    container.flags
                )));
            }

            if decoded.matrix.dim() != (shape[0], cols) {
                let (r, c) = decoded.matrix.dim();
                return Err(shape_mismatch(container.mode, &[r, c], &shape));
            }
            let flat: Vec<f32> = decoded.matrix.iter().copied().collect();
            Ok(Decompressed::Numeric(ArrayD::from_shape_vec(IxDyn(&shape), flat)?))
        }
    }
}
