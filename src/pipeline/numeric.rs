// In: src/pipeline/numeric.rs

//! The embeddings pipeline: outer PCA, then either scalar quantization
//! (Phase-1) or block product quantization with an optional residual pass
//! (Phase-2).
//!
//! Payload layout (before the container's entropy stage):
//! ```text
//! NumericMetadata | blob(primary codes) [| blob(residual codes)]
//! ```
//! Primary codes are the scalar codes for Phase-1 or the PQ codes for Phase-2,
//! each packed at its narrowest width.

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Cursor;

use crate::config::CompressionConfig;
use crate::error::PhiError;
use crate::kernels::blob;
use crate::kernels::pca::pca_reduce;
use crate::kernels::pq::{BlockProductQuantizer, PqSettings};
use crate::kernels::quantize;
use crate::kernels::residual::ResidualCorrection;
use crate::pipeline::metadata::{NumericMetadata, ResidualSection, StageMetadata};
use crate::types::CodeWidth;
use crate::utils::{pack_codes, unpack_codes};

/// The encoded payload plus which optional stages ran.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedNumeric {
    pub payload: Vec<u8>,
    pub has_pq: bool,
    pub has_residual: bool,
}

fn write_codes(buf: &mut Vec<u8>, codes: &[u32], width: CodeWidth) -> Result<(), PhiError> {
    blob::write_blob(buf, &pack_codes(codes, width)?)
}

fn read_codes(cursor: &mut Cursor<&[u8]>, width: CodeWidth, expected: usize) -> Result<Vec<u32>, PhiError> {
    let bytes = blob::read_blob(cursor)?;
    let codes = unpack_codes(bytes, width).map_err(|e| {
        PhiError::FormatError(format!("Code stream is not a {} array: {}", width, e))
    })?;
    if codes.len() != expected {
        return Err(PhiError::FormatError(format!(
            "Code stream holds {} codes, expected {}",
            codes.len(),
            expected
        )));
    }
    Ok(codes)
}

/// Compresses a `[rows, d]` matrix according to `config`.
pub fn compress(matrix: ArrayView2<f32>, config: &CompressionConfig) -> Result<EncodedNumeric, PhiError> {
    let rows = matrix.nrows();
    let (reduced, pca) = pca_reduce(matrix, config.target_variance)?;
    let k = pca.k();

    let mut payload = Vec::new();
    if !config.use_pq {
        let quantized = quantize::quantize(reduced.view(), config.quant_bits, config.per_component)?;
        let width = quantized.params.width()?;
        let meta = NumericMetadata {
            rows,
            pca,
            stage: StageMetadata::Scalar(quantized.params),
        };
        meta.write(&mut payload)?;
        write_codes(&mut payload, &quantized.codes, width)?;
        log::debug!(
            "numeric: phase-1 {}x{} -> k = {}, {} codes at {}",
            rows,
            matrix.ncols(),
            k,
            quantized.codes.len(),
            width
        );
        return Ok(EncodedNumeric {
            payload,
            has_pq: false,
            has_residual: false,
        });
    }

    let settings = PqSettings {
        n_blocks: config.pq_blocks,
        n_centroids: config.pq_centroids,
        max_iter: config.pq_max_iter,
    };
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let pq = BlockProductQuantizer::fit(reduced.view(), &settings, &mut rng)?;
    let pq_codes = pq.encode(reduced.view())?;
    let pq_width = pq.code_width()?;

    let residual = if config.residual_enabled() {
        let recon = pq.decode(&pq_codes, rows)?;
        Some(ResidualCorrection::fit(
            reduced.view(),
            recon.view(),
            config.residual_variance,
            config.residual_bits,
        )?)
    } else {
        None
    };

    let meta = NumericMetadata {
        rows,
        pca,
        stage: StageMetadata::Product {
            pq,
            residual: residual.as_ref().map(|r| ResidualSection {
                transform: r.transform.clone(),
                params: r.params.clone(),
            }),
        },
    };
    meta.write(&mut payload)?;
    write_codes(&mut payload, &pq_codes, pq_width)?;
    if let Some(r) = &residual {
        write_codes(&mut payload, &r.codes, r.params.width()?)?;
    }
    log::debug!(
        "numeric: phase-2 {}x{} -> k = {}, {} blocks x {} centroids, residual k = {:?}",
        rows,
        matrix.ncols(),
        k,
        config.pq_blocks,
        config.pq_centroids,
        residual.as_ref().map(ResidualCorrection::k)
    );

    Ok(EncodedNumeric {
        payload,
        has_pq: true,
        has_residual: residual.is_some(),
    })
}

/// The reconstruction plus the record that produced it.
#[derive(Debug, Clone)]
pub struct DecodedNumeric {
    pub matrix: Array2<f32>,
    pub metadata: NumericMetadata,
}

/// Reverses `compress`, returning a `[rows, d]` matrix.
pub fn decompress(payload: &[u8]) -> Result<DecodedNumeric, PhiError> {
    let mut cursor = Cursor::new(payload);
    let metadata = NumericMetadata::read(&mut cursor)?;
    let rows = metadata.rows;
    let k = metadata.pca.k();
    let cell_count = |cols: usize| {
        rows.checked_mul(cols)
            .ok_or_else(|| PhiError::FormatError(format!("{}x{} overflows", rows, cols)))
    };

    let reduced = match &metadata.stage {
        StageMetadata::Scalar(params) => {
            let codes = read_codes(&mut cursor, params.width()?, cell_count(k)?)?;
            quantize::dequantize(&codes, (rows, k), params)?
        }
        StageMetadata::Product { pq, residual } => {
            let codes = read_codes(&mut cursor, pq.code_width()?, cell_count(pq.n_blocks())?)?;
            let mut recon = pq.decode(&codes, rows)?;
            if let Some(section) = residual {
                let residual_codes = read_codes(
                    &mut cursor,
                    section.params.width()?,
                    cell_count(section.transform.k())?,
                )?;
                let correction = ResidualCorrection {
                    transform: section.transform.clone(),
                    params: section.params.clone(),
                    codes: residual_codes,
                };
                correction.apply(&mut recon)?;
            }
            recon
        }
    };

    if (cursor.position() as usize) != payload.len() {
        return Err(PhiError::FormatError(format!(
            "Numeric payload has {} trailing bytes",
            payload.len() - cursor.position() as usize
        )));
    }

    let matrix = metadata.pca.reconstruct(reduced.view())?;
    Ok(DecodedNumeric { matrix, metadata })
}
