// In: src/pipeline/metadata.rs

//! The self-describing metadata record at the head of every numeric payload.
//!
//! The record is a tagged binary structure rather than a key/value map, so each
//! pipeline variant carries exactly the fields it needs:
//!
//! ```text
//! u8  version
//! u8  variant            0 = Scalar (Phase-1), 1 = Product (Phase-2)
//! u32 rows
//! pca                    u32 d | u32 k | blob(components, d*k f32) | blob(mean, d f32)
//! Scalar:  quant         u8 bits | blob(scales f32) | blob(zeros f32)
//! Product: u32 n_blocks | u32 n_centroids | u32 block_size | u32 dim
//!          n_blocks x blob(centroids, n_centroids*block_size f32)
//!          u8 has_residual [pca | quant]
//! ```
//!
//! All arrays are little-endian `f32` in `u32` length-prefixed blobs. The packed
//! code streams follow the record and are owned by `pipeline::numeric`.

use ndarray::{Array1, Array2};
use std::io::Cursor;

use crate::error::PhiError;
use crate::kernels::blob;
use crate::kernels::pca::PcaTransform;
use crate::kernels::pq::{BlockProductQuantizer, Codebook};
use crate::kernels::quantize::QuantParams;
use crate::utils::{bytes_to_typed_vec, typed_slice_to_bytes};

//==================================================================================
// Format Constants
//==================================================================================

pub const METADATA_VERSION: u8 = 1;

const VARIANT_SCALAR: u8 = 0;
const VARIANT_PRODUCT: u8 = 1;

//==================================================================================
// Public Structs
//==================================================================================

/// The quantization stage that follows the outer PCA.
#[derive(Debug, Clone, PartialEq)]
pub enum StageMetadata {
    /// Phase-1: per-component or global scalar quantization.
    Scalar(QuantParams),
    /// Phase-2: block product quantization, optionally with a residual pass.
    Product {
        pq: BlockProductQuantizer,
        residual: Option<ResidualSection>,
    },
}

/// Everything needed to invert a residual pass except its codes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualSection {
    pub transform: PcaTransform,
    pub params: QuantParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericMetadata {
    pub rows: usize,
    pub pca: PcaTransform,
    pub stage: StageMetadata,
}

//==================================================================================
// Core Implementation
//==================================================================================

impl NumericMetadata {
    pub fn has_pq(&self) -> bool {
        matches!(self.stage, StageMetadata::Product { .. })
    }

    pub fn has_residual(&self) -> bool {
        matches!(
            self.stage,
            StageMetadata::Product {
                residual: Some(_),
                ..
            }
        )
    }

    /// Appends the record to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), PhiError> {
        buf.push(METADATA_VERSION);
        buf.push(match self.stage {
            StageMetadata::Scalar(_) => VARIANT_SCALAR,
            StageMetadata::Product { .. } => VARIANT_PRODUCT,
        });
        write_u32(buf, self.rows, "row count")?;
        write_pca(buf, &self.pca)?;

        match &self.stage {
            StageMetadata::Scalar(params) => write_quant(buf, params)?,
            StageMetadata::Product { pq, residual } => {
                write_u32(buf, pq.n_blocks(), "PQ block count")?;
                write_u32(buf, pq.n_centroids(), "PQ centroid count")?;
                write_u32(buf, pq.block_size, "PQ block size")?;
                write_u32(buf, pq.dim, "PQ width")?;
                for codebook in &pq.codebooks {
                    write_f32_blob(buf, codebook.centroids.iter().copied())?;
                }
                match residual {
                    Some(section) => {
                        buf.push(1);
                        write_pca(buf, &section.transform)?;
                        write_quant(buf, &section.params)?;
                    }
                    None => buf.push(0),
                }
            }
        }
        Ok(())
    }

    /// Parses a record written by `write`, validating every internal dimension.
    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, PhiError> {
        let version = blob::read_u8(cursor, "metadata version")?;
        if version != METADATA_VERSION {
            return Err(PhiError::FormatError(format!(
                "Unsupported metadata version: expected {}, got {}",
                METADATA_VERSION, version
            )));
        }
        let variant = blob::read_u8(cursor, "metadata variant")?;
        let rows = blob::read_u32(cursor, "row count")? as usize;
        let pca = read_pca(cursor)?;
        let k = pca.k();

        let stage = match variant {
            VARIANT_SCALAR => {
                let params = read_quant(cursor)?;
                params.check_columns(k)?;
                StageMetadata::Scalar(params)
            }
            VARIANT_PRODUCT => {
                let n_blocks = blob::read_u32(cursor, "PQ block count")? as usize;
                let n_centroids = blob::read_u32(cursor, "PQ centroid count")? as usize;
                let block_size = blob::read_u32(cursor, "PQ block size")? as usize;
                let dim = blob::read_u32(cursor, "PQ width")? as usize;
                if dim != k {
                    return Err(PhiError::FormatError(format!(
                        "PQ width {} does not match PCA k = {}",
                        dim, k
                    )));
                }
                let mut codebooks = Vec::with_capacity(n_blocks.min(1024));
                for _ in 0..n_blocks {
                    let centroids = read_f32_matrix(cursor, n_centroids, block_size, "codebook")?;
                    codebooks.push(Codebook { centroids });
                }
                let pq = BlockProductQuantizer {
                    codebooks,
                    block_size,
                    dim,
                };
                pq.validate()?;

                let residual = match blob::read_u8(cursor, "residual flag")? {
                    0 => None,
                    1 => {
                        let transform = read_pca(cursor)?;
                        if transform.input_dim() != k {
                            return Err(PhiError::FormatError(format!(
                                "Residual PCA input {} does not match k = {}",
                                transform.input_dim(),
                                k
                            )));
                        }
                        let params = read_quant(cursor)?;
                        params.check_columns(transform.k())?;
                        Some(ResidualSection { transform, params })
                    }
                    other => {
                        return Err(PhiError::FormatError(format!(
                            "Invalid residual flag {}",
                            other
                        )))
                    }
                };
                StageMetadata::Product { pq, residual }
            }
            other => {
                return Err(PhiError::FormatError(format!(
                    "Unknown metadata variant {}",
                    other
                )))
            }
        };

        Ok(Self { rows, pca, stage })
    }
}

//==================================================================================
// Field Helpers
//==================================================================================

fn write_u32(buf: &mut Vec<u8>, value: usize, what: &str) -> Result<(), PhiError> {
    buf.extend_from_slice(&blob::len_to_u32(value, what)?.to_le_bytes());
    Ok(())
}

fn write_f32_blob(buf: &mut Vec<u8>, values: impl Iterator<Item = f32>) -> Result<(), PhiError> {
    let values: Vec<f32> = values.collect();
    blob::write_blob(buf, &typed_slice_to_bytes(&values))
}

/// Reads an `f32` blob. A length that is not a whole number of floats is a
/// malformed record.
fn read_f32_blob(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<Vec<f32>, PhiError> {
    let bytes = blob::read_blob(cursor)?;
    bytes_to_typed_vec(bytes).map_err(|e| {
        PhiError::FormatError(format!("{} is not an f32 array: {}", what, e))
    })
}

fn read_f32_vec(cursor: &mut Cursor<&[u8]>, expected: usize, what: &str) -> Result<Vec<f32>, PhiError> {
    let values = read_f32_blob(cursor, what)?;
    if values.len() != expected {
        return Err(PhiError::FormatError(format!(
            "{} holds {} values, expected {}",
            what,
            values.len(),
            expected
        )));
    }
    Ok(values)
}

fn read_f32_matrix(
    cursor: &mut Cursor<&[u8]>,
    rows: usize,
    cols: usize,
    what: &str,
) -> Result<Array2<f32>, PhiError> {
    let expected = rows.checked_mul(cols).ok_or_else(|| {
        PhiError::FormatError(format!("{} shape {}x{} overflows", what, rows, cols))
    })?;
    let values = read_f32_vec(cursor, expected, what)?;
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

fn write_pca(buf: &mut Vec<u8>, pca: &PcaTransform) -> Result<(), PhiError> {
    write_u32(buf, pca.input_dim(), "PCA input width")?;
    write_u32(buf, pca.k(), "PCA k")?;
    write_f32_blob(buf, pca.components.iter().copied())?;
    write_f32_blob(buf, pca.mean.iter().copied())
}

fn read_pca(cursor: &mut Cursor<&[u8]>) -> Result<PcaTransform, PhiError> {
    let d = blob::read_u32(cursor, "PCA input width")? as usize;
    let k = blob::read_u32(cursor, "PCA k")? as usize;
    let components = read_f32_matrix(cursor, d, k, "PCA components")?;
    let mean = Array1::from_vec(read_f32_vec(cursor, d, "PCA mean")?);
    let pca = PcaTransform { components, mean };
    pca.validate()?;
    Ok(pca)
}

fn write_quant(buf: &mut Vec<u8>, params: &QuantParams) -> Result<(), PhiError> {
    buf.push(params.bits);
    write_f32_blob(buf, params.scales.iter().copied())?;
    write_f32_blob(buf, params.zeros.iter().copied())
}

fn read_quant(cursor: &mut Cursor<&[u8]>) -> Result<QuantParams, PhiError> {
    let bits = blob::read_u8(cursor, "quantizer bit depth")?;
    if bits == 0 || bits > 32 {
        return Err(PhiError::FormatError(format!(
            "Quantizer bit depth {} outside 1..=32",
            bits
        )));
    }
    let scales = read_f32_blob(cursor, "quantizer scales")?;
    let zeros = read_f32_vec(cursor, scales.len(), "quantizer zero points")?;
    Ok(QuantParams {
        bits,
        scales,
        zeros,
    })
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_pca() -> PcaTransform {
        PcaTransform {
            components: array![[1.0f32, 0.0], [0.0, 1.0], [0.0, 0.0]],
            mean: array![0.5f32, -0.5, 2.0],
        }
    }

    fn params(cols: usize) -> QuantParams {
        QuantParams {
            bits: 8,
            scales: vec![0.25; cols],
            zeros: vec![-1.0; cols],
        }
    }

    fn reparse(meta: &NumericMetadata) -> NumericMetadata {
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        let parsed = NumericMetadata::read(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, buf.len());
        parsed
    }

    #[test]
    fn test_scalar_record() {
        let meta = NumericMetadata {
            rows: 7,
            pca: sample_pca(),
            stage: StageMetadata::Scalar(params(2)),
        };
        assert!(!meta.has_pq());
        assert_eq!(reparse(&meta), meta);
    }

    #[test]
    fn test_product_record_with_residual() {
        let pq = BlockProductQuantizer {
            codebooks: vec![
                Codebook {
                    centroids: array![[1.0f32], [2.0]],
                },
                Codebook {
                    centroids: array![[3.0f32], [4.0]],
                },
            ],
            block_size: 1,
            dim: 2,
        };
        let meta = NumericMetadata {
            rows: 3,
            pca: sample_pca(),
            stage: StageMetadata::Product {
                pq,
                residual: Some(ResidualSection {
                    transform: PcaTransform::identity(2),
                    params: params(2),
                }),
            },
        };
        assert!(meta.has_pq() && meta.has_residual());
        assert_eq!(reparse(&meta), meta);
    }

    #[test]
    fn test_inconsistent_records_are_rejected() {
        // Scalar params for 3 columns against k = 2.
        let meta = NumericMetadata {
            rows: 1,
            pca: sample_pca(),
            stage: StageMetadata::Scalar(params(3)),
        };
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        assert!(matches!(
            NumericMetadata::read(&mut cursor),
            Err(PhiError::FormatError(_))
        ));

        // Unknown version, unknown variant, truncation.
        for bad in [vec![9u8, 0], vec![METADATA_VERSION, 7, 0, 0, 0, 0], vec![METADATA_VERSION]] {
            let mut cursor = Cursor::new(bad.as_slice());
            assert!(matches!(
                NumericMetadata::read(&mut cursor),
                Err(PhiError::FormatError(_))
            ));
        }
    }

    #[test]
    fn test_ragged_float_blob_is_format_error() {
        let meta = NumericMetadata {
            rows: 2,
            pca: sample_pca(),
            stage: StageMetadata::Scalar(params(2)),
        };
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();

        // The components blob follows version, variant, rows, d and k.
        let len_at = 2 + 4 + 4 + 4;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[len_at..len_at + 4]);
        let len = u32::from_le_bytes(len_bytes);
        buf[len_at..len_at + 4].copy_from_slice(&(len - 1).to_le_bytes());
        buf.remove(len_at + 4 + len as usize - 1);

        let mut cursor = Cursor::new(buf.as_slice());
        assert!(matches!(
            NumericMetadata::read(&mut cursor),
            Err(PhiError::FormatError(_))
        ));
    }
}
