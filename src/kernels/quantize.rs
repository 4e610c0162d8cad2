//! This module contains the linear scalar quantizer shared by the Phase-1
//! pipeline and the residual pass.
//!
//! Each value maps to `round((x - min) / range * (2^bits - 1))`, using either
//! one `(min, range)` pair per column or a single global pair. A column whose
//! range is below `1e-8` is given a unit range, so `scale` is never zero.
//! Codes are carried as `u32` and narrowed to `CodeWidth::for_bits(bits)` by the
//! serializer.

use ndarray::{Array2, ArrayView2};

use crate::error::PhiError;
use crate::types::CodeWidth;

const MIN_RANGE: f64 = 1e-8;

/// Dequantization parameters. One entry for a global quantizer, one per
/// column otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantParams {
    pub bits: u8,
    pub scales: Vec<f32>,
    pub zeros: Vec<f32>,
}

impl QuantParams {
    pub fn is_global(&self) -> bool {
        self.scales.len() == 1
    }

    pub fn width(&self) -> Result<CodeWidth, PhiError> {
        CodeWidth::for_bits(self.bits)
    }

    /// Checks the parameter vectors against a matrix with `cols` columns.
    pub fn check_columns(&self, cols: usize) -> Result<(), PhiError> {
        if self.scales.len() != self.zeros.len() || !(self.is_global() || self.scales.len() == cols)
        {
            return Err(PhiError::FormatError(format!(
                "Quantizer has {} scales and {} zero points for {} columns",
                self.scales.len(),
                self.zeros.len(),
                cols
            )));
        }
        Ok(())
    }

    fn column(&self, col: usize) -> (f32, f32) {
        let i = if self.is_global() { 0 } else { col };
        (self.scales[i], self.zeros[i])
    }
}

/// A quantized matrix: row-major codes plus the parameters to invert them.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub codes: Vec<u32>,
    pub params: QuantParams,
}

fn min_max<'a>(values: impl Iterator<Item = &'a f32>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
        (lo.min(x as f64), hi.max(x as f64))
    });
    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 0.0)
    }
}

/// Quantizes `matrix` to `bits` levels.
pub fn quantize(matrix: ArrayView2<f32>, bits: u8, per_component: bool) -> Result<Quantized, PhiError> {
    // Validates the bit depth as a side effect.
    CodeWidth::for_bits(bits)?;
    let levels = ((1u64 << bits) - 1) as f64;

    let bounds: Vec<(f64, f64)> = if per_component {
        matrix.columns().into_iter().map(|c| min_max(c.iter())).collect()
    } else {
        vec![min_max(matrix.iter())]
    };
    // (min, range) per parameter slot.
    let slots: Vec<(f64, f64)> = bounds
        .into_iter()
        .map(|(lo, hi)| {
            let range = hi - lo;
            (lo, if range < MIN_RANGE { 1.0 } else { range })
        })
        .collect();

    let mut codes = Vec::with_capacity(matrix.len());
    for row in matrix.rows() {
        for (j, &x) in row.iter().enumerate() {
            let (lo, range) = slots[if per_component { j } else { 0 }];
            let q = ((x as f64 - lo) / range * levels).round();
            codes.push(q.clamp(0.0, levels) as u32);
        }
    }

    let params = QuantParams {
        bits,
        scales: slots.iter().map(|&(_, range)| (range / levels) as f32).collect(),
        zeros: slots.iter().map(|&(lo, _)| lo as f32).collect(),
    };
    log::debug!(
        "quantize: {}x{} at {} bits, {} parameter pair(s)",
        matrix.nrows(),
        matrix.ncols(),
        bits,
        params.scales.len()
    );
    Ok(Quantized { codes, params })
}

/// Inverts `quantize`: `code * scale + zero`.
pub fn dequantize(
    codes: &[u32],
    shape: (usize, usize),
    params: &QuantParams,
) -> Result<Array2<f32>, PhiError> {
    let (rows, cols) = shape;
    params.check_columns(cols)?;
    if rows.checked_mul(cols) != Some(codes.len()) {
        return Err(PhiError::FormatError(format!(
            "Expected {}x{} quantized codes, found {}",
            rows,
            cols,
            codes.len()
        )));
    }
    Ok(Array2::from_shape_fn((rows, cols), |(i, j)| {
        let (scale, zero) = params.column(j);
        codes[i * cols + j] as f32 * scale + zero
    }))
}
