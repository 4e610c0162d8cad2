//! The optional residual pass of the Phase-2 pipeline.
//!
//! The error left by product quantization, `reduced - pq_reconstruction`, goes
//! through its own PCA and a per-component scalar quantizer. At decode time the
//! correction is rebuilt and added onto the PQ reconstruction. It is purely
//! additive: the PQ-only path never reads anything produced here.

use ndarray::{Array2, ArrayView2};

use crate::error::PhiError;
use crate::kernels::pca::{pca_reduce, PcaTransform};
use crate::kernels::quantize::{self, QuantParams};

/// A fitted and quantized residual correction.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualCorrection {
    pub transform: PcaTransform,
    pub params: QuantParams,
    /// Row-major `n × k_residual` codes.
    pub codes: Vec<u32>,
}

impl ResidualCorrection {
    /// Fits the correction for `reduced` given its PQ reconstruction.
    pub fn fit(
        reduced: ArrayView2<f32>,
        pq_reconstruction: ArrayView2<f32>,
        target_variance: f64,
        bits: u8,
    ) -> Result<Self, PhiError> {
        if reduced.dim() != pq_reconstruction.dim() {
            return Err(PhiError::InternalError(format!(
                "Residual of {:?} against a reconstruction of {:?}",
                reduced.dim(),
                pq_reconstruction.dim()
            )));
        }
        let residual = &reduced - &pq_reconstruction;
        let (projected, transform) = pca_reduce(residual.view(), target_variance)?;
        let quantized = quantize::quantize(projected.view(), bits, true)?;
        log::debug!(
            "residual: k = {} of {} at {} bits",
            transform.k(),
            transform.input_dim(),
            bits
        );
        Ok(Self {
            transform,
            params: quantized.params,
            codes: quantized.codes,
        })
    }

    pub fn k(&self) -> usize {
        self.transform.k()
    }

    /// Rebuilds the `rows × d` correction: `dequant @ components^T + mean`.
    pub fn restore(&self, rows: usize) -> Result<Array2<f32>, PhiError> {
        let projected = quantize::dequantize(&self.codes, (rows, self.k()), &self.params)?;
        self.transform.reconstruct(projected.view())
    }

    /// Adds the correction onto a PQ reconstruction in place.
    pub fn apply(&self, base: &mut Array2<f32>) -> Result<(), PhiError> {
        let correction = self.restore(base.nrows())?;
        if correction.dim() != base.dim() {
            return Err(PhiError::FormatError(format!(
                "Residual correction {:?} does not match reconstruction {:?}",
                correction.dim(),
                base.dim()
            )));
        }
        *base += &correction;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::pq::{BlockProductQuantizer, PqSettings};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn mse(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
        (a - b).mapv(|x| x * x).mean().unwrap_or(0.0)
    }

    #[test]
    fn test_residual_reduces_pq_error() {
        let mut rng = StdRng::seed_from_u64(21);
        let normal = Normal::new(0.0f32, 1.0).unwrap();
        let data = Array2::from_shape_fn((200, 8), |_| normal.sample(&mut rng));

        let settings = PqSettings {
            n_blocks: 4,
            n_centroids: 8,
            max_iter: 20,
        };
        let pq = BlockProductQuantizer::fit(data.view(), &settings, &mut rng).unwrap();
        let mut recon = pq.decode(&pq.encode(data.view()).unwrap(), 200).unwrap();
        let pq_only = mse(&data, &recon);

        let correction = ResidualCorrection::fit(data.view(), recon.view(), 0.99, 8).unwrap();
        assert!(correction.k() >= 1 && correction.k() <= 8);
        correction.apply(&mut recon).unwrap();
        assert!(mse(&data, &recon) < pq_only * 0.5);
    }

    #[test]
    fn test_zero_residual_is_harmless() {
        let data = Array2::from_shape_fn((10, 3), |(i, j)| (i + j) as f32);
        let correction = ResidualCorrection::fit(data.view(), data.view(), 0.95, 8).unwrap();
        let mut base = data.clone();
        correction.apply(&mut base).unwrap();
        assert_eq!(base, data);
    }

    #[test]
    fn test_mismatched_shapes_are_rejected() {
        let a = Array2::<f32>::zeros((4, 3));
        let b = Array2::<f32>::zeros((4, 2));
        assert!(ResidualCorrection::fit(a.view(), b.view(), 0.9, 8).is_err());
    }
}
