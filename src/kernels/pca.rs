//! Variance-targeted PCA.
//!
//! The covariance matrix is formed and eigendecomposed in `f64`; the retained
//! basis and mean are stored as `f32`. Working memory is one `d×d` covariance
//! plus a centered `n×d` copy, so callers with very wide inputs pay `O(d²)`.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::config::PCA_BYPASS_VARIANCE;
use crate::error::PhiError;

/// Guards the explained-variance ratio against an all-zero spectrum.
const VARIANCE_EPS: f64 = 1e-10;

/// A fitted projection: `d×k` orthonormal basis plus the column mean.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaTransform {
    pub components: Array2<f32>,
    pub mean: Array1<f32>,
}

impl PcaTransform {
    /// The pass-through transform used when PCA is bypassed.
    pub fn identity(d: usize) -> Self {
        Self {
            components: Array2::eye(d),
            mean: Array1::zeros(d),
        }
    }

    /// Input dimensionality `d`.
    pub fn input_dim(&self) -> usize {
        self.components.nrows()
    }

    /// Retained dimensionality `k`.
    pub fn k(&self) -> usize {
        self.components.ncols()
    }

    /// Checks that a deserialized transform is well formed.
    pub fn validate(&self) -> Result<(), PhiError> {
        let (d, k) = self.components.dim();
        if k == 0 || k > d || self.mean.len() != d {
            return Err(PhiError::FormatError(format!(
                "PCA transform is inconsistent: components {}x{}, mean of {}",
                d,
                k,
                self.mean.len()
            )));
        }
        Ok(())
    }

    pub fn project(&self, matrix: ArrayView2<f32>) -> Result<Array2<f32>, PhiError> {
        if matrix.ncols() != self.input_dim() {
            return Err(PhiError::InternalError(format!(
                "Projecting {} columns through a {}-dimensional PCA",
                matrix.ncols(),
                self.input_dim()
            )));
        }
        let centered = &matrix - &self.mean;
        Ok(centered.dot(&self.components))
    }

    /// `reduced @ components^T + mean`.
    pub fn reconstruct(&self, reduced: ArrayView2<f32>) -> Result<Array2<f32>, PhiError> {
        if reduced.ncols() != self.k() {
            return Err(PhiError::FormatError(format!(
                "Reduced matrix has {} columns, PCA retains {}",
                reduced.ncols(),
                self.k()
            )));
        }
        Ok(reduced.dot(&self.components.t()) + &self.mean)
    }
}

/// Smallest `k` whose cumulative explained-variance ratio reaches `target`,
/// clamped to `[1, d]`. `eigenvalues` must be sorted descending.
pub fn select_k(eigenvalues: &[f64], target: f64) -> usize {
    let d = eigenvalues.len();
    let total: f64 = eigenvalues.iter().sum();
    let mut cumulative = 0.0;
    let mut k = d + 1;
    for (i, &ev) in eigenvalues.iter().enumerate() {
        cumulative += ev / (total + VARIANCE_EPS);
        if cumulative >= target {
            k = i + 1;
            break;
        }
    }
    k.clamp(1, d.max(1))
}

/// Fits a PCA retaining `target_variance` of the variance and projects the
/// input. Targets at or above `PCA_BYPASS_VARIANCE` return the identity
/// transform with `k = d`.
pub fn pca_reduce(
    matrix: ArrayView2<f32>,
    target_variance: f64,
) -> Result<(Array2<f32>, PcaTransform), PhiError> {
    let (n, d) = matrix.dim();
    if n == 0 || d == 0 {
        return Err(PhiError::UnsupportedInput(format!(
            "PCA needs at least one row and column, got {}x{}",
            n, d
        )));
    }
    if target_variance >= PCA_BYPASS_VARIANCE {
        log::debug!("pca: bypassed at target {}, k = d = {}", target_variance, d);
        return Ok((matrix.to_owned(), PcaTransform::identity(d)));
    }

    let wide = matrix.mapv(|x| x as f64);
    let mean = wide
        .mean_axis(Axis(0))
        .ok_or_else(|| PhiError::InternalError("mean of an empty matrix".into()))?;
    let centered = &wide - &mean;
    let cov = centered.t().dot(&centered) / n as f64;

    let eig = DMatrix::from_fn(d, d, |i, j| cov[[i, j]]).symmetric_eigen();
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let sorted: Vec<f64> = order.iter().map(|&i| eig.eigenvalues[i]).collect();

    let k = select_k(&sorted, target_variance);
    let components =
        Array2::from_shape_fn((d, k), |(row, col)| eig.eigenvectors[(row, order[col])] as f32);
    let transform = PcaTransform {
        components,
        mean: mean.mapv(|x| x as f32),
    };
    log::debug!("pca: d = {} -> k = {} at target {}", d, k, target_variance);

    let reduced = transform.project(matrix)?;
    Ok((reduced, transform))
}

/// The exact linear inverse of `pca_reduce`'s projection.
pub fn pca_reverse(reduced: ArrayView2<f32>, transform: &PcaTransform) -> Result<Array2<f32>, PhiError> {
    transform.reconstruct(reduced)
}
