// In: src/metrics.rs

//! Quality metrics for judging lossy round-trips.
//!
//! All accumulation happens in `f64`. Shape mismatches are reported as
//! `UnsupportedInput` since they are caller mistakes, not corrupt data.

use ndarray::{ArrayView1, ArrayView2, Zip};

use crate::error::PhiError;

fn check_dims(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> Result<(), PhiError> {
    if a.dim() != b.dim() {
        return Err(PhiError::UnsupportedInput(format!(
            "Cannot compare arrays of shape {:?} and {:?}",
            a.dim(),
            b.dim()
        )));
    }
    if a.is_empty() {
        return Err(PhiError::UnsupportedInput("Cannot compare empty arrays".into()));
    }
    Ok(())
}

/// Cosine similarity of two vectors. A zero vector is only similar to another
/// zero vector.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    Zip::from(&a).and(&b).for_each(|&x, &y| {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    });
    if na == 0.0 || nb == 0.0 {
        return if na == nb { 1.0 } else { 0.0 };
    }
    (dot / (na.sqrt() * nb.sqrt())) as f32
}

fn row_cosines(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> Vec<f32> {
    a.rows()
        .into_iter()
        .zip(b.rows())
        .map(|(x, y)| cosine_similarity(x, y))
        .collect()
}

/// Mean row-wise cosine similarity between an original and its reconstruction.
pub fn mean_cosine_similarity(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<f32, PhiError> {
    check_dims(&a, &b)?;
    let sum: f64 = row_cosines(&a, &b).into_iter().map(|c| c as f64).sum();
    Ok((sum / a.nrows() as f64) as f32)
}

/// Worst row-wise cosine similarity.
pub fn min_cosine_similarity(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<f32, PhiError> {
    check_dims(&a, &b)?;
    Ok(row_cosines(&a, &b).into_iter().fold(f32::INFINITY, f32::min))
}

pub fn mean_squared_error(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<f64, PhiError> {
    check_dims(&a, &b)?;
    let mut sum = 0.0f64;
    Zip::from(&a).and(&b).for_each(|&x, &y| {
        let d = x as f64 - y as f64;
        sum += d * d;
    });
    Ok(sum / a.len() as f64)
}

/// Peak signal-to-noise ratio in dB, with the peak taken as the original's
/// value range. Infinite for an exact reconstruction.
pub fn psnr(original: ArrayView2<f32>, reconstructed: ArrayView2<f32>) -> Result<f64, PhiError> {
    let mse = mean_squared_error(original, reconstructed)?;
    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    let (min, max) = original
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let peak = (max - min) as f64;
    if peak == 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(10.0 * (peak * peak / mse).log10())
}

/// `original / compressed`; zero when nothing was produced.
pub fn compression_ratio(original_bytes: usize, compressed_bytes: usize) -> f64 {
    if compressed_bytes == 0 {
        return 0.0;
    }
    original_bytes as f64 / compressed_bytes as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_cosine_similarity() {
        let a = array![1.0f32, 0.0, 0.0];
        let b = array![0.0f32, 2.0, 0.0];
        assert_eq!(cosine_similarity(a.view(), a.view()), 1.0);
        assert_eq!(cosine_similarity(a.view(), b.view()), 0.0);
        assert!((cosine_similarity(a.view(), (-&a).view()) + 1.0).abs() < 1e-6);

        let zero = array![0.0f32, 0.0, 0.0];
        assert_eq!(cosine_similarity(zero.view(), zero.view()), 1.0);
        assert_eq!(cosine_similarity(zero.view(), a.view()), 0.0);
    }

    #[test]
    fn test_mean_and_min_cosine() {
        let a = array![[1.0f32, 0.0], [0.0, 1.0]];
        let b = array![[1.0f32, 0.0], [1.0, 0.0]];
        assert!((mean_cosine_similarity(a.view(), b.view()).unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(min_cosine_similarity(a.view(), b.view()).unwrap(), 0.0);
    }

    #[test]
    fn test_mse_and_psnr() {
        let a = array![[0.0f32, 1.0], [2.0, 3.0]];
        let b = array![[0.0f32, 1.0], [2.0, 2.0]];
        assert!((mean_squared_error(a.view(), b.view()).unwrap() - 0.25).abs() < 1e-12);
        // Peak 3, MSE 0.25: 10 * log10(36).
        let expected = 10.0 * 36.0f64.log10();
        assert!((psnr(a.view(), b.view()).unwrap() - expected).abs() < 1e-9);
        assert_eq!(psnr(a.view(), a.view()).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let a = Array2::<f32>::zeros((2, 3));
        let b = Array2::<f32>::zeros((3, 2));
        assert!(mean_cosine_similarity(a.view(), b.view()).is_err());
        assert!(mean_squared_error(a.view(), b.view()).is_err());
        let empty = Array2::<f32>::zeros((0, 3));
        assert!(min_cosine_similarity(empty.view(), empty.view()).is_err());
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(1000, 250), 4.0);
        assert_eq!(compression_ratio(10, 0), 0.0);
    }
}
