//! Block product quantization with golden-ratio-seeded k-means.
//!
//! A reduced vector is padded to a multiple of the block count, split into
//! equal-width column blocks, and each block is replaced by the index of its
//! nearest centroid in a per-block codebook.
//!
//! Clustering never fails on degenerate data:
//! - fewer rows than centroids: each row becomes its own centroid, the rest are zero;
//! - empty clusters keep their previous centroid between Lloyd iterations;
//! - an all-zero distance profile during seeding falls back to a uniform pick.
//!
//! Assignment is done row by row, so memory stays at `O(n)` labels plus the
//! codebook; no `n × k` distance matrix is formed.

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

use crate::error::PhiError;
use crate::types::CodeWidth;
use crate::PHI;

/// `np.allclose` tolerances for the convergence check.
const CONVERGE_ATOL: f32 = 1e-6;
const CONVERGE_RTOL: f32 = 1e-5;
const WEIGHT_EPS: f64 = 1e-8;

//==================================================================================
// 1. Configuration & Model
//==================================================================================

/// Hyper-parameters of a block quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PqSettings {
    pub n_blocks: usize,
    pub n_centroids: usize,
    pub max_iter: usize,
}

/// The centroids learned for one column block, `n_centroids × block_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    pub centroids: Array2<f32>,
}

impl Codebook {
    pub fn n_centroids(&self) -> usize {
        self.centroids.nrows()
    }

    /// Exhaustive nearest centroid by squared distance; ties go to the lowest index.
    pub fn nearest(&self, v: ArrayView1<f32>) -> usize {
        nearest_row(self.centroids.view(), v).0
    }
}

/// A fitted block quantizer.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockProductQuantizer {
    pub codebooks: Vec<Codebook>,
    pub block_size: usize,
    /// Unpadded input width.
    pub dim: usize,
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_row(rows: ArrayView2<f32>, v: ArrayView1<f32>) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (idx, row) in rows.rows().into_iter().enumerate() {
        let dist = squared_distance(row, v);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best
}

/// Copies `data` into a zero-padded `n × (block_size * n_blocks)` matrix.
fn pad_columns(data: ArrayView2<f32>, padded_width: usize) -> Array2<f32> {
    let (n, d) = data.dim();
    let mut padded = Array2::<f32>::zeros((n, padded_width));
    padded.slice_mut(s![.., ..d]).assign(&data);
    padded
}

impl BlockProductQuantizer {
    /// Learns one codebook per block. `rng` drives the seeding.
    pub fn fit<R: Rng + ?Sized>(
        data: ArrayView2<f32>,
        settings: &PqSettings,
        rng: &mut R,
    ) -> Result<Self, PhiError> {
        let PqSettings {
            n_blocks,
            n_centroids,
            max_iter,
        } = *settings;
        if n_blocks == 0 || n_centroids == 0 {
            return Err(PhiError::InvalidConfig(format!(
                "PQ needs positive blocks and centroids, got {} and {}",
                n_blocks, n_centroids
            )));
        }
        let (n, dim) = data.dim();
        let block_size = dim.div_ceil(n_blocks).max(1);
        let padded = pad_columns(data, block_size * n_blocks);

        let mut codebooks = Vec::with_capacity(n_blocks);
        for b in 0..n_blocks {
            let block = padded.slice(s![.., b * block_size..(b + 1) * block_size]);
            let centroids = kmeans_block(block, n_centroids, max_iter, rng);
            codebooks.push(Codebook { centroids });
        }
        log::debug!(
            "pq: fitted {} blocks of width {} ({} centroids each) on {} rows",
            n_blocks,
            block_size,
            n_centroids,
            n
        );

        Ok(Self {
            codebooks,
            block_size,
            dim,
        })
    }

    pub fn n_blocks(&self) -> usize {
        self.codebooks.len()
    }

    pub fn n_centroids(&self) -> usize {
        self.codebooks.first().map_or(0, Codebook::n_centroids)
    }

    /// Width of one stored code.
    pub fn code_width(&self) -> Result<CodeWidth, PhiError> {
        CodeWidth::for_centroids(self.n_centroids())
    }

    /// Checks that a deserialized model is internally consistent.
    pub fn validate(&self) -> Result<(), PhiError> {
        let k = self.n_centroids();
        let expected_block = self.dim.div_ceil(self.n_blocks().max(1)).max(1);
        let consistent = k > 0
            && self.block_size == expected_block
            && self
                .codebooks
                .iter()
                .all(|cb| cb.centroids.dim() == (k, self.block_size));
        if !consistent {
            return Err(PhiError::FormatError(format!(
                "PQ model is inconsistent: {} codebooks, block size {}, width {}",
                self.n_blocks(),
                self.block_size,
                self.dim
            )));
        }
        Ok(())
    }

    /// Encodes each row as `n_blocks` centroid indices, row-major.
    pub fn encode(&self, data: ArrayView2<f32>) -> Result<Vec<u32>, PhiError> {
        if data.ncols() != self.dim {
            return Err(PhiError::InternalError(format!(
                "Encoding {} columns with a PQ fitted on {}",
                data.ncols(),
                self.dim
            )));
        }
        let padded = pad_columns(data, self.block_size * self.n_blocks());
        let mut codes = Vec::with_capacity(data.nrows() * self.n_blocks());
        for row in padded.rows() {
            for (b, codebook) in self.codebooks.iter().enumerate() {
                let block = row.slice(s![b * self.block_size..(b + 1) * self.block_size]);
                codes.push(codebook.nearest(block) as u32);
            }
        }
        Ok(codes)
    }

    /// Looks up and concatenates centroids, then drops the padding columns.
    pub fn decode(&self, codes: &[u32], rows: usize) -> Result<Array2<f32>, PhiError> {
        let n_blocks = self.n_blocks();
        if rows.checked_mul(n_blocks) != Some(codes.len()) {
            return Err(PhiError::FormatError(format!(
                "Expected {}x{} PQ codes, found {}",
                rows,
                n_blocks,
                codes.len()
            )));
        }
        let mut padded = Array2::<f32>::zeros((rows, self.block_size * n_blocks));
        for (i, mut row) in padded.rows_mut().into_iter().enumerate() {
            for (b, codebook) in self.codebooks.iter().enumerate() {
                let code = codes[i * n_blocks + b] as usize;
                if code >= codebook.n_centroids() {
                    return Err(PhiError::FormatError(format!(
                        "PQ code {} out of range for {} centroids",
                        code,
                        codebook.n_centroids()
                    )));
                }
                row.slice_mut(s![b * self.block_size..(b + 1) * self.block_size])
                    .assign(&codebook.centroids.row(code));
            }
        }
        Ok(padded.slice(s![.., ..self.dim]).to_owned())
    }
}

//==================================================================================
// 2. Clustering
//==================================================================================

/// Linear-interpolated percentile of an unsorted slice, `p` in `[0, 100]`.
pub fn percentile(values: &[f32], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    sorted.sort_by(f64::total_cmp);
    let pos = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn sample_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let usable = weights.iter().all(|w| w.is_finite()) && weights.iter().sum::<f64>() > 0.0;
    if !usable {
        return None;
    }
    WeightedIndex::new(weights).ok().map(|dist| dist.sample(rng))
}

/// k-means++ seeding biased toward the `100/φ`-th percentile of distance.
///
/// Each candidate gets weight `d / (|d - target| + ε)`, so points whose
/// nearest-centroid distance sits near the golden quantile are favoured over
/// pure farthest-point picks. Degenerate weights fall back to
/// distance-proportional sampling, then to a uniform pick.
pub fn phi_seed<R: Rng + ?Sized>(data: ArrayView2<f32>, k: usize, rng: &mut R) -> Array2<f32> {
    let (n, width) = data.dim();
    let mut centroids = Array2::<f32>::zeros((k, width));
    if n == 0 || k == 0 {
        return centroids;
    }

    let first = rng.random_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));
    let mut min_dist = vec![f32::INFINITY; n];

    for i in 1..k {
        let last = centroids.row(i - 1);
        for (slot, row) in min_dist.iter_mut().zip(data.rows()) {
            *slot = slot.min(squared_distance(row, last));
        }

        let target = percentile(&min_dist, 100.0 / PHI);
        let phi_weights: Vec<f64> = min_dist
            .iter()
            .map(|&d| d as f64 / ((d as f64 - target).abs() + WEIGHT_EPS))
            .collect();
        let plain_weights: Vec<f64> = min_dist.iter().map(|&d| d as f64).collect();

        let next = sample_index(&phi_weights, rng)
            .or_else(|| sample_index(&plain_weights, rng))
            .unwrap_or_else(|| rng.random_range(0..n));
        centroids.row_mut(i).assign(&data.row(next));
    }
    centroids
}

/// Clusters one block into `k` centroids with Lloyd's algorithm.
fn kmeans_block<R: Rng + ?Sized>(
    data: ArrayView2<f32>,
    k: usize,
    max_iter: usize,
    rng: &mut R,
) -> Array2<f32> {
    let (n, width) = data.dim();

    // Direct assignment: every row is its own centroid, remaining slots stay zero.
    if k >= n {
        let mut centroids = Array2::<f32>::zeros((k, width));
        centroids.slice_mut(s![..n, ..]).assign(&data);
        return centroids;
    }

    let mut centroids = phi_seed(data, k, rng);
    let mut labels = vec![0usize; n];
    let mut sums = Array2::<f64>::zeros((k, width));
    let mut counts = vec![0usize; k];

    for iteration in 0..max_iter {
        for (label, row) in labels.iter_mut().zip(data.rows()) {
            *label = nearest_row(centroids.view(), row).0;
        }

        sums.fill(0.0);
        counts.iter_mut().for_each(|c| *c = 0);
        for (&label, row) in labels.iter().zip(data.rows()) {
            counts[label] += 1;
            for (acc, &x) in sums.row_mut(label).iter_mut().zip(row.iter()) {
                *acc += x as f64;
            }
        }

        let mut converged = true;
        for (j, mut centroid) in centroids.rows_mut().into_iter().enumerate() {
            if counts[j] == 0 {
                continue;
            }
            for (c, &sum) in centroid.iter_mut().zip(sums.row(j).iter()) {
                let updated = (sum / counts[j] as f64) as f32;
                if (updated - *c).abs() > CONVERGE_ATOL + CONVERGE_RTOL * c.abs() {
                    converged = false;
                }
                *c = updated;
            }
        }

        if converged {
            log::debug!("pq: block converged after {} iterations", iteration + 1);
            break;
        }
    }
    centroids
}

//==================================================================================
// 3. Unit Tests
//==================================================================================
