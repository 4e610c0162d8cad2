// In: src/pipeline/detector.rs

//! Advisory, deterministic data-type detection.
//!
//! Filename hints win when they match. Otherwise byte buffers are classified by
//! how printable their UTF-8 decoding is, and 2-D arrays by two cheap
//! statistical heuristics (temporal smoothness, then near-constant row norms).
//! The verdict only selects a codec; it never triggers a retry or fallback.

use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};

use crate::types::{CompressInput, DataKind};

const TEXT_EXTENSIONS: [&str; 5] = [".txt", ".md", ".json", ".log", ".xml"];
const TIMESERIES_TOKENS: [&str; 5] = ["timeseries", "sensor", "signal", "iot", "stream"];

/// Printable fraction above which decoded bytes count as text.
const TEXT_PRINTABLE_RATIO: f64 = 0.9;
/// Leading rows inspected by the smoothness heuristic.
const SMOOTHNESS_SAMPLE: usize = 100;
const EMBEDDING_MIN_DIM: usize = 64;
const EMBEDDING_MAX_DIM: usize = 2048;
const EMBEDDING_NORM_CV: f64 = 0.2;

/// Classifies `input`, consulting `filename_hint` first.
pub fn detect(input: &CompressInput, filename_hint: Option<&str>) -> DataKind {
    if let Some(kind) = filename_hint.and_then(detect_from_hint) {
        return kind;
    }
    match input {
        CompressInput::Bytes(bytes) => detect_bytes(bytes),
        CompressInput::Text(text) => detect_bytes(text.as_bytes()),
        CompressInput::Numeric(array) => detect_array(array.view()),
    }
}

/// Extension and name-token rules, case-insensitive.
pub fn detect_from_hint(filename: &str) -> Option<DataKind> {
    if filename.is_empty() {
        return None;
    }
    let lower = filename.to_lowercase();
    if TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Some(DataKind::Text);
    }
    if TIMESERIES_TOKENS.iter().any(|token| lower.contains(token)) {
        return Some(DataKind::Timeseries);
    }
    None
}

/// Printable or one of `\n`, `\r`, `\t`. Control, format and non-space
/// separator characters are not printable.
fn is_printable(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\t') || (!c.is_control() && (c == ' ' || !c.is_whitespace()))
}

pub fn detect_bytes(bytes: &[u8]) -> DataKind {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return DataKind::Numeric;
    };
    let (total, printable) = text.chars().fold((0usize, 0usize), |(total, printable), c| {
        (total + 1, printable + is_printable(c) as usize)
    });
    if total > 0 && printable as f64 / total as f64 > TEXT_PRINTABLE_RATIO {
        DataKind::Text
    } else {
        DataKind::Numeric
    }
}

/// Heuristics apply to 2-D arrays only; other ranks are `Numeric`.
pub fn detect_array(array: ArrayViewD<f32>) -> DataKind {
    match array.into_dimensionality::<Ix2>() {
        Ok(matrix) => detect_matrix(matrix),
        Err(_) => DataKind::Numeric,
    }
}

fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

fn detect_matrix(matrix: ArrayView2<f32>) -> DataKind {
    let (t, c) = matrix.dim();

    if t > c * 10 && t > SMOOTHNESS_SAMPLE && c > 0 {
        let sample = matrix.column(0);
        let sample = sample.slice(ndarray::s![..SMOOTHNESS_SAMPLE]);
        let (_, std) = mean_std(sample.iter().map(|&x| x as f64));
        let diffs = sample
            .windows(2)
            .into_iter()
            .map(|w| (w[1] as f64 - w[0] as f64).abs());
        let (mean_diff, _) = mean_std(diffs.collect::<Vec<_>>().into_iter());
        if mean_diff < std * 0.5 {
            return DataKind::Timeseries;
        }
    }

    if (EMBEDDING_MIN_DIM..=EMBEDDING_MAX_DIM).contains(&c) && t > 0 {
        let norms: Vec<f64> = matrix
            .map_axis(Axis(1), |row| row.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt())
            .to_vec();
        let (mean, std) = mean_std(norms.iter().copied());
        if std < mean * EMBEDDING_NORM_CV {
            return DataKind::Embeddings;
        }
    }

    DataKind::Numeric
}
