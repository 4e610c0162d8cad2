//! The input and output unions of the public API, plus the detector's verdict.

use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Ix2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The detector's classification of an input buffer.
///
/// `Numeric` is handled identically to `Embeddings` by the pipeline; the two only
/// differ in what is reported.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Text,
    Embeddings,
    Timeseries,
    Numeric,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Embeddings => "embeddings",
            Self::Timeseries => "timeseries",
            Self::Numeric => "numeric",
        };
        f.write_str(name)
    }
}

/// Everything `compress` accepts. Borrowed, so the caller keeps ownership.
#[derive(Debug, Clone)]
pub enum CompressInput<'a> {
    /// Arbitrary bytes. Always routed to the symbolic codec.
    Bytes(&'a [u8]),
    /// UTF-8 text. Compressed as its byte encoding.
    Text(&'a str),
    /// A numeric array of rank >= 2. Rows are the first axis.
    Numeric(ArrayViewD<'a, f32>),
}

impl<'a> From<&'a [u8]> for CompressInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        CompressInput::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for CompressInput<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        CompressInput::Bytes(bytes.as_slice())
    }
}

impl<'a> From<&'a str> for CompressInput<'a> {
    fn from(text: &'a str) -> Self {
        CompressInput::Text(text)
    }
}

impl<'a> From<&'a Array2<f32>> for CompressInput<'a> {
    fn from(matrix: &'a Array2<f32>) -> Self {
        CompressInput::Numeric(matrix.view().into_dyn())
    }
}

impl<'a> From<ArrayView2<'a, f32>> for CompressInput<'a> {
    fn from(matrix: ArrayView2<'a, f32>) -> Self {
        CompressInput::Numeric(matrix.into_dyn())
    }
}

impl<'a> From<&'a ArrayD<f32>> for CompressInput<'a> {
    fn from(array: &'a ArrayD<f32>) -> Self {
        CompressInput::Numeric(array.view())
    }
}

/// What `decompress` returns. The variant is implied by the container's mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decompressed {
    Bytes(Vec<u8>),
    Numeric(ArrayD<f32>),
}

impl Decompressed {
    /// Returns the byte payload of a symbolic container.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Decompressed::Bytes(bytes) => Some(bytes),
            Decompressed::Numeric(_) => None,
        }
    }

    /// Returns the array of a numeric container, in its original shape.
    pub fn into_array(self) -> Option<ArrayD<f32>> {
        match self {
            Decompressed::Numeric(array) => Some(array),
            Decompressed::Bytes(_) => None,
        }
    }

    /// Returns the array of a numeric container if it is two-dimensional.
    pub fn into_matrix(self) -> Option<Array2<f32>> {
        self.into_array()
            .and_then(|array| array.into_dimensionality::<Ix2>().ok())
    }
}
