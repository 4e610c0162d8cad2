//! This module contains the timeseries codec: global scalar quantization to
//! `i16`, then per-channel delta-of-delta with run-length encoding.
//!
//! Layout:
//! ```text
//! u32 T | u32 C | f32 min | f32 max | u8 bits
//! per channel: i16 first_value [i16 first_delta [(u8 run_len, i16 dod)* u8 0]]
//! ```
//! The first delta is present when `T >= 2`; run records and the zero
//! terminator when `T >= 3`.
//!
//! Decoding degrades instead of failing once a channel's anchors are read: a
//! truncated run stream holds the last known delta for the remaining samples
//! and logs a warning. A truncated header or anchor is still a `FormatError`.

use ndarray::{Array2, ArrayView2};
use std::io::Cursor;

use crate::config::MAX_TIMESERIES_BITS;
use crate::error::PhiError;
use crate::kernels::blob;

/// Fixed header size: T, C, min, max, bits.
pub const HEADER_LEN: usize = 17;
const MAX_RUN: u8 = 255;

//==================================================================================
// 1. Quantization Helpers
//==================================================================================

fn levels(bits: u8) -> f64 {
    ((1u32 << bits) - 1) as f64
}

/// `(2^bits - 1) / range`, with a near-zero range clamped to 1.
fn scale_for(min: f32, max: f32, bits: u8) -> f64 {
    let mut range = max as f64 - min as f64;
    if range < 1e-8 {
        range = 1.0;
    }
    levels(bits) / range
}

/// The reconstruction step of a `bits`-deep quantizer over `[min, max]`.
pub fn quantization_step(min: f32, max: f32, bits: u8) -> f64 {
    1.0 / scale_for(min, max, bits)
}

//==================================================================================
// 2. Encoder
//==================================================================================

/// Accumulates `(run_len, dod)` records, flushing at the 255 cap.
struct RunWriter<'a> {
    out: &'a mut Vec<u8>,
    value: i16,
    len: u8,
}

impl<'a> RunWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out, value: 0, len: 0 }
    }

    fn push(&mut self, dod: i16) {
        if self.len > 0 && dod == self.value {
            self.len += 1;
            if self.len == MAX_RUN {
                self.flush();
            }
        } else {
            self.flush();
            self.value = dod;
            self.len = 1;
        }
    }

    fn flush(&mut self) {
        if self.len > 0 {
            self.out.push(self.len);
            self.out.extend_from_slice(&self.value.to_le_bytes());
            self.len = 0;
        }
    }

    fn finish(mut self) {
        self.flush();
        self.out.push(0);
    }
}

/// Encodes a `[T, C]` matrix, one channel per column.
pub fn encode(data: ArrayView2<f32>, bits: u8) -> Result<Vec<u8>, PhiError> {
    if bits == 0 || bits > MAX_TIMESERIES_BITS {
        return Err(PhiError::InvalidConfig(format!(
            "timeseries_bits must be within 1..={}, got {}",
            MAX_TIMESERIES_BITS, bits
        )));
    }
    let (t_len, channels) = data.dim();

    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let (min, max) = if t_len * channels == 0 { (0.0, 0.0) } else { (min, max) };
    let scale = scale_for(min, max, bits);

    let mut out = Vec::with_capacity(HEADER_LEN + channels * (4 + t_len / 8));
    out.extend_from_slice(&blob::len_to_u32(t_len, "timeseries length")?.to_le_bytes());
    out.extend_from_slice(&blob::len_to_u32(channels, "channel count")?.to_le_bytes());
    out.extend_from_slice(&min.to_le_bytes());
    out.extend_from_slice(&max.to_le_bytes());
    out.push(bits);

    // Values lie in 0..=2^14-1, so deltas and second differences fit in i16.
    let quantize = |x: f32| ((x as f64 - min as f64) * scale).round() as i16;

    for column in data.columns() {
        if t_len == 0 {
            break;
        }
        let q: Vec<i16> = column.iter().map(|&x| quantize(x)).collect();
        out.extend_from_slice(&q[0].to_le_bytes());
        if t_len < 2 {
            continue;
        }
        let first_delta = q[1] - q[0];
        out.extend_from_slice(&first_delta.to_le_bytes());
        if t_len < 3 {
            continue;
        }

        let mut runs = RunWriter::new(&mut out);
        let mut prev_delta = first_delta;
        for t in 2..t_len {
            let delta = q[t] - q[t - 1];
            runs.push(delta - prev_delta);
            prev_delta = delta;
        }
        runs.finish();
    }

    log::debug!(
        "dod_rle: {}x{} samples at {} bits -> {} bytes",
        t_len,
        channels,
        bits,
        out.len()
    );
    Ok(out)
}

//==================================================================================
// 3. Decoder
//==================================================================================

/// Header fields of an encoded timeseries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeseriesHeader {
    pub samples: usize,
    pub channels: usize,
    pub min: f32,
    pub max: f32,
    pub bits: u8,
}

pub fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<TimeseriesHeader, PhiError> {
    let samples = blob::read_u32(cursor, "timeseries sample count")? as usize;
    let channels = blob::read_u32(cursor, "timeseries channel count")? as usize;
    let min = blob::read_f32(cursor, "timeseries min")?;
    let max = blob::read_f32(cursor, "timeseries max")?;
    let bits = blob::read_u8(cursor, "timeseries bit depth")?;
    if bits == 0 || bits > MAX_TIMESERIES_BITS {
        return Err(PhiError::FormatError(format!(
            "Timeseries bit depth {} outside 1..={}",
            bits, MAX_TIMESERIES_BITS
        )));
    }
    if samples.checked_mul(channels).is_none() {
        return Err(PhiError::FormatError(format!(
            "Timeseries shape {}x{} overflows",
            samples, channels
        )));
    }

    // Every channel carries at least its first value, and one run record
    // covers at most MAX_RUN samples.
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if samples > 0 && channels > remaining / 2 {
        return Err(PhiError::FormatError(format!(
            "Timeseries header declares {} channels but only {} bytes follow",
            channels, remaining
        )));
    }
    if samples > max_samples_for(remaining) {
        return Err(PhiError::FormatError(format!(
            "Timeseries header declares {} samples but only {} bytes follow",
            samples, remaining
        )));
    }
    Ok(TimeseriesHeader {
        samples,
        channels,
        min,
        max,
        bits,
    })
}

/// Upper bound on the sample count a body of `remaining` bytes can describe:
/// two anchors plus one full run per record, with one record of slack for a
/// truncated tail.
fn max_samples_for(remaining: usize) -> usize {
    (remaining / 3 + 1)
        .saturating_mul(MAX_RUN as usize)
        .saturating_add(2)
}

/// Decodes one channel's run records into `values[2..]`.
///
/// Returns `false` if the stream ended early and the tail was filled by
/// holding the last delta.
fn decode_runs(cursor: &mut Cursor<&[u8]>, values: &mut [i32], first_delta: i32) -> bool {
    let t_len = values.len();
    let mut t = 2;
    let mut prev_delta = first_delta;

    while t < t_len {
        let Ok(run_len) = blob::read_u8(cursor, "run length") else {
            break;
        };
        if run_len == 0 {
            // Early terminator: the encoder never emits one, treat as truncation.
            break;
        }
        let Ok(dod) = blob::read_i16(cursor, "delta-of-delta") else {
            break;
        };
        for _ in 0..run_len {
            if t >= t_len {
                break;
            }
            prev_delta = prev_delta.saturating_add(dod as i32);
            values[t] = values[t - 1].saturating_add(prev_delta);
            t += 1;
        }
    }

    if t < t_len {
        for i in t..t_len {
            values[i] = values[i - 1].saturating_add(prev_delta);
        }
        return false;
    }

    // Channel is full; consume records up to and including the terminator.
    loop {
        match blob::read_u8(cursor, "run length") {
            Ok(0) => return true,
            Ok(_) => {
                if blob::read_i16(cursor, "delta-of-delta").is_err() {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
}

/// Decodes a stream written by `encode` into a `[T, C]` matrix.
pub fn decode(bytes: &[u8]) -> Result<Array2<f32>, PhiError> {
    decode_inner(bytes, None)
}

/// Like `decode`, but rejects a header whose `[T, C]` differs from `expected`
/// before allocating anything.
pub fn decode_with_shape(bytes: &[u8], expected: (usize, usize)) -> Result<Array2<f32>, PhiError> {
    decode_inner(bytes, Some(expected))
}

fn decode_inner(bytes: &[u8], expected: Option<(usize, usize)>) -> Result<Array2<f32>, PhiError> {
    let mut cursor = Cursor::new(bytes);
    let header = read_header(&mut cursor)?;
    if let Some((t, c)) = expected {
        if (header.samples, header.channels) != (t, c) {
            return Err(PhiError::FormatError(format!(
                "Timeseries header declares {}x{}, container declares {}x{}",
                header.samples, header.channels, t, c
            )));
        }
    }
    let TimeseriesHeader {
        samples,
        channels,
        min,
        max,
        bits,
    } = header;
    let scale = scale_for(min, max, bits);

    let mut result = Array2::<f32>::zeros((samples, channels));
    if samples == 0 {
        return Ok(result);
    }

    let mut values = vec![0i32; samples];
    for c in 0..channels {
        values[0] = blob::read_i16(&mut cursor, "channel first value")? as i32;
        if samples >= 2 {
            let first_delta = blob::read_i16(&mut cursor, "channel first delta")? as i32;
            values[1] = values[0] + first_delta;
            if samples >= 3 && !decode_runs(&mut cursor, &mut values, first_delta) {
                log::warn!(
                    "Timeseries channel {} is truncated; holding the last delta to fill {} samples",
                    c,
                    samples
                );
            }
        }
        for (slot, &q) in result.column_mut(c).iter_mut().zip(values.iter()) {
            *slot = (q as f64 / scale + min as f64) as f32;
        }
    }

    Ok(result)
}

//==================================================================================
// 4. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn smooth_signal(samples: usize, channels: usize) -> Array2<f32> {
        Array2::from_shape_fn((samples, channels), |(t, c)| {
            let x = t as f32 * 0.01;
            (x * (c as f32 + 1.0)).sin() * (c as f32 + 1.0) + 0.1 * x
        })
    }

    #[test]
    fn test_smooth_signal_error_within_step() {
        let data = smooth_signal(1000, 3);
        let bits = 7;
        let encoded = encode(data.view(), bits).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.dim(), (1000, 3));

        let min = data.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let step = quantization_step(min, max, bits);
        for (a, b) in data.iter().zip(decoded.iter()) {
            assert!(((a - b).abs() as f64) <= step, "{} vs {} (step {})", a, b, step);
        }
    }

    #[test]
    fn test_linear_ramp_collapses_into_runs() {
        // Range 1023 at 10 bits quantizes each sample to its own index.
        let data = Array2::from_shape_fn((1024, 1), |(t, _)| t as f32);
        let encoded = encode(data.view(), 10).unwrap();
        // Header, anchors, five run records and the terminator.
        assert_eq!(encoded.len(), HEADER_LEN + 4 + 5 * 3 + 1);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_run_flushes_at_cap() {
        let data = Array2::<f32>::zeros((600, 1));
        let encoded = encode(data.view(), 7).unwrap();
        let body = &encoded[HEADER_LEN + 4..];
        // 598 zero second differences: 255 + 255 + 88, then the terminator.
        assert_eq!(body, &[255, 0, 0, 255, 0, 0, 88, 0, 0, 0]);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_short_series() {
        for samples in [1usize, 2, 3] {
            let data = Array2::from_shape_fn((samples, 2), |(t, c)| (t * 3 + c) as f32);
            let decoded = decode(&encode(data.view(), 10).unwrap()).unwrap();
            assert_eq!(decoded.dim(), (samples, 2));
            for (a, b) in data.iter().zip(decoded.iter()) {
                assert!((a - b).abs() < 0.01);
            }
        }
    }

    #[test]
    fn test_constant_signal_uses_unit_range() {
        let data = array![[4.5f32], [4.5], [4.5], [4.5]];
        let decoded = decode(&encode(data.view(), 7).unwrap()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_truncated_runs_hold_last_delta() {
        let data = Array2::from_shape_fn((128, 1), |(t, _)| t as f32);
        let mut encoded = encode(data.view(), 7).unwrap();
        // Drop the run records and the terminator, leaving only the anchors.
        encoded.truncate(HEADER_LEN + 4);
        let decoded = decode(&encoded).unwrap();
        let full = decode(&encode(data.view(), 7).unwrap()).unwrap();
        // A constant slope is exactly what holding the first delta reproduces.
        for (a, b) in full.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_truncated_header_or_anchor_is_fatal() {
        let data = smooth_signal(20, 2);
        let encoded = encode(data.view(), 7).unwrap();
        assert!(matches!(decode(&encoded[..10]), Err(PhiError::FormatError(_))));
        assert!(matches!(
            decode(&encoded[..HEADER_LEN + 1]),
            Err(PhiError::FormatError(_))
        ));
        let mut bad_bits = encoded.clone();
        bad_bits[16] = 15;
        assert!(matches!(decode(&bad_bits), Err(PhiError::FormatError(_))));
    }

    #[test]
    fn test_rejects_out_of_range_bits() {
        let data = smooth_signal(10, 1);
        assert!(matches!(
            encode(data.view(), 15),
            Err(PhiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_implausible_header_counts_are_rejected() {
        let data = smooth_signal(4, 2);
        let encoded = encode(data.view(), 7).unwrap();

        let mut huge = encoded.clone();
        huge[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        huge[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(decode(&huge), Err(PhiError::FormatError(_))));

        // More channels than the body has bytes for anchors.
        let mut wide = encoded.clone();
        wide[4..8].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(decode(&wide), Err(PhiError::FormatError(_))));

        // A sample count far beyond what the run records could describe.
        let mut long = encoded.clone();
        long[0..4].copy_from_slice(&10_000_000u32.to_le_bytes());
        assert!(matches!(decode(&long), Err(PhiError::FormatError(_))));
    }

    #[test]
    fn test_decode_with_shape_checks_before_decoding() {
        let data = smooth_signal(30, 2);
        let encoded = encode(data.view(), 7).unwrap();
        assert_eq!(decode_with_shape(&encoded, (30, 2)).unwrap().dim(), (30, 2));
        assert!(matches!(
            decode_with_shape(&encoded, (30, 3)),
            Err(PhiError::FormatError(_))
        ));
    }
}
