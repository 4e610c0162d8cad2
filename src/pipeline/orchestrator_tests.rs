// In: src/pipeline/orchestrator_tests.rs

use ndarray::{Array2, Array3, ArrayD, IxDyn};

use crate::bridge::format::{self, flags, Mode};
use crate::config::CompressionConfig;
use crate::error::PhiError;
use crate::kernels::{dod_rle, symbolic};
use crate::pipeline::numeric;
use crate::pipeline::orchestrator::{compress, decompress};
use crate::types::{CompressInput, DataKind, Decompressed};

// Test Helpers
fn sensor_signal(samples: usize, channels: usize) -> Array2<f32> {
    Array2::from_shape_fn((samples, channels), |(t, c)| {
        let x = t as f32 * 0.01;
        (x * (c as f32 + 1.0)).sin() * (c as f32 + 1.0) + 0.1 * x
    })
}

fn fast_config() -> CompressionConfig {
    CompressionConfig {
        entropy_level: 3,
        ..Default::default()
    }
}

#[test]
fn test_bytes_route_to_symbolic() {
    let data = b"abcabcabcabc-xyz".to_vec();
    let out = compress(&CompressInput::Bytes(&data), &fast_config(), None).unwrap();
    assert_eq!(out.mode, Mode::Symbolic);

    let info = format::peek_info(&out.bytes).unwrap();
    assert_eq!(info.shape, vec![data.len() as u32]);
    assert!(info.has_flag(flags::ENTROPY));
    assert!(!info.has_flag(flags::CHECKSUM));

    assert_eq!(decompress(&out.bytes).unwrap(), Decompressed::Bytes(data));
}

#[test]
fn test_text_decompresses_to_bytes() {
    let text = r#"{"key": "value", "list": [1, 2, 3]}"#;
    let out = compress(&CompressInput::Text(text), &fast_config(), Some("doc.json")).unwrap();
    assert_eq!(out.kind, DataKind::Text);
    assert_eq!(out.mode, Mode::Symbolic);
    let bytes = decompress(&out.bytes).unwrap().into_bytes().unwrap();
    assert_eq!(bytes, text.as_bytes());
}

#[test]
fn test_smooth_matrix_routes_to_timeseries() {
    let data = sensor_signal(1000, 3);
    let config = fast_config();
    let out = compress(&CompressInput::from(&data), &config, None).unwrap();
    assert_eq!(out.kind, DataKind::Timeseries);
    assert_eq!(out.mode, Mode::TimeseriesDoD);

    let decoded = decompress(&out.bytes).unwrap().into_matrix().unwrap();
    assert_eq!(decoded.dim(), (1000, 3));
    let min = data.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let step = dod_rle::quantization_step(min, max, config.timeseries_bits);
    for (a, b) in data.iter().zip(decoded.iter()) {
        assert!(((a - b).abs() as f64) <= step, "{} vs {} (step {})", a, b, step);
    }
}

#[test]
fn test_timeseries_hint_on_rank3_uses_embeddings() {
    let cube = Array3::from_shape_fn((40, 3, 2), |(i, j, k)| (i as f32 * 0.1).sin() + (j * 2 + k) as f32);
    let input = CompressInput::Numeric(cube.view().into_dyn());
    let out = compress(&input, &fast_config(), Some("sensor_log.bin")).unwrap();
    assert_eq!(out.kind, DataKind::Timeseries);
    assert_eq!(out.mode, Mode::Embeddings);

    let restored = decompress(&out.bytes).unwrap().into_array().unwrap();
    assert_eq!(restored.shape(), &[40, 3, 2]);
}

#[test]
fn test_nd_input_restores_shape() {
    let array = ArrayD::from_shape_fn(IxDyn(&[12, 4, 4]), |idx| {
        (idx[0] as f32 * 0.3).cos() + idx[1] as f32 * 0.5 - idx[2] as f32 * 0.25
    });
    let out = compress(&CompressInput::from(&array), &fast_config(), None).unwrap();
    assert_eq!(out.mode, Mode::Embeddings);

    let restored = decompress(&out.bytes).unwrap().into_array().unwrap();
    assert_eq!(restored.shape(), array.shape());
    let max_err = array
        .iter()
        .zip(restored.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    assert!(max_err < 0.1, "max error {}", max_err);
}

#[test]
fn test_invalid_numeric_inputs_are_rejected() {
    let config = fast_config();

    let vector = ArrayD::<f32>::zeros(IxDyn(&[8]));
    assert!(matches!(
        compress(&CompressInput::from(&vector), &config, None),
        Err(PhiError::UnsupportedInput(_))
    ));

    let empty = Array2::<f32>::zeros((0, 4));
    assert!(matches!(
        compress(&CompressInput::from(&empty), &config, None),
        Err(PhiError::UnsupportedInput(_))
    ));

    let mut with_nan = Array2::<f32>::ones((4, 4));
    with_nan[[2, 1]] = f32::NAN;
    assert!(matches!(
        compress(&CompressInput::from(&with_nan), &config, None),
        Err(PhiError::UnsupportedInput(_))
    ));
}

#[test]
fn test_pq_flags_follow_the_stages_that_ran() {
    let data = Array2::from_shape_fn((64, 16), |(i, j)| ((i * 7 + j * 3) % 11) as f32);
    let config = CompressionConfig {
        use_pq: true,
        pq_blocks: 4,
        pq_centroids: 8,
        use_residual: true,
        seed: Some(5),
        ..fast_config()
    };
    let out = compress(&CompressInput::from(&data), &config, None).unwrap();
    let info = format::peek_info(&out.bytes).unwrap();
    assert!(info.has_flag(flags::HAS_PQ));
    assert!(info.has_flag(flags::HAS_RESIDUAL));
    assert!(decompress(&out.bytes).is_ok());

    // Claiming PQ-only while the metadata carries a residual section.
    let mut tampered = out.bytes.clone();
    tampered[5] &= !flags::HAS_RESIDUAL;
    assert!(matches!(decompress(&tampered), Err(PhiError::FormatError(_))));
}

fn small_numeric_payload() -> Vec<u8> {
    let data = Array2::from_shape_fn((4, 4), |(i, j)| (i * 4 + j) as f32 * 0.25);
    numeric::compress(data.view(), &fast_config()).unwrap().payload
}

#[test]
fn test_overflowing_embeddings_shape_is_format_error() {
    let payload = small_numeric_payload();
    let huge = 0xFFFF_FFFFusize;
    let bytes =
        format::encode_container(Mode::Embeddings, 0, &[4, huge, huge, huge], &payload).unwrap();
    assert!(matches!(decompress(&bytes), Err(PhiError::FormatError(_))));
}

#[test]
fn test_ragged_metadata_blob_is_format_error() {
    let mut payload = small_numeric_payload();
    // The PCA components blob length sits after version, variant, rows, d and k.
    let len_at = 2 + 4 + 4 + 4;
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&payload[len_at..len_at + 4]);
    let len = u32::from_le_bytes(len_bytes);
    payload[len_at..len_at + 4].copy_from_slice(&(len - 1).to_le_bytes());
    payload.remove(len_at + 4 + len as usize - 1);

    let bytes = format::encode_container(Mode::Embeddings, 0, &[4, 4], &payload).unwrap();
    assert!(matches!(decompress(&bytes), Err(PhiError::FormatError(_))));
}

#[test]
fn test_timeseries_header_must_be_plausible() {
    let mut payload = Vec::with_capacity(dod_rle::HEADER_LEN);
    payload.extend_from_slice(&u32::MAX.to_le_bytes());
    payload.extend_from_slice(&u32::MAX.to_le_bytes());
    payload.extend_from_slice(&0.0f32.to_le_bytes());
    payload.extend_from_slice(&1.0f32.to_le_bytes());
    payload.push(8);
    assert_eq!(payload.len(), dod_rle::HEADER_LEN);

    let bytes = format::encode_container(Mode::TimeseriesDoD, 0, &[4, 2], &payload).unwrap();
    assert!(matches!(decompress(&bytes), Err(PhiError::FormatError(_))));
}

#[test]
fn test_entropy_stage_is_skipped_when_flag_clear() {
    let data = b"no entropy stage here, no entropy stage".to_vec();
    let payload = symbolic::compress(&data, 3).unwrap();
    let bytes = format::encode_container(Mode::Symbolic, 0, &[data.len()], &payload).unwrap();
    assert_eq!(decompress(&bytes).unwrap(), Decompressed::Bytes(data));
}

#[test]
fn test_symbolic_length_must_match_shape() {
    let data = b"twelve bytes".to_vec();
    let payload = symbolic::compress(&data, 3).unwrap();
    let bytes = format::encode_container(Mode::Symbolic, 0, &[data.len() + 1], &payload).unwrap();
    assert!(matches!(decompress(&bytes), Err(PhiError::FormatError(_))));
}

#[test]
fn test_corrupt_entropy_payload_is_format_error() {
    let bytes = format::encode_container(
        Mode::Embeddings,
        flags::ENTROPY,
        &[2, 2],
        &[4, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef],
    )
    .unwrap();
    assert!(matches!(decompress(&bytes), Err(PhiError::FormatError(_))));
}

#[test]
fn test_checksum_flag_follows_config() {
    let config = CompressionConfig {
        embed_checksum: true,
        ..fast_config()
    };
    let out = compress(&CompressInput::Text("checked"), &config, None).unwrap();
    assert!(format::peek_info(&out.bytes).unwrap().has_flag(flags::CHECKSUM));

    let mut corrupted = out.bytes.clone();
    let last_payload_byte = corrupted.len() - format::CHECKSUM_LEN - 1;
    corrupted[last_payload_byte] ^= 0x55;
    assert!(matches!(decompress(&corrupted), Err(PhiError::FormatError(_))));
}
