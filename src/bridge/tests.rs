use super::*;
use crate::bridge::format::flags;
use crate::config::CompressionConfig;
use crate::error::PhiError;
use crate::kernels::dod_rle::quantization_step;
use crate::metrics::{compression_ratio, mean_cosine_similarity};
use crate::types::Decompressed;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Gaussian rows scaled to unit length.
fn unit_embeddings(rows: usize, dims: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, 1.0).unwrap();
    let mut data = Array2::from_shape_fn((rows, dims), |_| normal.sample(&mut rng));
    for mut row in data.rows_mut() {
        let norm = row.dot(&row).sqrt();
        row.mapv_inplace(|x| x / norm);
    }
    data
}

fn roundtrip_text(text: &str) -> Vec<u8> {
    let compressed = compress(text, "phi-global", None).unwrap();
    decompress(&compressed).unwrap().into_bytes().unwrap()
}

#[test]
fn test_text_roundtrips_exactly() {
    for text in [
        "",
        "x",
        "Hello, World!",
        "Ünïcödé 文字列 🚀 and back",
        r#"{"a": [1, 2, 3], "b": {"c": null, "d": "e"}, "f": true}"#,
    ] {
        assert_eq!(roundtrip_text(text), text.as_bytes(), "roundtrip of {:?}", text);
    }
}

#[test]
fn test_binary_roundtrips_exactly() {
    let data: Vec<u8> = (0..5000u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
    let compressed = compress(&data, "phi-balanced", Some("blob.bin")).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), Decompressed::Bytes(data));
}

#[test]
fn test_repetitive_text_compresses_well() {
    let text = "Hello, World! ".repeat(100);
    let compressed = compress(text.as_str(), "phi-global", Some("greeting.txt")).unwrap();
    let ratio = compression_ratio(text.len(), compressed.len());
    assert!(ratio > 5.0, "ratio {}", ratio);
    assert_eq!(roundtrip_text(&text), text.as_bytes());
}

#[test]
fn test_corrupted_magic_is_format_error() {
    let mut compressed = compress("some text", "phi-global", None).unwrap();
    compressed[0] ^= 0xff;
    assert!(matches!(decompress(&compressed), Err(PhiError::FormatError(_))));
    assert!(matches!(inspect(&compressed), Err(PhiError::FormatError(_))));
}

#[test]
fn test_truncated_container_is_format_error() {
    let compressed = compress("truncate me, truncate me", "phi-global", None).unwrap();
    for cut in [0, 3, 10, compressed.len() - 1] {
        assert!(
            matches!(decompress(&compressed[..cut]), Err(PhiError::FormatError(_))),
            "cut at {}",
            cut
        );
    }
}

#[test]
fn test_embeddings_phase1_quality() {
    let data = unit_embeddings(1000, 512, 42);
    let compressed = compress(&data, "phi-balanced", None).unwrap();
    let info = inspect(&compressed).unwrap();
    assert_eq!(info.mode, Mode::Embeddings);
    assert_eq!(info.shape, vec![1000, 512]);
    assert!(!info.has_flag(flags::HAS_PQ));

    let restored = decompress(&compressed).unwrap().into_matrix().unwrap();
    assert_eq!(restored.dim(), (1000, 512));
    let cosine = mean_cosine_similarity(data.view(), restored.view()).unwrap();
    assert!(cosine > 0.90, "mean cosine {}", cosine);
}

#[test]
fn test_pq_presets_set_flags_and_decode() {
    let data = unit_embeddings(300, 64, 9);

    let balanced = compress(&data, "phi-pq-balanced", None).unwrap();
    let info = inspect(&balanced).unwrap();
    assert!(info.has_flag(flags::HAS_PQ));
    assert!(!info.has_flag(flags::HAS_RESIDUAL));
    let restored = decompress(&balanced).unwrap().into_matrix().unwrap();
    let cosine = mean_cosine_similarity(data.view(), restored.view()).unwrap();
    assert!(cosine > 0.85, "pq-balanced mean cosine {}", cosine);

    let quality = compress(&data, "phi-pq-quality", None).unwrap();
    let info = inspect(&quality).unwrap();
    assert!(info.has_flag(flags::HAS_PQ) && info.has_flag(flags::HAS_RESIDUAL));
    let restored = decompress(&quality).unwrap().into_matrix().unwrap();
    assert_eq!(restored.dim(), (300, 64));
}

#[test]
fn test_timeseries_roundtrip_within_step() {
    let data = Array2::from_shape_fn((1000, 3), |(t, c)| {
        let x = t as f32 * 0.02;
        (x + c as f32).sin() * 10.0 + c as f32
    });
    let compressed = compress(&data, "phi-live", Some("sensor_feed.csv")).unwrap();
    assert_eq!(inspect(&compressed).unwrap().mode, Mode::TimeseriesDoD);

    let restored = decompress(&compressed).unwrap().into_matrix().unwrap();
    assert_eq!(restored.dim(), (1000, 3));
    let min = data.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let step = quantization_step(min, max, CompressionConfig::default().timeseries_bits);
    for (a, b) in data.iter().zip(restored.iter()) {
        assert!(((a - b).abs() as f64) <= step, "{} vs {} (step {})", a, b, step);
    }
}

#[test]
fn test_checksum_is_opt_in() {
    let text = "checksummed payload";
    let plain = compress(text, "phi-global", None).unwrap();
    assert!(!inspect(&plain).unwrap().has_flag(flags::CHECKSUM));

    let config = CompressionConfig {
        embed_checksum: true,
        ..Default::default()
    };
    let checked = compress_with_config(text, &config, None).unwrap();
    assert!(inspect(&checked).unwrap().has_flag(flags::CHECKSUM));
    assert_eq!(checked.len(), plain.len() + format::CHECKSUM_LEN);
    assert_eq!(decompress(&checked).unwrap().into_bytes().unwrap(), text.as_bytes());
}

#[test]
fn test_unknown_preset_falls_back_to_balanced() {
    let data = Array2::from_shape_fn((30, 8), |(i, j)| (i as f32 * 0.7 + j as f32).cos());
    let fallback = compress(&data, "phi-does-not-exist", None).unwrap();
    let balanced = compress(&data, "phi-balanced", None).unwrap();
    assert_eq!(fallback, balanced);
}

#[test]
fn test_unsupported_inputs() {
    let vector = ndarray::Array1::<f32>::zeros(16).into_dyn();
    assert!(matches!(
        compress(&vector, "phi-balanced", None),
        Err(PhiError::UnsupportedInput(_))
    ));
    let mut inf = Array2::<f32>::zeros((4, 4));
    inf[[0, 0]] = f32::INFINITY;
    assert!(matches!(
        compress(&inf, "phi-balanced", None),
        Err(PhiError::UnsupportedInput(_))
    ));
}
