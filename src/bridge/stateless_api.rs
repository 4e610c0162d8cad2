// In: src/bridge/stateless_api.rs

use crate::bridge::format::{self, ContainerInfo};
use crate::config::{resolve_preset, CompressionConfig};
use crate::error::PhiError;
use crate::metrics::compression_ratio;
use crate::pipeline::orchestrator;
use crate::types::{CompressInput, Decompressed};

fn input_size(input: &CompressInput) -> usize {
    match input {
        CompressInput::Bytes(bytes) => bytes.len(),
        CompressInput::Text(text) => text.len(),
        CompressInput::Numeric(array) => array.len() * std::mem::size_of::<f32>(),
    }
}

/// Compresses `input` under the named preset.
///
/// Unknown preset names fall back to `phi-balanced`. `filename_hint` only
/// steers the detector; it is not stored.
pub fn compress<'a>(
    input: impl Into<CompressInput<'a>>,
    preset_name: &str,
    filename_hint: Option<&str>,
) -> Result<Vec<u8>, PhiError> {
    let config = resolve_preset(preset_name);
    compress_with_config(input, &config, filename_hint)
}

/// Compresses `input` under a caller-supplied configuration, which is
/// validated first.
pub fn compress_with_config<'a>(
    input: impl Into<CompressInput<'a>>,
    config: &CompressionConfig,
    filename_hint: Option<&str>,
) -> Result<Vec<u8>, PhiError> {
    config.validate()?;
    let input = input.into();
    let original_size = input_size(&input);

    // 1. Delegate detection, routing and packing to the pure engine.
    let compressed = orchestrator::compress(&input, config, filename_hint)?;

    log_metric!(
        "event" = "compress",
        "kind" = compressed.kind,
        "mode" = compressed.mode,
        "original_bytes" = original_size,
        "raw_payload_bytes" = compressed.raw_payload_size,
        "compressed_bytes" = compressed.bytes.len(),
        "ratio" = format!("{:.2}", compression_ratio(original_size, compressed.bytes.len()))
    );
    Ok(compressed.bytes)
}

/// Decompresses a container produced by `compress`.
pub fn decompress(bytes: &[u8]) -> Result<Decompressed, PhiError> {
    let output = orchestrator::decompress(bytes)?;
    log_metric!(
        "event" = "decompress",
        "compressed_bytes" = bytes.len(),
        "variant" = match &output {
            Decompressed::Bytes(_) => "bytes",
            Decompressed::Numeric(_) => "numeric",
        }
    );
    Ok(output)
}

/// Reads a container's header without decoding its payload.
/// This function acts as a simple facade over `format::peek_info`.
pub fn inspect(bytes: &[u8]) -> Result<ContainerInfo, PhiError> {
    format::peek_info(bytes)
}
