// In: src/config.rs

//! The single source of truth for all phi compression configuration.
//!
//! A `CompressionConfig` is resolved once per call, either from a named preset
//! or from a user-supplied record, and is then passed down by shared reference.
//! Nothing below the public API ever mutates it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PhiError;

//==================================================================================
// I. Presets
//==================================================================================

/// The fixed, enumerated set of named presets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Phase-1, best quality.
    #[serde(rename = "phi-analytics")]
    Analytics,
    /// Phase-1, balanced. The documented fallback for unknown names.
    #[default]
    #[serde(rename = "phi-balanced")]
    Balanced,
    /// Phase-1, maximum ratio with a single global quantization range.
    #[serde(rename = "phi-max")]
    Max,
    /// Phase-2, block PQ followed by a residual correction pass.
    #[serde(rename = "phi-pq-quality")]
    PqQuality,
    /// Phase-2, block PQ only.
    #[serde(rename = "phi-pq-balanced")]
    PqBalanced,
    /// Phase-2, more blocks and a global range.
    #[serde(rename = "phi-pq-aggressive")]
    PqAggressive,
    /// Tuned for text; numeric settings mirror `phi-analytics`.
    #[serde(rename = "phi-global")]
    Global,
    /// Tuned for live sensor streams.
    #[serde(rename = "phi-live")]
    Live,
}

impl Preset {
    pub const ALL: [Preset; 8] = [
        Preset::Analytics,
        Preset::Balanced,
        Preset::Max,
        Preset::PqQuality,
        Preset::PqBalanced,
        Preset::PqAggressive,
        Preset::Global,
        Preset::Live,
    ];

    /// The canonical `phi-*` name.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Analytics => "phi-analytics",
            Preset::Balanced => "phi-balanced",
            Preset::Max => "phi-max",
            Preset::PqQuality => "phi-pq-quality",
            Preset::PqBalanced => "phi-pq-balanced",
            Preset::PqAggressive => "phi-pq-aggressive",
            Preset::Global => "phi-global",
            Preset::Live => "phi-live",
        }
    }

    /// The configuration record for this preset.
    pub fn config(&self) -> CompressionConfig {
        let base = CompressionConfig::default();
        match self {
            Preset::Analytics | Preset::Global => CompressionConfig {
                target_variance: 0.95,
                ..base
            },
            Preset::Balanced | Preset::Live => base,
            Preset::Max => CompressionConfig {
                target_variance: 0.90,
                quant_bits: 8,
                per_component: false,
                ..base
            },
            Preset::PqQuality => CompressionConfig {
                target_variance: 0.97,
                use_pq: true,
                use_residual: true,
                residual_variance: 0.95,
                residual_bits: 8,
                ..base
            },
            Preset::PqBalanced => CompressionConfig {
                target_variance: 0.95,
                quant_bits: 10,
                use_pq: true,
                ..base
            },
            Preset::PqAggressive => CompressionConfig {
                target_variance: 0.92,
                quant_bits: 8,
                per_component: false,
                use_pq: true,
                pq_blocks: 12,
                ..base
            },
        }
    }
}

impl FromStr for Preset {
    type Err = PhiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| PhiError::InvalidConfig(format!("Unknown preset '{}'", s)))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves a preset name to its configuration.
///
/// Unknown names never fail: they fall back to `phi-balanced` with a warning.
pub fn resolve_preset(name: &str) -> CompressionConfig {
    match name.parse::<Preset>() {
        Ok(preset) => preset.config(),
        Err(_) => {
            log::warn!(
                "Preset '{}' not found, using '{}'",
                name,
                Preset::default().name()
            );
            Preset::default().config()
        }
    }
}

//==================================================================================
// II. The Unified CompressionConfig
//==================================================================================

/// Every tunable of the engine. Defaults equal the `phi-balanced` preset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct CompressionConfig {
    /// Cumulative explained-variance ratio the outer PCA must retain.
    /// Values at or above `0.9999` skip PCA entirely.
    pub target_variance: f64,

    /// Bit depth of the Phase-1 scalar quantizer.
    pub quant_bits: u8,

    /// One (scale, zero) pair per retained dimension instead of a global pair.
    pub per_component: bool,

    /// Replace scalar quantization with block product quantization.
    pub use_pq: bool,

    /// Number of column blocks, each with its own codebook.
    pub pq_blocks: usize,

    /// Target centroid count per codebook.
    pub pq_centroids: usize,

    /// Lloyd iteration cap per block.
    pub pq_max_iter: usize,

    /// Run a second PCA + quantization pass over the PQ reconstruction error.
    /// Ignored unless `use_pq` is set.
    pub use_residual: bool,

    /// Explained-variance target of the residual PCA.
    pub residual_variance: f64,

    /// Bit depth of the residual quantizer.
    pub residual_bits: u8,

    /// Bit depth of the timeseries quantizer. Bounded so second differences fit in `i16`.
    pub timeseries_bits: u8,

    /// Zstd level of the entropy backend.
    pub entropy_level: i32,

    /// Append a CRC-32 of the entropy-coded payload to the container.
    pub embed_checksum: bool,

    /// Seed for the clustering initializer. `None` draws one from the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            target_variance: 0.94,
            quant_bits: 12,
            per_component: true,
            use_pq: false,
            pq_blocks: 8,
            pq_centroids: 256,
            pq_max_iter: 20,
            use_residual: false,
            residual_variance: 0.95,
            residual_bits: 8,
            timeseries_bits: 7,
            entropy_level: 19,
            embed_checksum: false,
            seed: None,
        }
    }
}

/// The variance at or above which PCA is bypassed.
pub const PCA_BYPASS_VARIANCE: f64 = 0.9999;

/// Highest timeseries bit depth whose second differences still fit in `i16`.
pub const MAX_TIMESERIES_BITS: u8 = 14;

impl CompressionConfig {
    /// Parses a partial JSON override on top of the defaults and validates it.
    pub fn from_json(json: &str) -> Result<Self, PhiError> {
        let config: CompressionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config for diagnostics.
    pub fn to_json(&self) -> Result<String, PhiError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks every tunable against its admissible range.
    pub fn validate(&self) -> Result<(), PhiError> {
        check_variance("target_variance", self.target_variance)?;
        check_bits("quant_bits", self.quant_bits, 32)?;
        if self.use_pq {
            if self.pq_blocks == 0 {
                return Err(PhiError::InvalidConfig("pq_blocks must be positive".into()));
            }
            if self.pq_centroids == 0 || self.pq_centroids > u32::MAX as usize {
                return Err(PhiError::InvalidConfig(format!(
                    "pq_centroids must be within 1..={}, got {}",
                    u32::MAX,
                    self.pq_centroids
                )));
            }
            if self.use_residual {
                check_variance("residual_variance", self.residual_variance)?;
                check_bits("residual_bits", self.residual_bits, 32)?;
            }
        }
        check_bits("timeseries_bits", self.timeseries_bits, MAX_TIMESERIES_BITS)?;
        Ok(())
    }

    /// Whether the residual pass will actually run.
    pub fn residual_enabled(&self) -> bool {
        self.use_pq && self.use_residual
    }
}

fn check_variance(name: &str, value: f64) -> Result<(), PhiError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(PhiError::InvalidConfig(format!(
            "{} must be within (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_bits(name: &str, value: u8, max: u8) -> Result<(), PhiError> {
    if value == 0 || value > max {
        return Err(PhiError::InvalidConfig(format!(
            "{} must be within 1..={}, got {}",
            name, max, value
        )));
    }
    Ok(())
}
