//! Configuration parameters for the mosaicing engine
//!
//! Defaults are the `mosaic` command-line defaults.
//! Everything here is validated before any audio file is opened.

use crate::error::{MosaicError, Result};
use crate::features::MFCC_COEFFICIENTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Top-level engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MosaicConfig {
    /// Processing sample rate; every input is resampled to it
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunking: ChunkingConfig::default(),
            matching: MatchingConfig::default(),
            synthesis: SynthesisConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

fn default_sample_rate() -> u32 {
    22050
}

/// Random chunk segmentation bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_seconds")]
    pub min_seconds: f64,
    #[serde(default = "default_max_seconds")]
    pub max_seconds: f64,
    /// Fixed RNG seed for reproducible chunk boundaries
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_seconds: default_min_seconds(),
            max_seconds: default_max_seconds(),
            seed: None,
        }
    }
}

fn default_min_seconds() -> f64 {
    0.1
}
fn default_max_seconds() -> f64 {
    0.4
}

/// Distance metric used for the MFCC (timbre) term
///
/// Config files accept the same case-insensitive names as the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Cosine,
}

impl FromStr for DistanceMetric {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(MosaicError::config(format!(
                "unknown MFCC distance metric '{}' (expected 'euclidean' or 'cosine')",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DistanceMetric {
    type Error = MosaicError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DistanceMetric> for String {
    fn from(metric: DistanceMetric) -> Self {
        metric.to_string()
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Per-feature weights of the match distance
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FeatureWeights {
    #[serde(default = "default_weight_rms")]
    pub rms: f32,
    #[serde(default = "default_weight_pitch")]
    pub pitch: f32,
    #[serde(default = "default_weight_mfcc")]
    pub mfcc: f32,
    #[serde(default = "default_weight_duration")]
    pub duration: f32,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            rms: default_weight_rms(),
            pitch: default_weight_pitch(),
            mfcc: default_weight_mfcc(),
            duration: default_weight_duration(),
        }
    }
}

fn default_weight_rms() -> f32 {
    1.0
}
fn default_weight_pitch() -> f32 {
    1.5
}
fn default_weight_mfcc() -> f32 {
    1.0
}
fn default_weight_duration() -> f32 {
    0.5
}

/// Matching stage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub weights: FeatureWeights,
    /// Include the duration term in the distance
    #[serde(default = "default_true")]
    pub duration_matching: bool,
    /// Search reference chunks on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::default(),
            weights: FeatureWeights::default(),
            duration_matching: true,
            parallel: true,
        }
    }
}

/// Resynthesis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_true")]
    pub crossfade: bool,
    #[serde(default = "default_crossfade_seconds")]
    pub crossfade_seconds: f64,
    /// Shift each matched chunk toward the reference chunk's pitch
    #[serde(default)]
    pub pitch_adjust: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            crossfade: true,
            crossfade_seconds: default_crossfade_seconds(),
            pitch_adjust: false,
        }
    }
}

fn default_crossfade_seconds() -> f64 {
    0.01
}

/// Parameters of the built-in spectral feature extractor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Lowest accepted fundamental (C2)
    #[serde(default = "default_pitch_min_hz")]
    pub pitch_min_hz: f32,
    /// Highest accepted fundamental (C7)
    #[serde(default = "default_pitch_max_hz")]
    pub pitch_max_hz: f32,
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_mel_bands")]
    pub mel_bands: usize,
    /// Minimum NSDF clarity for a frame to count as voiced
    #[serde(default = "default_voicing_threshold")]
    pub voicing_threshold: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pitch_min_hz: default_pitch_min_hz(),
            pitch_max_hz: default_pitch_max_hz(),
            frame_length: default_frame_length(),
            hop_length: default_hop_length(),
            mel_bands: default_mel_bands(),
            voicing_threshold: default_voicing_threshold(),
        }
    }
}

fn default_pitch_min_hz() -> f32 {
    65.406
}
fn default_pitch_max_hz() -> f32 {
    2093.0
}
fn default_frame_length() -> usize {
    2048
}
fn default_hop_length() -> usize {
    512
}
fn default_mel_bands() -> usize {
    40
}
fn default_voicing_threshold() -> f32 {
    0.6
}

fn default_true() -> bool {
    true
}

impl MosaicConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MosaicError::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MosaicError::config(format!("failed to parse TOML config: {}", e)))
    }

    /// Minimum chunk length in samples at the processing rate
    pub fn min_chunk_samples(&self) -> usize {
        (self.chunking.min_seconds * self.sample_rate as f64) as usize
    }

    /// Crossfade window in samples at the processing rate
    pub fn crossfade_samples(&self) -> usize {
        (self.synthesis.crossfade_seconds * self.sample_rate as f64) as usize
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MosaicError::config("sample rate must be > 0"));
        }

        let chunking = &self.chunking;
        if !chunking.min_seconds.is_finite() || !chunking.max_seconds.is_finite() {
            return Err(MosaicError::config("chunk durations must be finite"));
        }
        if chunking.min_seconds <= 0.0 {
            return Err(MosaicError::config("chunk min duration must be positive"));
        }
        if chunking.min_seconds >= chunking.max_seconds {
            return Err(MosaicError::config(format!(
                "chunk min duration ({}s) must be smaller than chunk max duration ({}s)",
                chunking.min_seconds, chunking.max_seconds
            )));
        }
        if self.min_chunk_samples() == 0 {
            return Err(MosaicError::config(format!(
                "chunk min duration {}s is zero samples at {} Hz; use a larger minimum",
                chunking.min_seconds, self.sample_rate
            )));
        }

        let w = &self.matching.weights;
        for (name, value) in [
            ("rms", w.rms),
            ("pitch", w.pitch),
            ("mfcc", w.mfcc),
            ("duration", w.duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MosaicError::config(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let fade = self.synthesis.crossfade_seconds;
        if !fade.is_finite() || fade < 0.0 {
            return Err(MosaicError::config(format!(
                "crossfade duration must be >= 0, got {}",
                fade
            )));
        }

        let analysis = &self.analysis;
        if !(analysis.pitch_min_hz > 0.0) || analysis.pitch_min_hz >= analysis.pitch_max_hz {
            return Err(MosaicError::config(
                "pitch_min_hz must be positive and below pitch_max_hz",
            ));
        }
        if analysis.frame_length < 2 || analysis.hop_length == 0 {
            return Err(MosaicError::config(
                "frame_length must be >= 2 and hop_length must be > 0",
            ));
        }
        if analysis.mel_bands < MFCC_COEFFICIENTS {
            return Err(MosaicError::config(format!(
                "mel_bands must be at least {}, got {}",
                MFCC_COEFFICIENTS, analysis.mel_bands
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MosaicConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.matching.metric, DistanceMetric::Euclidean);
        assert_eq!(config.min_chunk_samples(), 2205);
        assert_eq!(config.crossfade_samples(), 220);
    }

    #[test]
    fn test_min_not_below_max_is_rejected() {
        let mut config = MosaicConfig::default();
        config.chunking.min_seconds = 0.4;
        config.chunking.max_seconds = 0.4;
        assert!(matches!(config.validate(), Err(MosaicError::Config(_))));

        config.chunking.min_seconds = 0.5;
        assert!(matches!(config.validate(), Err(MosaicError::Config(_))));
    }

    #[test]
    fn test_non_positive_min_is_rejected() {
        let mut config = MosaicConfig::default();
        config.chunking.min_seconds = 0.0;
        assert!(matches!(config.validate(), Err(MosaicError::Config(_))));
    }

    #[test]
    fn test_min_below_one_sample_is_rejected() {
        let mut config = MosaicConfig::default();
        config.sample_rate = 1000;
        config.chunking.min_seconds = 0.0005;
        assert!(matches!(config.validate(), Err(MosaicError::Config(_))));
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let mut config = MosaicConfig::default();
        config.matching.weights.pitch = -1.0;
        assert!(matches!(config.validate(), Err(MosaicError::Config(_))));
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(
            "Euclidean".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Euclidean
        );
        assert!(matches!(
            "manhattan".parse::<DistanceMetric>(),
            Err(MosaicError::Config(_))
        ));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            sample_rate = 44100

            [chunking]
            min_seconds = 0.05
            max_seconds = 0.2
            seed = 7

            [matching]
            metric = "cosine"
            duration_matching = false

            [matching.weights]
            pitch = 4.0

            [synthesis]
            crossfade = false
            pitch_adjust = true
        "#;

        let config = MosaicConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.chunking.seed, Some(7));
        assert_eq!(config.matching.metric, DistanceMetric::Cosine);
        assert!(!config.matching.duration_matching);
        assert_eq!(config.matching.weights.pitch, 4.0);
        assert_eq!(config.matching.weights.rms, 1.0);
        assert!(!config.synthesis.crossfade);
        assert!(config.synthesis.pitch_adjust);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_metric_names_in_toml_ignore_case() {
        for (name, expected) in [
            ("Cosine", DistanceMetric::Cosine),
            ("COSINE", DistanceMetric::Cosine),
            (" Euclidean ", DistanceMetric::Euclidean),
        ] {
            let toml_str = format!("[matching]\nmetric = \"{}\"\n", name);
            let config = MosaicConfig::from_toml_str(&toml_str).unwrap();
            assert_eq!(config.matching.metric, expected, "metric name {:?}", name);
        }
    }

    #[test]
    fn test_metric_serializes_lowercase() {
        let json = serde_json::to_string(&DistanceMetric::Cosine).unwrap();
        assert_eq!(json, "\"cosine\"");
        let back: DistanceMetric = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DistanceMetric::Cosine);
    }

    #[test]
    fn test_unknown_metric_in_toml_is_config_error() {
        let toml_str = r#"
            [matching]
            metric = "manhattan"
        "#;
        assert!(matches!(
            MosaicConfig::from_toml_str(toml_str),
            Err(MosaicError::Config(_))
        ));
    }
}
