//! Chunk fingerprints and the feature extractor contract
//!
//! A fingerprint describes a chunk by loudness (RMS), pitch, timbre (13 mean
//! MFCCs) and length. The engine treats extraction as a black box behind
//! [`FeatureExtractor`]; [`SpectralExtractor`] is the built-in implementation.

mod mfcc;
mod pitch;

pub use mfcc::MfccAnalyzer;
pub use pitch::PitchTracker;

use crate::chunking::Chunk;
use crate::config::AnalysisConfig;
use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Number of cepstral coefficients in a fingerprint
pub const MFCC_COEFFICIENTS: usize = 13;

/// Raw acoustic fingerprint of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Root-mean-square amplitude
    pub rms: f32,
    /// Mean fundamental frequency in Hz over voiced frames (0 = unvoiced)
    pub pitch: f32,
    /// Mean MFCC vector
    pub mfcc: [f32; MFCC_COEFFICIENTS],
    /// Length in samples
    pub duration: usize,
}

/// Fingerprint with every component rescaled to [0, 1] across the corpus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFingerprint {
    pub rms: f32,
    pub pitch: f32,
    pub mfcc: [f32; MFCC_COEFFICIENTS],
    pub duration: f32,
}

/// Computes a fingerprint from a chunk's samples
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint>;
}

/// Built-in extractor: time-domain RMS, NSDF pitch tracking and mel cepstrum
pub struct SpectralExtractor {
    pitch: PitchTracker,
    mfcc: MfccAnalyzer,
}

impl SpectralExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            pitch: PitchTracker::new(config),
            mfcc: MfccAnalyzer::new(config),
        }
    }
}

impl Default for SpectralExtractor {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl FeatureExtractor for SpectralExtractor {
    fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint> {
        if samples.is_empty() {
            anyhow::bail!("cannot fingerprint an empty chunk");
        }

        Ok(Fingerprint {
            rms: compute_rms(samples),
            pitch: self.pitch.mean_pitch(samples, sample_rate),
            mfcc: self.mfcc.mean_mfcc(samples, sample_rate),
            duration: samples.len(),
        })
    }
}

/// Root-mean-square amplitude
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Fingerprint every chunk in parallel, dropping chunks the extractor rejects
///
/// Returns the number of chunks dropped.
pub fn extract_all(chunks: &mut Vec<Chunk>, extractor: &dyn FeatureExtractor) -> usize {
    let results: Vec<Result<Fingerprint>> = chunks
        .par_iter()
        .map(|chunk| extractor.extract(&chunk.samples, chunk.sample_rate))
        .collect();

    let before = chunks.len();
    let mut kept = Vec::with_capacity(before);
    for (mut chunk, result) in chunks.drain(..).zip(results) {
        match result {
            Ok(feature) => {
                chunk.attach_feature(feature);
                kept.push(chunk);
            }
            Err(e) => log::warn!(
                "Dropping chunk at sample {} of file {}: {:#}",
                chunk.origin.offset,
                chunk.origin.file_index,
                e
            ),
        }
    }
    *chunks = kept;

    before - chunks.len()
}

/// Create periodic Hann window
pub(crate) fn create_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkOrigin;
    use approx::assert_abs_diff_eq;

    pub(crate) fn sine(freq: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_rms_of_sine() {
        let samples = sine(440.0, 1.0, 22050, 22050);
        assert_abs_diff_eq!(compute_rms(&samples), std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-3);
        assert_eq!(compute_rms(&[0.0; 64]), 0.0);
    }

    #[test]
    fn test_hann_window() {
        let window = create_hann_window(512);
        assert_eq!(window.len(), 512);
        assert!(window[0].abs() < 1e-6);
        assert!((window[256] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_spectral_extractor_fingerprint() {
        let extractor = SpectralExtractor::default();
        let samples = sine(440.0, 0.5, 4410, 22050);
        let fp = extractor.extract(&samples, 22050).unwrap();

        assert_eq!(fp.duration, 4410);
        assert_abs_diff_eq!(fp.rms, 0.5 * std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-3);
        assert!((fp.pitch - 440.0).abs() < 3.0, "pitch was {}", fp.pitch);
        assert!(fp.mfcc.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_extractor_rejects_empty() {
        let extractor = SpectralExtractor::default();
        assert!(extractor.extract(&[], 22050).is_err());
    }

    struct RejectShort;

    impl FeatureExtractor for RejectShort {
        fn extract(&self, samples: &[f32], _sample_rate: u32) -> Result<Fingerprint> {
            if samples.len() < 10 {
                anyhow::bail!("too short");
            }
            Ok(Fingerprint {
                rms: compute_rms(samples),
                pitch: 0.0,
                mfcc: [0.0; MFCC_COEFFICIENTS],
                duration: samples.len(),
            })
        }
    }

    #[test]
    fn test_extract_all_drops_failures() {
        let origin = ChunkOrigin {
            file_index: 0,
            offset: 0,
        };
        let mut chunks = vec![
            Chunk::new(vec![0.1; 20], 1000, origin),
            Chunk::new(vec![0.1; 5], 1000, origin),
            Chunk::new(vec![0.2; 30], 1000, origin),
        ];

        let dropped = extract_all(&mut chunks, &RejectShort);

        assert_eq!(dropped, 1);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.feature().is_some()));
        assert_eq!(chunks[1].feature().unwrap().duration, 30);
    }
}
