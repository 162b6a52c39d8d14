//! Random-length chunk segmentation
//!
//! A waveform is tiled left to right into non-overlapping chunks whose
//! durations are drawn uniformly from `[min_seconds, max_seconds]`. The final
//! tile takes whatever is left and is dropped when it is shorter than the
//! minimum.

use crate::config::ChunkingConfig;
use crate::error::{MosaicError, Result};
use crate::features::{Fingerprint, NormalizedFingerprint};
use rand::Rng;

/// Where a chunk was cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOrigin {
    /// Index of the input file (0 is the reference for reference chunks,
    /// otherwise the position in the source list)
    pub file_index: usize,
    /// First sample of the chunk within that file
    pub offset: usize,
}

/// A contiguous slice of mono audio plus its fingerprints
#[derive(Debug, Clone)]
pub struct Chunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub origin: ChunkOrigin,
    feature: Option<Fingerprint>,
    norm_feature: Option<NormalizedFingerprint>,
}

impl Chunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32, origin: ChunkOrigin) -> Self {
        debug_assert!(!samples.is_empty(), "chunks are never empty");
        Self {
            samples,
            sample_rate,
            origin,
            feature: None,
            norm_feature: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Raw fingerprint, once extraction has run
    pub fn feature(&self) -> Option<&Fingerprint> {
        self.feature.as_ref()
    }

    /// Corpus-normalized fingerprint, once normalization has run
    pub fn norm_feature(&self) -> Option<&NormalizedFingerprint> {
        self.norm_feature.as_ref()
    }

    pub(crate) fn attach_feature(&mut self, feature: Fingerprint) {
        debug_assert!(self.feature.is_none(), "fingerprint attached twice");
        self.feature = Some(feature);
    }

    pub(crate) fn attach_norm_feature(&mut self, norm: NormalizedFingerprint) {
        self.norm_feature = Some(norm);
    }
}

/// Minimum chunk length in samples, failing when it rounds down to zero
pub fn min_chunk_samples(config: &ChunkingConfig, sample_rate: u32) -> Result<usize> {
    if !(config.min_seconds > 0.0) || config.min_seconds >= config.max_seconds {
        return Err(MosaicError::Config(format!(
            "invalid chunk bounds: need 0 < min ({}) < max ({})",
            config.min_seconds, config.max_seconds
        )));
    }
    let min_samples = (config.min_seconds * sample_rate as f64) as usize;
    if min_samples == 0 {
        return Err(MosaicError::Config(format!(
            "chunk min duration {}s maps to zero samples at {} Hz",
            config.min_seconds, sample_rate
        )));
    }
    Ok(min_samples)
}

/// Split `samples` into random-length chunks
pub fn chunk_audio<R: Rng + ?Sized>(
    samples: &[f32],
    sample_rate: u32,
    file_index: usize,
    config: &ChunkingConfig,
    rng: &mut R,
) -> Result<Vec<Chunk>> {
    let min_samples = min_chunk_samples(config, sample_rate)?;

    let mut chunks = Vec::new();
    let mut position = 0;
    let mut dropped = 0;

    while position < samples.len() {
        let duration_s = rng.gen_range(config.min_seconds..=config.max_seconds);
        let tile_samples = ((duration_s * sample_rate as f64) as usize).max(min_samples);
        let end = (position + tile_samples).min(samples.len());

        if end - position >= min_samples {
            chunks.push(Chunk::new(
                samples[position..end].to_vec(),
                sample_rate,
                ChunkOrigin {
                    file_index,
                    offset: position,
                },
            ));
        } else {
            dropped = end - position;
        }

        position = end;
    }

    log::debug!(
        "File {}: {} chunks from {} samples ({} trailing samples dropped)",
        file_index,
        chunks.len(),
        samples.len(),
        dropped
    );

    Ok(chunks)
}
