//! Corpus-wide min-max normalization
//!
//! Runs once over the union of the reference and source chunks so that all
//! distances are computed on a shared [0, 1] scale.

use crate::chunking::Chunk;
use crate::error::{MosaicError, PoolKind, Result};
use crate::features::{Fingerprint, NormalizedFingerprint, MFCC_COEFFICIENTS};

/// Added to MFCC ranges so constant coefficients do not divide by zero
const MFCC_EPSILON: f64 = 1e-9;

/// Value given to a scalar feature that is constant across the corpus
const FLAT_FEATURE_VALUE: f32 = 0.5;

/// Observed min and max of one scalar feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarRange {
    pub min: f64,
    pub max: f64,
}

impl ScalarRange {
    fn new(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Map into [0, 1]; a flat range maps everything to 0.5
    pub fn scale(&self, value: f64) -> f32 {
        let span = self.max - self.min;
        if span == 0.0 {
            FLAT_FEATURE_VALUE
        } else {
            ((value - self.min) / span) as f32
        }
    }
}

/// Per-dimension bounds of a fingerprint corpus
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRanges {
    pub rms: ScalarRange,
    pub pitch: ScalarRange,
    pub duration: ScalarRange,
    pub mfcc: [ScalarRange; MFCC_COEFFICIENTS],
}

impl FeatureRanges {
    /// Bounds over a set of fingerprints, `None` when the set is empty
    pub fn from_fingerprints<'a>(fingerprints: impl IntoIterator<Item = &'a Fingerprint>) -> Option<Self> {
        let mut iter = fingerprints.into_iter();
        let first = iter.next()?;

        let mut ranges = Self {
            rms: ScalarRange::new(first.rms as f64),
            pitch: ScalarRange::new(first.pitch as f64),
            duration: ScalarRange::new(first.duration as f64),
            mfcc: first.mfcc.map(|c| ScalarRange::new(c as f64)),
        };

        for fp in iter {
            ranges.rms.include(fp.rms as f64);
            ranges.pitch.include(fp.pitch as f64);
            ranges.duration.include(fp.duration as f64);
            for (range, &c) in ranges.mfcc.iter_mut().zip(&fp.mfcc) {
                range.include(c as f64);
            }
        }

        Some(ranges)
    }

    pub fn normalize(&self, fp: &Fingerprint) -> NormalizedFingerprint {
        let mut mfcc = [0.0f32; MFCC_COEFFICIENTS];
        for ((out, range), &c) in mfcc.iter_mut().zip(&self.mfcc).zip(&fp.mfcc) {
            *out = ((c as f64 - range.min) / (range.max - range.min + MFCC_EPSILON)) as f32;
        }

        NormalizedFingerprint {
            rms: self.rms.scale(fp.rms as f64),
            pitch: self.pitch.scale(fp.pitch as f64),
            mfcc,
            duration: self.duration.scale(fp.duration as f64),
        }
    }
}

/// Normalize reference and source chunks jointly
///
/// Every chunk must already carry a raw fingerprint.
pub fn normalize_corpus(reference: &mut [Chunk], sources: &mut [Chunk]) -> Result<FeatureRanges> {
    if reference.is_empty() {
        return Err(MosaicError::EmptyPool(PoolKind::Reference));
    }
    if sources.is_empty() {
        return Err(MosaicError::EmptyPool(PoolKind::Source));
    }

    let mut fingerprints = Vec::with_capacity(reference.len() + sources.len());
    for (index, chunk) in reference.iter().chain(sources.iter()).enumerate() {
        let fp = chunk.feature().ok_or_else(|| {
            MosaicError::Feature(format!("chunk {} reached normalization without a fingerprint", index))
        })?;
        fingerprints.push(*fp);
    }

    let ranges = FeatureRanges::from_fingerprints(&fingerprints)
        .ok_or(MosaicError::EmptyPool(PoolKind::Reference))?;

    for (chunk, fp) in reference
        .iter_mut()
        .chain(sources.iter_mut())
        .zip(&fingerprints)
    {
        chunk.attach_norm_feature(ranges.normalize(fp));
    }

    log::debug!(
        "Normalized {} chunks: rms [{:.4}, {:.4}], pitch [{:.1}, {:.1}] Hz, duration [{}, {}] samples",
        fingerprints.len(),
        ranges.rms.min,
        ranges.rms.max,
        ranges.pitch.min,
        ranges.pitch.max,
        ranges.duration.min,
        ranges.duration.max
    );

    Ok(ranges)
}
