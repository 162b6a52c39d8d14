//! Nearest-fingerprint search
//!
//! For each reference chunk the whole source pool is scanned and the chunk with
//! the lowest weighted distance wins. Ties keep the first candidate in pool
//! order, so a fixed pool, weights and metric always give the same assignment.

use crate::chunking::Chunk;
use crate::config::{DistanceMetric, FeatureWeights, MatchingConfig};
use crate::error::{MosaicError, Result};
use crate::features::NormalizedFingerprint;
use crate::pipeline::CancellationToken;
use rayon::prelude::*;
use serde::Serialize;


/// Best source chunk for one reference chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchEntry {
    /// Position in the reference sequence
    pub reference_index: usize,
    /// Position in the source pool
    pub source_index: usize,
    /// Weighted distance of the winning candidate
    pub distance: f32,
    /// Pitch shift applied to the private copy, if any
    pub semitones: Option<f32>,
}

/// Distance between two normalized MFCC vectors
pub fn mfcc_distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                let d = (x - y) as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt() as f32,
        DistanceMetric::Cosine => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
            let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                // Maximal dissimilarity rather than a division by zero
                return 1.0;
            }
            let similarity = dot / (norm_a * norm_b);
            (1.0 - similarity).clamp(0.0, 2.0) as f32
        }
    }
}

/// Weighted fingerprint distance, configured once per run
#[derive(Debug, Clone)]
pub struct Matcher {
    weights: FeatureWeights,
    metric: DistanceMetric,
    use_duration: bool,
    parallel: bool,
}

impl Matcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            weights: config.weights,
            metric: config.metric,
            use_duration: config.duration_matching,
            parallel: config.parallel,
        }
    }

    /// Weighted distance between two normalized fingerprints
    pub fn distance(&self, reference: &NormalizedFingerprint, source: &NormalizedFingerprint) -> f32 {
        let w = &self.weights;
        let mut total = w.rms * (reference.rms - source.rms).abs()
            + w.pitch * (reference.pitch - source.pitch).abs()
            + w.mfcc * mfcc_distance(self.metric, &reference.mfcc, &source.mfcc);

        if self.use_duration {
            total += w.duration * (reference.duration - source.duration).abs();
        }
        total
    }

    /// Linear scan for the closest source chunk; first minimum wins
    pub fn find_best(
        &self,
        reference: &NormalizedFingerprint,
        pool: &[NormalizedFingerprint],
    ) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;

        for (index, candidate) in pool.iter().enumerate() {
            let distance = self.distance(reference, candidate);
            log::trace!("  candidate {}: distance {:.6}", index, distance);
            if distance.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((index, distance));
            }
        }

        best
    }

    /// Match every reference chunk against the pool, in reference order
    ///
    /// `on_matched` is called once per finished reference chunk with the number
    /// completed so far; with parallel matching the calls may come from worker
    /// threads.
    pub fn match_all(
        &self,
        reference: &[Chunk],
        pool: &[Chunk],
        cancel: &CancellationToken,
        on_matched: &(dyn Fn(usize) + Sync),
    ) -> Result<Vec<MatchEntry>> {
        let pool_features = collect_normalized(pool, reference.len())?;
        let reference_features = collect_normalized(reference, 0)?;

        log::info!(
            "Matching {} reference chunks against {} source chunks ({} metric{})",
            reference.len(),
            pool.len(),
            self.metric,
            if self.use_duration { ", duration on" } else { "" }
        );

        let completed = std::sync::atomic::AtomicUsize::new(0);
        let search = |(reference_index, features): (usize, &NormalizedFingerprint)| {
            if cancel.is_cancelled() {
                return Err(MosaicError::Cancelled);
            }
            let (source_index, distance) = self
                .find_best(features, &pool_features)
                .ok_or(MosaicError::MatchNotFound { reference_index })?;

            let done = completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
            on_matched(done);

            Ok(MatchEntry {
                reference_index,
                source_index,
                distance,
                semitones: None,
            })
        };

        if self.parallel {
            reference_features.par_iter().enumerate().map(search).collect()
        } else {
            reference_features.iter().enumerate().map(search).collect()
        }
    }
}

/// Normalized fingerprints of `chunks`; `base` offsets indices in errors
fn collect_normalized(chunks: &[Chunk], base: usize) -> Result<Vec<NormalizedFingerprint>> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            chunk
                .norm_feature()
                .copied()
                .ok_or(MosaicError::NotNormalized { chunk: base + i })
        })
        .collect()
}
