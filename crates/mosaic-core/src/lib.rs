//! Mosaic Core - Concatenative Synthesis Library
//!
//! Rebuilds a reference recording from short chunks of one or more source
//! recordings. Every chunk is fingerprinted (loudness, pitch, timbre and
//! length), fingerprints are normalized across the whole corpus, and each
//! reference chunk is replaced by its nearest source chunk before the result
//! is stitched back together.

pub mod audio;
pub mod chunking;
pub mod concat;
pub mod config;
pub mod error;
pub mod features;
pub mod matching;
pub mod normalize;
pub mod pipeline;
pub mod pitch_shift;
pub mod report;

pub use chunking::{chunk_audio, Chunk, ChunkOrigin};
pub use config::{DistanceMetric, FeatureWeights, MosaicConfig};
pub use error::{MosaicError, PoolKind, Result};
pub use features::{FeatureExtractor, Fingerprint, NormalizedFingerprint, SpectralExtractor};
pub use matching::{MatchEntry, Matcher};
pub use pipeline::{
    CancellationToken, MosaicInputs, MosaicOutput, MosaicPipeline, ProgressCallback, ProgressEvent,
    Stage,
};
pub use pitch_shift::{GranularPitchShifter, PitchShifter};
pub use report::{MatchRecord, MosaicReport};

/// Build a mosaic of `reference` from `sources` and write it to `output`
pub fn generate_mosaic(
    reference: impl Into<std::path::PathBuf>,
    sources: Vec<std::path::PathBuf>,
    output: impl Into<std::path::PathBuf>,
    config: MosaicConfig,
) -> Result<MosaicReport> {
    let inputs = MosaicInputs {
        reference: reference.into(),
        sources,
        output: output.into(),
    };
    MosaicPipeline::new(config)?.run(&inputs)
}
