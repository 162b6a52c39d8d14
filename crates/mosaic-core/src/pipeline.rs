//! End-to-end mosaicing run
//!
//! Stages run strictly in order: chunk the reference, chunk the sources,
//! extract features, normalize jointly, match, optionally pitch-adjust, and
//! concatenate. A stage that leaves a mandatory pool empty aborts the run
//! before the next stage starts.

use crate::audio::{decode_audio, write_wav};
use crate::chunking::{chunk_audio, Chunk, ChunkOrigin};
use crate::concat::{crossfade_concat, hard_concat};
use crate::config::MosaicConfig;
use crate::error::{MosaicError, PoolKind, Result};
use crate::features::{extract_all, FeatureExtractor, SpectralExtractor};
use crate::matching::{MatchEntry, Matcher};
use crate::normalize::normalize_corpus;
use crate::pitch_shift::{adjust_pitch, GranularPitchShifter, PitchShifter};
use crate::report::{MatchRecord, MosaicReport, SkippedFile};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag shared between a run and its controller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    ChunkReference,
    ChunkSources,
    ExtractFeatures,
    Normalize,
    Match,
    PitchAdjust,
    Concatenate,
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::ChunkReference => "chunk reference",
            Stage::ChunkSources => "chunk sources",
            Stage::ExtractFeatures => "extract features",
            Stage::Normalize => "normalize",
            Stage::Match => "match",
            Stage::PitchAdjust => "pitch adjust",
            Stage::Concatenate => "concatenate",
            Stage::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Progress notifications delivered to the optional callback
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted(Stage),
    FileLoaded { path: PathBuf, duration_s: f64 },
    FileSkipped { path: PathBuf, reason: String },
    ChunksCreated { pool: PoolKind, file_index: usize, count: usize },
    /// `index` reference chunks out of `total` have been matched
    ReferenceMatched { index: usize, total: usize },
    Finished { output_samples: usize },
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Files for one run
#[derive(Debug, Clone)]
pub struct MosaicInputs {
    pub reference: PathBuf,
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
}

/// One spliced chunk of the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplicedMatch {
    pub entry: MatchEntry,
    /// Where the source chunk was cut from
    pub source: ChunkOrigin,
}

/// In-memory result of [`MosaicPipeline::compose`]
#[derive(Debug, Clone)]
pub struct MosaicOutput {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// One entry per reference chunk, in playback order
    pub matches: Vec<SplicedMatch>,
    pub reference_chunks: usize,
    pub source_chunks: usize,
    /// Indices into `sources` of buffers shorter than one chunk
    pub unchunked_sources: Vec<usize>,
}

/// Configured mosaicing engine
pub struct MosaicPipeline {
    config: MosaicConfig,
    extractor: Box<dyn FeatureExtractor>,
    shifter: Box<dyn PitchShifter>,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl MosaicPipeline {
    /// Validate `config` and build a pipeline with the built-in analyzers
    ///
    /// Fails with [`MosaicError::Config`] before any file is touched.
    pub fn new(config: MosaicConfig) -> Result<Self> {
        config.validate()?;
        let extractor = SpectralExtractor::new(&config.analysis);
        Ok(Self {
            config,
            extractor: Box::new(extractor),
            shifter: Box::new(GranularPitchShifter::default()),
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_extractor(mut self, extractor: impl FeatureExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_pitch_shifter(mut self, shifter: impl PitchShifter + 'static) -> Self {
        self.shifter = Box::new(shifter);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    /// Token that cancels this pipeline's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Load, mosaic and write one set of files
    pub fn run(&self, inputs: &MosaicInputs) -> Result<MosaicReport> {
        let start = Instant::now();
        let sample_rate = self.config.sample_rate;
        self.enter(Stage::Init)?;

        let Ok(reference) = self.load(&inputs.reference) else {
            return Err(MosaicError::EmptyPool(PoolKind::Reference));
        };

        let mut skipped = Vec::new();
        let mut source_paths = Vec::with_capacity(inputs.sources.len());
        let mut sources = Vec::with_capacity(inputs.sources.len());
        for path in &inputs.sources {
            match self.load(path) {
                Ok(samples) => {
                    source_paths.push(path.clone());
                    sources.push(samples);
                }
                Err(reason) => skipped.push(reason),
            }
        }
        if sources.is_empty() {
            return Err(MosaicError::EmptyPool(PoolKind::Source));
        }

        let composed = self.compose(&reference, &sources)?;

        let mut used_sources = Vec::with_capacity(source_paths.len());
        for (file_index, path) in source_paths.iter().enumerate() {
            if composed.unchunked_sources.contains(&file_index) {
                let reason = format!(
                    "shorter than one {}s chunk",
                    self.config.chunking.min_seconds
                );
                self.emit(ProgressEvent::FileSkipped {
                    path: path.clone(),
                    reason: reason.clone(),
                });
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                });
            } else {
                used_sources.push(path.clone());
            }
        }

        self.enter(Stage::Emit)?;
        write_wav(&inputs.output, &composed.samples, sample_rate).map_err(|source| {
            MosaicError::Write {
                path: inputs.output.clone(),
                source,
            }
        })?;
        log::info!(
            "Wrote {} ({:.2}s)",
            inputs.output.display(),
            composed.samples.len() as f64 / sample_rate as f64
        );

        let matches = composed
            .matches
            .iter()
            .map(|m| MatchRecord {
                reference_index: m.entry.reference_index,
                source_file: source_paths[m.source.file_index].clone(),
                source_offset: m.source.offset,
                distance: m.entry.distance,
                semitones: m.entry.semitones,
            })
            .collect();

        self.emit(ProgressEvent::Finished {
            output_samples: composed.samples.len(),
        });

        Ok(MosaicReport {
            reference: inputs.reference.clone(),
            sources: used_sources,
            skipped,
            output: inputs.output.clone(),
            sample_rate,
            reference_chunks: composed.reference_chunks,
            source_chunks: composed.source_chunks,
            output_duration_s: composed.samples.len() as f64 / sample_rate as f64,
            elapsed_s: start.elapsed().as_secs_f64(),
            matches,
        })
    }

    /// Mosaic in-memory buffers already at the configured sample rate
    ///
    /// Source chunk origins carry the position of their buffer in `sources`.
    pub fn compose(&self, reference: &[f32], sources: &[Vec<f32>]) -> Result<MosaicOutput> {
        let config = &self.config;
        let sample_rate = config.sample_rate;
        let mut rng = match config.chunking.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        self.enter(Stage::ChunkReference)?;
        let mut reference_chunks = chunk_audio(reference, sample_rate, 0, &config.chunking, &mut rng)?;
        self.emit(ProgressEvent::ChunksCreated {
            pool: PoolKind::Reference,
            file_index: 0,
            count: reference_chunks.len(),
        });
        if reference_chunks.is_empty() {
            log::warn!(
                "Reference ({} samples) is shorter than one {}s chunk",
                reference.len(),
                config.chunking.min_seconds
            );
            return Err(MosaicError::EmptyPool(PoolKind::Reference));
        }

        self.enter(Stage::ChunkSources)?;
        let mut pool = Vec::new();
        let mut unchunked_sources = Vec::new();
        for (file_index, samples) in sources.iter().enumerate() {
            let chunks = chunk_audio(samples, sample_rate, file_index, &config.chunking, &mut rng)?;
            self.emit(ProgressEvent::ChunksCreated {
                pool: PoolKind::Source,
                file_index,
                count: chunks.len(),
            });
            if chunks.is_empty() {
                log::warn!("Source {} yields no chunks, skipping", file_index);
                unchunked_sources.push(file_index);
            }
            pool.extend(chunks);
        }
        if pool.is_empty() {
            return Err(MosaicError::EmptyPool(PoolKind::Source));
        }
        log::info!(
            "Chunked reference into {} chunks and {} sources into {} chunks",
            reference_chunks.len(),
            sources.len(),
            pool.len()
        );

        self.enter(Stage::ExtractFeatures)?;
        let dropped = extract_all(&mut reference_chunks, self.extractor.as_ref())
            + extract_all(&mut pool, self.extractor.as_ref());
        if dropped > 0 {
            log::warn!("Dropped {} chunks that could not be fingerprinted", dropped);
        }

        self.enter(Stage::Normalize)?;
        normalize_corpus(&mut reference_chunks, &mut pool)?;

        self.enter(Stage::Match)?;
        let total = reference_chunks.len();
        let matcher = Matcher::new(&config.matching);
        let on_matched = |index: usize| self.emit(ProgressEvent::ReferenceMatched { index, total });
        let mut entries = matcher.match_all(&reference_chunks, &pool, &self.cancel, &on_matched)?;

        let segments = if config.synthesis.pitch_adjust {
            self.enter(Stage::PitchAdjust)?;
            self.adjust(&reference_chunks, &pool, &mut entries)
        } else {
            entries
                .iter()
                .map(|entry| Cow::Borrowed(pool[entry.source_index].samples.as_slice()))
                .collect()
        };

        self.enter(Stage::Concatenate)?;
        let samples = if config.synthesis.crossfade {
            crossfade_concat(&segments, config.crossfade_samples())
        } else {
            hard_concat(&segments)
        };

        let matches = entries
            .iter()
            .map(|entry| SplicedMatch {
                entry: *entry,
                source: pool[entry.source_index].origin,
            })
            .collect();

        Ok(MosaicOutput {
            samples,
            sample_rate,
            matches,
            reference_chunks: reference_chunks.len(),
            source_chunks: pool.len(),
            unchunked_sources,
        })
    }

    /// Pitch-shifted copies of every matched chunk, recording the shifts
    fn adjust<'a>(
        &self,
        reference: &[Chunk],
        pool: &'a [Chunk],
        entries: &mut [MatchEntry],
    ) -> Vec<Cow<'a, [f32]>> {
        let raw_pitch = |chunk: &Chunk| chunk.feature().map_or(0.0, |f| f.pitch);
        let mut shifted = 0;

        let segments = entries
            .iter_mut()
            .map(|entry| {
                let source = &pool[entry.source_index];
                let (samples, semitones) = adjust_pitch(
                    self.shifter.as_ref(),
                    &source.samples,
                    source.sample_rate,
                    raw_pitch(&reference[entry.reference_index]),
                    raw_pitch(source),
                );
                if semitones.is_some() {
                    shifted += 1;
                }
                entry.semitones = semitones;
                samples
            })
            .collect();

        log::info!("Pitch-adjusted {} of {} matched chunks", shifted, entries.len());
        segments
    }

    fn load(&self, path: &Path) -> std::result::Result<Vec<f32>, SkippedFile> {
        match decode_audio(path, self.config.sample_rate) {
            Ok(audio) => {
                log::info!("Loaded {} ({:.2}s)", path.display(), audio.duration_s());
                self.emit(ProgressEvent::FileLoaded {
                    path: path.to_path_buf(),
                    duration_s: audio.duration_s(),
                });
                Ok(audio.samples)
            }
            Err(e) => {
                let error = MosaicError::Load {
                    path: path.to_path_buf(),
                    source: e,
                };
                log::warn!("Skipping file: {}", error);
                let reason = format!("{:#}", error);
                self.emit(ProgressEvent::FileSkipped {
                    path: path.to_path_buf(),
                    reason: reason.clone(),
                });
                Err(SkippedFile {
                    path: path.to_path_buf(),
                    reason,
                })
            }
        }
    }

    fn enter(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            log::info!("Cancelled before stage: {}", stage);
            return Err(MosaicError::Cancelled);
        }
        log::debug!("Stage: {}", stage);
        self.emit(ProgressEvent::StageStarted(stage));
        Ok(())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(&event);
        }
    }
}
