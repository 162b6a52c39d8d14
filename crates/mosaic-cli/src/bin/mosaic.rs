//! mosaic - Audio mosaicing by concatenative synthesis
//!
//! Usage:
//!   mosaic -r <reference> -s <source>... -o <output.wav>
//!   mosaic --config mosaic.toml -r <reference> -s <source>... -o <output.wav>

use anyhow::{Context, Result};
use clap::Parser;
use mosaic_cli::output::{log_progress, print_json_report, summarize};
use mosaic_core::{DistanceMetric, MosaicConfig, MosaicInputs, MosaicPipeline};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mosaic")]
#[command(about = "Rebuild a reference recording from chunks of source recordings", long_about = None)]
struct Args {
    /// Reference audio file to reconstruct
    #[arg(short, long)]
    reference: PathBuf,

    /// Source audio files providing the chunk pool
    #[arg(short, long, num_args = 1.., required = true)]
    sources: Vec<PathBuf>,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    /// Path to configuration file (TOML); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum chunk duration in seconds
    #[arg(long)]
    chunk_size_min: Option<f64>,

    /// Maximum chunk duration in seconds
    #[arg(long)]
    chunk_size_max: Option<f64>,

    /// Disable crossfading between chunks
    #[arg(long)]
    no_crossfade: bool,

    /// Crossfade duration in seconds
    #[arg(long)]
    crossfade_duration: Option<f64>,

    /// MFCC distance metric: euclidean or cosine
    #[arg(long)]
    mfcc_distance_metric: Option<String>,

    #[arg(long)]
    weight_rms: Option<f32>,

    #[arg(long)]
    weight_pitch: Option<f32>,

    #[arg(long)]
    weight_mfcc: Option<f32>,

    #[arg(long)]
    weight_duration: Option<f32>,

    /// Ignore chunk duration when matching
    #[arg(long)]
    no_chunk_duration_match: bool,

    /// Shift matched chunks toward the reference pitch
    #[arg(long)]
    adjust_pitch: bool,

    /// Processing sample rate in Hz
    #[arg(long)]
    sr: Option<u32>,

    /// Seed for reproducible chunk boundaries
    #[arg(long)]
    seed: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default: warnings only, stdout carries the JSON report
    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = build_config(&args)?;
    let pipeline = MosaicPipeline::new(config)?.with_progress(Arc::new(log_progress));

    let inputs = MosaicInputs {
        reference: args.reference.clone(),
        sources: args.sources.clone(),
        output: args.output.clone(),
    };

    log::info!(
        "Mosaicing {} from {} source file(s) into {}",
        inputs.reference.display(),
        inputs.sources.len(),
        inputs.output.display()
    );

    let report = pipeline.run(&inputs)?;
    log::info!("{}", summarize(&report));
    print_json_report(&report);

    Ok(())
}

/// Config file (or defaults) with command-line overrides applied
fn build_config(args: &Args) -> Result<MosaicConfig> {
    let mut config = match &args.config {
        Some(path) => MosaicConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => MosaicConfig::default(),
    };

    if let Some(sr) = args.sr {
        config.sample_rate = sr;
    }
    if let Some(min) = args.chunk_size_min {
        config.chunking.min_seconds = min;
    }
    if let Some(max) = args.chunk_size_max {
        config.chunking.max_seconds = max;
    }
    if args.seed.is_some() {
        config.chunking.seed = args.seed;
    }

    if let Some(metric) = &args.mfcc_distance_metric {
        config.matching.metric = metric.parse::<DistanceMetric>()?;
    }
    let weights = &mut config.matching.weights;
    if let Some(w) = args.weight_rms {
        weights.rms = w;
    }
    if let Some(w) = args.weight_pitch {
        weights.pitch = w;
    }
    if let Some(w) = args.weight_mfcc {
        weights.mfcc = w;
    }
    if let Some(w) = args.weight_duration {
        weights.duration = w;
    }
    if args.no_chunk_duration_match {
        config.matching.duration_matching = false;
    }

    if args.no_crossfade {
        config.synthesis.crossfade = false;
    }
    if let Some(seconds) = args.crossfade_duration {
        config.synthesis.crossfade_seconds = seconds;
    }
    if args.adjust_pitch {
        config.synthesis.pitch_adjust = true;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["mosaic", "-r", "ref.wav", "-s", "a.wav", "b.mp3", "-o", "out.wav"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = parse(&[]);
        assert_eq!(args.sources.len(), 2);
        let config = build_config(&args).unwrap();
        let defaults = MosaicConfig::default();
        assert_eq!(config.sample_rate, defaults.sample_rate);
        assert_eq!(config.chunking.min_seconds, defaults.chunking.min_seconds);
        assert!(config.synthesis.crossfade);
        assert!(config.matching.duration_matching);
        assert!(!config.synthesis.pitch_adjust);
    }

    #[test]
    fn test_flags_override() {
        let args = parse(&[
            "--chunk-size-min",
            "0.2",
            "--chunk-size-max",
            "0.8",
            "--no-crossfade",
            "--mfcc-distance-metric",
            "cosine",
            "--weight-pitch",
            "4",
            "--no-chunk-duration-match",
            "--adjust-pitch",
            "--sr",
            "16000",
            "--seed",
            "9",
            "-vv",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.chunking.min_seconds, 0.2);
        assert_eq!(config.chunking.max_seconds, 0.8);
        assert_eq!(config.chunking.seed, Some(9));
        assert!(!config.synthesis.crossfade);
        assert_eq!(config.matching.metric, DistanceMetric::Cosine);
        assert_eq!(config.matching.weights.pitch, 4.0);
        assert!(!config.matching.duration_matching);
        assert!(config.synthesis.pitch_adjust);
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let args = parse(&["--mfcc-distance-metric", "manhattan"]);
        assert!(build_config(&args).is_err());
    }
}
