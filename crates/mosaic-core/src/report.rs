//! Run summary

use serde::Serialize;
use std::path::PathBuf;

/// Where one reference chunk's replacement came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub reference_index: usize,
    /// Source file the winning chunk was cut from
    pub source_file: PathBuf,
    /// First sample of the winning chunk within that file
    pub source_offset: usize,
    pub distance: f32,
    /// Pitch shift applied to the spliced copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semitones: Option<f32>,
}

/// Input file that was left out of the corpus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct MosaicReport {
    pub reference: PathBuf,
    pub sources: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    pub output: PathBuf,
    pub sample_rate: u32,
    pub reference_chunks: usize,
    pub source_chunks: usize,
    pub output_duration_s: f64,
    pub elapsed_s: f64,
    pub matches: Vec<MatchRecord>,
}

impl MosaicReport {
    /// Number of distinct source chunks that were used at least once
    pub fn distinct_sources_used(&self) -> usize {
        let mut used: Vec<(&PathBuf, usize)> = self
            .matches
            .iter()
            .map(|m| (&m.source_file, m.source_offset))
            .collect();
        used.sort_unstable();
        used.dedup();
        used.len()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
