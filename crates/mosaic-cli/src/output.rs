//! Terminal output: JSON run summary on stdout, progress through the logger

use mosaic_core::{MosaicReport, ProgressEvent};

/// Print the run report as pretty JSON
pub fn print_json_report(report: &MosaicReport) {
    match report.to_json_pretty() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}

/// Log a progress event; reference matches are reported about every tenth
pub fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::StageStarted(stage) => log::info!("== {}", stage),
        ProgressEvent::FileLoaded { path, duration_s } => {
            log::info!("Loaded {} ({:.2}s)", path.display(), duration_s)
        }
        ProgressEvent::FileSkipped { path, reason } => {
            log::warn!("Skipped {}: {}", path.display(), reason)
        }
        ProgressEvent::ChunksCreated {
            pool,
            file_index,
            count,
        } => log::debug!("{} file {}: {} chunks", pool, file_index, count),
        ProgressEvent::ReferenceMatched { index, total } => {
            let step = (*total / 10).max(1);
            if index % step == 0 || index == total {
                log::info!("Matched {}/{} reference chunks", index, total);
            }
        }
        ProgressEvent::Finished { output_samples } => {
            log::info!("Finished: {} output samples", output_samples)
        }
    }
}

/// One-line human summary for the log
pub fn summarize(report: &MosaicReport) -> String {
    format!(
        "{} reference chunks rebuilt from {} distinct source chunks ({} in pool, {} skipped files), {:.2}s of audio in {:.2}s",
        report.reference_chunks,
        report.distinct_sources_used(),
        report.source_chunks,
        report.skipped.len(),
        report.output_duration_s,
        report.elapsed_s
    )
}
