//! Audio decoding, resampling and encoding
//!
//! These adapters sit outside the mosaicing core: they turn files into mono
//! `f32` buffers at the processing rate, and write the final waveform back out.

mod decoder;
mod probe;
mod resample;
mod writer;

pub use decoder::{decode_audio, AudioData};
pub use probe::decode_with_symphonia;
pub use resample::resample_to_target;
pub use writer::write_wav;

use std::path::Path;

/// Audio formats with a dedicated decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    /// Anything else is handed to Symphonia's probe
    Other,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") | Some("oga") => AudioFormat::Ogg,
            _ => AudioFormat::Other,
        }
    }
}
