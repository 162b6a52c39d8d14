//! Output encoding

use anyhow::{Context, Result};
use std::path::Path;

/// Write a mono waveform as a 32-bit float WAV file
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        writer.write_sample(sample)?;
    }

    writer
        .finalize()
        .with_context(|| format!("Failed to finalize WAV file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode_audio;

    #[test]
    fn test_write_then_decode() {
        let path = std::env::temp_dir().join(format!("mosaic-writer-{}.wav", std::process::id()));
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0) - 0.5).collect();

        write_wav(&path, &samples, 16000).unwrap();
        let decoded = decode_audio(&path, 16000).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn test_unwritable_path_fails() {
        let path = Path::new("/nonexistent-dir/for/sure/out.wav");
        assert!(write_wav(path, &[0.0; 10], 16000).is_err());
    }
}
