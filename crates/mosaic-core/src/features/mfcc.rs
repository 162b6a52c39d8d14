//! Mel-frequency cepstral coefficients
//!
//! Centered Hann frames, power spectrum, HTK mel filterbank, dB compression
//! and an orthonormal DCT-II. The chunk descriptor is the mean over frames.

use super::{create_hann_window, MFCC_COEFFICIENTS};
use crate::config::AnalysisConfig;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Floor applied to mel energies before the log
const POWER_FLOOR: f32 = 1e-10;

/// Computes the mean MFCC vector of a chunk
#[derive(Debug, Clone)]
pub struct MfccAnalyzer {
    fft_size: usize,
    hop_length: usize,
    mel_bands: usize,
}

impl MfccAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            fft_size: config.frame_length,
            hop_length: config.hop_length,
            mel_bands: config.mel_bands,
        }
    }

    pub fn mean_mfcc(&self, samples: &[f32], sample_rate: u32) -> [f32; MFCC_COEFFICIENTS] {
        let mut mean = [0.0f32; MFCC_COEFFICIENTS];
        if samples.is_empty() {
            return mean;
        }

        let fft_size = self.fft_size;
        let pad = fft_size / 2;
        let mut padded = vec![0.0f32; samples.len() + fft_size];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let num_frames = 1 + samples.len() / self.hop_length;
        let window = create_hann_window(fft_size);
        let filterbank = mel_filterbank(self.mel_bands, fft_size, sample_rate);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let mut frame = vec![Complex::new(0.0f32, 0.0); fft_size];
        let mut log_mel = vec![0.0f32; self.mel_bands];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_length;
            for (i, bin) in frame.iter_mut().enumerate() {
                *bin = Complex::new(padded[start + i] * window[i], 0.0);
            }
            fft.process(&mut frame);

            let power: Vec<f32> = frame[..fft_size / 2 + 1]
                .iter()
                .map(|c| c.norm_sqr())
                .collect();

            for (band, weights) in filterbank.iter().enumerate() {
                let energy: f32 = weights.iter().zip(&power).map(|(w, p)| w * p).sum();
                log_mel[band] = 10.0 * energy.max(POWER_FLOOR).log10();
            }

            let coefficients = dct_ii(&log_mel);
            for (acc, c) in mean.iter_mut().zip(coefficients) {
                *acc += c;
            }
        }

        for c in mean.iter_mut() {
            *c /= num_frames as f32;
        }
        mean
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters spanning 0 Hz to Nyquist, one row per band
fn mel_filterbank(bands: usize, fft_size: usize, sample_rate: u32) -> Vec<Vec<f32>> {
    let num_bins = fft_size / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let mel_max = hz_to_mel(nyquist);

    let edges: Vec<f32> = (0..bands + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (bands + 1) as f32))
        .collect();
    let bin_freq = |k: usize| k as f32 * sample_rate as f32 / fft_size as f32;

    (0..bands)
        .map(|b| {
            let (lower, center, upper) = (edges[b], edges[b + 1], edges[b + 2]);
            (0..num_bins)
                .map(|k| {
                    let f = bin_freq(k);
                    let rising = (f - lower) / (center - lower);
                    let falling = (upper - f) / (upper - center);
                    rising.min(falling).max(0.0)
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II, first `MFCC_COEFFICIENTS` outputs
fn dct_ii(input: &[f32]) -> [f32; MFCC_COEFFICIENTS] {
    let m = input.len() as f32;
    let mut out = [0.0f32; MFCC_COEFFICIENTS];
    for (k, value) in out.iter_mut().enumerate() {
        let sum: f32 = input
            .iter()
            .enumerate()
            .map(|(n, &x)| x * (PI * k as f32 * (2 * n + 1) as f32 / (2.0 * m)).cos())
            .sum();
        let scale = if k == 0 { (1.0 / m).sqrt() } else { (2.0 / m).sqrt() };
        *value = scale * sum;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / 22050.0).sin())
            .collect()
    }

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0, 440.0, 1000.0, 8000.0] {
            assert_abs_diff_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 0.05);
        }
    }

    #[test]
    fn test_filterbank_shape() {
        let bank = mel_filterbank(40, 2048, 22050);
        assert_eq!(bank.len(), 40);
        assert!(bank.iter().all(|row| row.len() == 1025));
        assert!(bank.iter().all(|row| row.iter().all(|&w| (0.0..=1.0).contains(&w))));
        assert!(bank.iter().all(|row| row.iter().any(|&w| w > 0.0)));
    }

    #[test]
    fn test_dct_of_constant_has_only_dc() {
        let out = dct_ii(&[2.0; 40]);
        assert_abs_diff_eq!(out[0], 2.0 * 40f32.sqrt(), epsilon = 1e-3);
        for c in &out[1..] {
            assert_abs_diff_eq!(*c, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_mfcc_deterministic_and_level_sensitive() {
        let analyzer = MfccAnalyzer::new(&AnalysisConfig::default());
        let quiet = analyzer.mean_mfcc(&sine(440.0, 0.1, 4096), 22050);
        let quiet_again = analyzer.mean_mfcc(&sine(440.0, 0.1, 4096), 22050);
        let loud = analyzer.mean_mfcc(&sine(440.0, 0.9, 4096), 22050);

        assert_eq!(quiet, quiet_again);
        assert!(loud[0] > quiet[0]);
        assert!(quiet.iter().chain(loud.iter()).all(|c| c.is_finite()));
    }

    #[test]
    fn test_mfcc_of_silence_is_floor() {
        let analyzer = MfccAnalyzer::new(&AnalysisConfig::default());
        let silent = analyzer.mean_mfcc(&[0.0; 1024], 22050);
        // log10(1e-10) * 10 = -100 dB in every band
        assert_abs_diff_eq!(silent[0], -100.0 * 40f32.sqrt(), epsilon = 1e-2);
    }
}
