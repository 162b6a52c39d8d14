//! Fundamental frequency estimation
//!
//! Per-frame McLeod pitch method: the normalized square difference function
//! (NSDF) is built from an FFT autocorrelation, its key maxima are collected
//! and the first one close to the strongest is taken as the period.

use crate::config::AnalysisConfig;
use rustfft::{num_complex::Complex, FftPlanner};

/// Fraction of the strongest key maximum a candidate must reach
const PEAK_RATIO: f32 = 0.9;

/// Tracks the mean pitch of a chunk over its voiced frames
#[derive(Debug, Clone)]
pub struct PitchTracker {
    min_hz: f32,
    max_hz: f32,
    frame_length: usize,
    hop_length: usize,
    voicing_threshold: f32,
}

impl PitchTracker {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            min_hz: config.pitch_min_hz,
            max_hz: config.pitch_max_hz,
            frame_length: config.frame_length,
            hop_length: config.hop_length,
            voicing_threshold: config.voicing_threshold,
        }
    }

    /// Mean f0 in Hz over voiced frames, 0.0 when no frame is voiced
    pub fn mean_pitch(&self, samples: &[f32], sample_rate: u32) -> f32 {
        let mut planner = FftPlanner::new();

        let frames: Vec<&[f32]> = if samples.len() <= self.frame_length {
            vec![samples]
        } else {
            (0..=samples.len() - self.frame_length)
                .step_by(self.hop_length)
                .map(|start| &samples[start..start + self.frame_length])
                .collect()
        };

        let voiced: Vec<f32> = frames
            .iter()
            .filter_map(|frame| self.estimate_frame(frame, sample_rate, &mut planner))
            .collect();

        if voiced.is_empty() {
            return 0.0;
        }
        voiced.iter().sum::<f32>() / voiced.len() as f32
    }

    /// Estimate f0 of a single frame, `None` when unvoiced
    fn estimate_frame(
        &self,
        frame: &[f32],
        sample_rate: u32,
        planner: &mut FftPlanner<f32>,
    ) -> Option<f32> {
        let n = frame.len();
        let sr = sample_rate as f32;
        let min_lag = ((sr / self.max_hz).floor() as usize).max(1);
        let max_lag = ((sr / self.min_hz).ceil() as usize).min(n / 2);
        if max_lag <= min_lag + 2 {
            return None;
        }

        let energy: f32 = frame.iter().map(|x| x * x).sum();
        if energy < 1e-10 {
            return None;
        }

        let nsdf = compute_nsdf(frame, max_lag + 1, planner);
        let key_maxima = find_key_maxima(&nsdf);

        let candidates: Vec<(usize, f32)> = key_maxima
            .into_iter()
            .filter(|&(lag, _)| lag >= min_lag && lag <= max_lag)
            .collect();

        let strongest = candidates.iter().map(|&(_, v)| v).fold(0.0f32, f32::max);
        if strongest < self.voicing_threshold {
            return None;
        }

        let &(lag, _) = candidates
            .iter()
            .find(|&&(_, v)| v >= strongest * PEAK_RATIO)?;

        let period = lag as f32 + parabolic_offset(&nsdf, lag);
        let freq = sr / period;

        (freq >= self.min_hz && freq <= self.max_hz).then_some(freq)
    }
}

/// Normalized square difference function for lags `0..lags`
fn compute_nsdf(frame: &[f32], lags: usize, planner: &mut FftPlanner<f32>) -> Vec<f32> {
    let n = frame.len();
    let fft_len = (2 * n).next_power_of_two();

    let mut spectrum: Vec<Complex<f32>> = frame
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    planner.plan_fft_forward(fft_len).process(&mut spectrum);
    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(fft_len).process(&mut spectrum);

    let scale = 1.0 / fft_len as f32;
    let mut nsdf = Vec::with_capacity(lags);
    let mut m: f32 = 2.0 * frame.iter().map(|x| x * x).sum::<f32>();

    for lag in 0..lags.min(n) {
        let r = spectrum[lag].re * scale;
        nsdf.push(if m > 1e-12 { 2.0 * r / m } else { 0.0 });
        m -= frame[lag] * frame[lag] + frame[n - 1 - lag] * frame[n - 1 - lag];
    }

    nsdf
}

/// Highest point of each positive lobe after the zero-lag lobe
fn find_key_maxima(nsdf: &[f32]) -> Vec<(usize, f32)> {
    let mut maxima = Vec::new();
    let mut lag = 1;

    // Skip the lobe around lag 0
    while lag < nsdf.len() && nsdf[lag] > 0.0 {
        lag += 1;
    }

    let mut current: Option<(usize, f32)> = None;
    while lag < nsdf.len() {
        if nsdf[lag] > 0.0 {
            match current {
                Some((_, v)) if v >= nsdf[lag] => {}
                _ => current = Some((lag, nsdf[lag])),
            }
        } else if let Some(peak) = current.take() {
            maxima.push(peak);
        }
        lag += 1;
    }
    if let Some(peak) = current {
        maxima.push(peak);
    }

    maxima
}

/// Sub-sample offset of a peak from a parabola through its neighbours
fn parabolic_offset(values: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= values.len() {
        return 0.0;
    }
    let (a, b, c) = (values[index - 1], values[index], values[index + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f32::consts::PI;

    fn sine(freq: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| 0.8 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_detects_sine_pitch() {
        let tracker = PitchTracker::new(&AnalysisConfig::default());
        for freq in [110.0, 220.0, 440.0, 880.0] {
            let pitch = tracker.mean_pitch(&sine(freq, 8192, 22050), 22050);
            assert!(
                (pitch - freq).abs() / freq < 0.01,
                "expected {} Hz, got {}",
                freq,
                pitch
            );
        }
    }

    #[test]
    fn test_short_chunk_uses_single_frame() {
        let tracker = PitchTracker::new(&AnalysisConfig::default());
        let pitch = tracker.mean_pitch(&sine(440.0, 1500, 22050), 22050);
        assert!((pitch - 440.0).abs() < 5.0, "got {}", pitch);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let tracker = PitchTracker::new(&AnalysisConfig::default());
        assert_eq!(tracker.mean_pitch(&vec![0.0; 4096], 22050), 0.0);
    }

    #[test]
    fn test_white_noise_is_unvoiced() {
        let tracker = PitchTracker::new(&AnalysisConfig::default());
        let mut rng = StdRng::seed_from_u64(42);
        let noise: Vec<f32> = (0..8192).map(|_| rng.gen_range(-0.5..0.5)).collect();
        assert_eq!(tracker.mean_pitch(&noise, 22050), 0.0);
    }

    #[test]
    fn test_key_maxima_skip_zero_lag_lobe() {
        let nsdf = [1.0, 0.5, -0.2, 0.3, 0.9, 0.4, -0.1, 0.8, 0.2];
        assert_eq!(find_key_maxima(&nsdf), vec![(4, 0.9), (7, 0.8)]);
    }

    #[test]
    fn test_parabolic_offset_symmetric_peak() {
        assert_eq!(parabolic_offset(&[0.5, 1.0, 0.5], 1), 0.0);
        assert!(parabolic_offset(&[0.4, 1.0, 0.8], 1) > 0.0);
    }
}
