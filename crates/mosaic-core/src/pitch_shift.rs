//! Pitch correction of matched chunks
//!
//! A matched source chunk may be shifted toward the pitch of the reference
//! chunk it replaces. The shift always runs on a private copy of the samples:
//! the pooled chunk can be selected again with a different target.

use anyhow::Result;
use std::borrow::Cow;

/// Shifts below this many semitones are treated as no shift
const MIN_SHIFT_SEMITONES: f32 = 1e-3;

/// Buffers shorter than this are returned unshifted
const MIN_SHIFT_SAMPLES: usize = 8;

/// Pitch-shifting transform applied to a copy of a chunk's samples
pub trait PitchShifter: Send + Sync {
    fn shift(&self, samples: &[f32], sample_rate: u32, semitones: f32) -> Result<Vec<f32>>;
}

/// Semitone distance from `src_hz` to `ref_hz`, `None` when either is unvoiced
pub fn semitone_shift(ref_hz: f32, src_hz: f32) -> Option<f32> {
    if ref_hz > 0.0 && src_hz > 0.0 {
        Some(12.0 * (ref_hz / src_hz).log2())
    } else {
        None
    }
}

/// Samples to splice for one match, plus the shift that was applied
///
/// Borrows the pooled samples when no shift applies.
pub fn adjust_pitch<'a>(
    shifter: &dyn PitchShifter,
    samples: &'a [f32],
    sample_rate: u32,
    ref_hz: f32,
    src_hz: f32,
) -> (Cow<'a, [f32]>, Option<f32>) {
    let Some(semitones) = semitone_shift(ref_hz, src_hz) else {
        return (Cow::Borrowed(samples), None);
    };

    let copy = samples.to_vec();
    match shifter.shift(&copy, sample_rate, semitones) {
        Ok(shifted) => (Cow::Owned(shifted), Some(semitones)),
        Err(e) => {
            log::warn!("Pitch shift of {:.2} semitones failed, using unshifted chunk: {:#}", semitones, e);
            (Cow::Owned(copy), None)
        }
    }
}

/// Duration-preserving granular pitch shifter
///
/// The chunk is first time-stretched by the playback rate `2^(semitones/12)`
/// with waveform-similarity overlap-add (each Hann grain is placed where it
/// best continues the previous one), then read back at that rate so the
/// result has the original length and the shifted pitch.
#[derive(Debug, Clone)]
pub struct GranularPitchShifter {
    grain_size: usize,
}

impl GranularPitchShifter {
    pub fn new(grain_size: usize) -> Self {
        Self {
            grain_size: grain_size.max(4),
        }
    }
}

impl Default for GranularPitchShifter {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl PitchShifter for GranularPitchShifter {
    fn shift(&self, samples: &[f32], _sample_rate: u32, semitones: f32) -> Result<Vec<f32>> {
        if !semitones.is_finite() {
            anyhow::bail!("invalid pitch shift: {} semitones", semitones);
        }
        if semitones.abs() < MIN_SHIFT_SEMITONES || samples.len() < MIN_SHIFT_SAMPLES {
            return Ok(samples.to_vec());
        }

        let rate = 2f64.powf(semitones as f64 / 12.0);
        // Leave room to slide grains within the buffer
        let grain = (self.grain_size.min(samples.len() / 2) & !1).max(4);
        let stretched = wsola_stretch(samples, rate, grain);

        Ok((0..samples.len())
            .map(|i| read_linear(&stretched, i as f64 * rate))
            .collect())
    }
}

/// Time-stretch `samples` by `rate` with waveform-similarity overlap-add
///
/// Grains are always read from inside the buffer, so the output is covered
/// to its last sample.
fn wsola_stretch(samples: &[f32], rate: f64, grain: usize) -> Vec<f32> {
    let hop = grain / 2;
    let tolerance = hop / 2;
    let last_start = (samples.len() - grain) as isize;
    let target_len = ((samples.len() - 1) as f64 * rate).ceil() as usize + 2;
    let window = crate::features::create_hann_window(grain);

    let mut output = vec![0.0f32; target_len];
    let mut weight = vec![0.0f32; target_len];
    let mut previous: Option<isize> = None;

    // Start one hop early so the first samples get full window coverage
    let mut synthesis: isize = -(hop as isize);
    while synthesis < target_len as isize {
        let target = (synthesis as f64 / rate).round() as isize;
        let analysis = match previous {
            None => target.clamp(0, last_start),
            Some(prev) => best_alignment(samples, prev + hop as isize, target, tolerance, last_start, hop),
        };

        let frame = &samples[analysis as usize..analysis as usize + grain];
        for (j, (&w, &x)) in window.iter().zip(frame).enumerate() {
            let out = synthesis + j as isize;
            if out >= 0 && out < target_len as isize {
                output[out as usize] += w * x;
                weight[out as usize] += w;
            }
        }

        previous = Some(analysis);
        synthesis += hop as isize;
    }

    for (sample, &w) in output.iter_mut().zip(&weight) {
        if w > 1e-3 {
            *sample /= w;
        }
    }
    output
}

/// Grain start near `target` whose opening best matches the natural
/// continuation of the previous grain at `natural`
///
/// The search window keeps its full width when `target` is near either end.
fn best_alignment(
    samples: &[f32],
    natural: isize,
    target: isize,
    tolerance: usize,
    last_start: isize,
    span: usize,
) -> isize {
    let width = 2 * tolerance as isize;
    let lo = (target - tolerance as isize).clamp(0, (last_start - width).max(0));
    let hi = (lo + width).min(last_start);

    let continuation = &samples[natural as usize..natural as usize + span];
    let mut best = lo;
    let mut best_score = f32::NEG_INFINITY;

    for candidate in lo..=hi {
        let opening = &samples[candidate as usize..candidate as usize + span];
        let (dot, energy) = opening
            .iter()
            .zip(continuation)
            .fold((0.0f32, 0.0f32), |(dot, energy), (&a, &b)| (dot + a * b, energy + a * a));
        let score = if energy > 1e-12 { dot / energy.sqrt() } else { 0.0 };
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }

    best
}

/// Linear interpolation into `samples`, silent outside the buffer
fn read_linear(samples: &[f32], position: f64) -> f32 {
    if position < 0.0 {
        return 0.0;
    }
    let index = position.floor() as usize;
    if index >= samples.len() {
        return 0.0;
    }
    let frac = (position - index as f64) as f32;
    let next = samples.get(index + 1).copied().unwrap_or(samples[index]);
    samples[index] * (1.0 - frac) + next * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / 22050.0).sin())
            .collect()
    }

    struct FailingShifter;

    impl PitchShifter for FailingShifter {
        fn shift(&self, _: &[f32], _: u32, _: f32) -> Result<Vec<f32>> {
            anyhow::bail!("no DSP available")
        }
    }

    #[test]
    fn test_semitone_shift() {
        assert_abs_diff_eq!(semitone_shift(880.0, 440.0).unwrap(), 12.0, epsilon = 1e-4);
        assert_abs_diff_eq!(semitone_shift(220.0, 440.0).unwrap(), -12.0, epsilon = 1e-4);
        assert_eq!(semitone_shift(440.0, 440.0), Some(0.0));
        assert_eq!(semitone_shift(0.0, 440.0), None);
        assert_eq!(semitone_shift(440.0, 0.0), None);
    }

    #[test]
    fn test_unvoiced_side_is_identity() {
        let samples = sine(300.0, 2000);
        let shifter = GranularPitchShifter::default();

        let (out, shift) = adjust_pitch(&shifter, &samples, 22050, 0.0, 300.0);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(shift, None);
        assert_eq!(&*out, &samples[..]);

        let (out, shift) = adjust_pitch(&shifter, &samples, 22050, 440.0, 0.0);
        assert_eq!(shift, None);
        assert_eq!(&*out, &samples[..]);
    }

    #[test]
    fn test_shift_leaves_pool_samples_untouched() {
        let samples = sine(220.0, 4000);
        let before = samples.clone();
        let shifter = GranularPitchShifter::default();

        let (out, shift) = adjust_pitch(&shifter, &samples, 22050, 440.0, 220.0);

        assert_eq!(samples, before);
        assert!(matches!(out, Cow::Owned(_)));
        assert_abs_diff_eq!(shift.unwrap(), 12.0, epsilon = 1e-4);
        assert_eq!(out.len(), samples.len());
        assert_ne!(&*out, &samples[..]);
    }

    #[test]
    fn test_failed_shift_falls_back_to_copy() {
        let samples = sine(220.0, 1000);
        let (out, shift) = adjust_pitch(&FailingShifter, &samples, 22050, 440.0, 220.0);
        assert_eq!(shift, None);
        assert_eq!(&*out, &samples[..]);
    }

    #[test]
    fn test_zero_shift_is_identity() {
        let samples = sine(440.0, 3000);
        let out = GranularPitchShifter::default().shift(&samples, 22050, 0.0).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_shift_preserves_length_and_level() {
        let samples = sine(220.0, 8000);
        for semitones in [-7.0, 3.0, 12.0] {
            let out = GranularPitchShifter::default().shift(&samples, 22050, semitones).unwrap();
            assert_eq!(out.len(), samples.len());
            assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        }
    }

    #[test]
    fn test_octave_up_doubles_zero_crossings() {
        let samples = sine(220.0, 11025);
        let out = GranularPitchShifter::default().shift(&samples, 22050, 12.0).unwrap();

        let crossings = |x: &[f32]| x.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        let ratio = crossings(&out) as f32 / crossings(&samples) as f32;
        assert!(ratio > 1.8 && ratio < 2.2, "zero-crossing ratio {}", ratio);
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_shifted_tail_keeps_its_level() {
        let samples = sine(220.0, 4410);
        let input_rms = rms(&samples);

        for semitones in [12.0, 7.0, -5.0] {
            let out = GranularPitchShifter::default().shift(&samples, 22050, semitones).unwrap();
            let n = out.len();
            let head = rms(&out[..512]);
            let tail = rms(&out[n - 512..]);
            let last = rms(&out[n - 128..]);

            assert!((head / input_rms - 1.0).abs() < 0.2, "{} st: head rms {}", semitones, head);
            assert!((tail / input_rms - 1.0).abs() < 0.2, "{} st: tail rms {}", semitones, tail);
            assert!(last > 0.6 * input_rms, "{} st: last rms {}", semitones, last);
        }
    }

    #[test]
    fn test_short_buffer_is_returned_unshifted() {
        let samples = [0.1f32, -0.2, 0.3];
        let out = GranularPitchShifter::default().shift(&samples, 22050, 5.0).unwrap();
        assert_eq!(out, samples);
    }
}
