//! Resynthesis of the matched chunk sequence

/// Join segments back to back
pub fn hard_concat<S: AsRef<[f32]>>(segments: &[S]) -> Vec<f32> {
    let total: usize = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut output = Vec::with_capacity(total);
    for segment in segments {
        output.extend_from_slice(segment.as_ref());
    }
    output
}

/// Join segments with a linear crossfade of up to `fade_samples` at each seam
///
/// Each seam overlaps `min(fade_samples, output so far, next segment)`
/// samples, so two segments of lengths A and B with a fade F <= min(A, B)
/// produce A + B - F samples.
pub fn crossfade_concat<S: AsRef<[f32]>>(segments: &[S], fade_samples: usize) -> Vec<f32> {
    let mut iter = segments.iter().map(AsRef::<[f32]>::as_ref);
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let total: usize = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut output = Vec::with_capacity(total);
    output.extend_from_slice(first);

    for next in iter {
        let overlap = fade_samples.min(output.len()).min(next.len());
        if overlap == 0 {
            output.extend_from_slice(next);
            continue;
        }

        let tail_start = output.len() - overlap;
        for (i, (out, &incoming)) in output[tail_start..].iter_mut().zip(next).enumerate() {
            let fade_in = ramp(i, overlap);
            *out = *out * (1.0 - fade_in) + incoming * fade_in;
        }
        output.extend_from_slice(&next[overlap..]);
    }

    output
}

/// Point `i` of an `n`-point linear ramp from 0 to 1, endpoints included
fn ramp(i: usize, n: usize) -> f32 {
    if n < 2 {
        0.0
    } else {
        i as f32 / (n - 1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_hard_concat_preserves_order() {
        let out = hard_concat(&[vec![1.0f32, 2.0], vec![3.0], vec![4.0, 5.0]]);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(hard_concat::<Vec<f32>>(&[]).is_empty());
    }

    #[test]
    fn test_crossfade_length() {
        let a = vec![1.0f32; 300];
        let b = vec![1.0f32; 200];
        for fade in [0, 1, 50, 200] {
            let out = crossfade_concat(&[&a[..], &b[..]], fade);
            assert_eq!(out.len(), 300 + 200 - fade);
        }
    }

    #[test]
    fn test_fade_longer_than_segment_is_clamped() {
        let a = vec![1.0f32; 30];
        let b = vec![1.0; 10];
        let out = crossfade_concat(&[a, b], 100);
        assert_eq!(out.len(), 30);
    }

    #[test]
    fn test_crossfade_ramps() {
        let a = vec![1.0f32; 10];
        let b = vec![0.0; 10];
        let out = crossfade_concat(&[a, b], 5);

        assert_eq!(out.len(), 15);
        assert_eq!(&out[..5], &[1.0; 5]);
        // Fade-out of the tail runs 1, 0.75, 0.5, 0.25, 0
        for (i, expected) in [1.0, 0.75, 0.5, 0.25, 0.0].iter().enumerate() {
            assert_abs_diff_eq!(out[5 + i], *expected, epsilon = 1e-6);
        }
        assert_eq!(&out[10..], &[0.0; 5]);
    }

    #[test]
    fn test_constant_signal_stays_constant() {
        let out = crossfade_concat(&[vec![0.5f32; 64], vec![0.5; 64], vec![0.5; 64]], 16);
        assert_eq!(out.len(), 64 * 3 - 32);
        for s in out {
            assert_abs_diff_eq!(s, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_single_and_empty_input() {
        assert_eq!(crossfade_concat(&[vec![0.1f32, 0.2, 0.3]], 2), vec![0.1, 0.2, 0.3]);
        assert!(crossfade_concat::<Vec<f32>>(&[], 10).is_empty());
    }

    #[test]
    fn test_one_sample_overlap_keeps_outgoing_sample() {
        let out = crossfade_concat(&[vec![1.0f32, 1.0], vec![0.25, 0.5]], 1);
        assert_eq!(out, vec![1.0, 1.0, 0.5]);
    }
}
