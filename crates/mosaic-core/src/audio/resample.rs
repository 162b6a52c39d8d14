//! Audio resampling with rubato's windowed-sinc resampler

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Resample a mono buffer from `from_rate` to `to_rate`
pub fn resample_to_target(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        anyhow::bail!("Cannot resample from {} Hz to {} Hz", from_rate, to_rate);
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        },
        samples.len(),
        1,
    )
    .map_err(|e| anyhow::anyhow!(e))
    .context("Failed to initialise resampler")?;

    let waves_in = vec![samples.to_vec()];
    let mut output = resampler
        .process(&waves_in, None)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Resampling failed")?
        .pop()
        .unwrap_or_default();

    // The sinc filter delays its output; flush with silence until the
    // delayed tail is out, then drop the leading delay
    let delay = resampler.output_delay();
    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    while output.len() < delay + expected_len {
        let flushed = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Resampler flush failed")?
            .pop()
            .unwrap_or_default();
        if flushed.is_empty() {
            break;
        }
        output.extend(flushed);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected_len, 0.0);
    Ok(output)
}
