//! Level normalization and noise-floor estimation
//!
//! The pipeline normalizes to a fixed RMS target so detector thresholds behave
//! consistently across quiet and loud recordings. The noise-floor estimate is
//! diagnostic metadata only; it never gates the analysis.

use crate::signal::stats::{rms, EPSILON};

/// Normalize samples in place to a target RMS level in dBFS
///
/// Scales by `target_linear / rms` and clips to [-1, 1]. Signals whose RMS is
/// below epsilon (silence) pass through unchanged.
///
/// # Arguments
///
/// * `samples` - Mono samples in [-1, 1], mutated in place
/// * `target_dbfs` - Target RMS level (default: -18.0)
///
/// # Returns
///
/// The linear gain that was applied (1.0 for silence).
pub fn rms_normalize(samples: &mut [f32], target_dbfs: f32) -> f32 {
    let current = rms(samples);
    if current <= EPSILON {
        return 1.0;
    }

    let target_linear = 10.0f32.powf(target_dbfs / 20.0);
    let gain = target_linear / current;

    for x in samples.iter_mut() {
        *x = (*x * gain).clamp(-1.0, 1.0);
    }

    log::debug!(
        "RMS normalization: rms={:.5} -> target {:.1} dBFS, gain={:.3}",
        current,
        target_dbfs,
        gain
    );

    gain
}

/// Estimate the noise floor as the RMS over the quietest decile of sub-frames
///
/// Splits the signal into fixed-size sub-frames at 50% overlap, ranks them by
/// RMS, and averages the quietest 10%. Returns 0.0 when the signal is shorter
/// than one sub-frame.
///
/// # Arguments
///
/// * `samples` - Mono samples
/// * `frame_size` - Sub-frame length in samples (default: 2048)
pub fn estimate_noise_floor(samples: &[f32], frame_size: usize) -> f32 {
    if frame_size == 0 || samples.len() < frame_size {
        return 0.0;
    }

    let hop = (frame_size / 2).max(1);
    let mut frame_levels: Vec<f32> = Vec::new();
    let mut start = 0;
    while start + frame_size <= samples.len() {
        frame_levels.push(rms(&samples[start..start + frame_size]));
        start += hop;
    }

    if frame_levels.is_empty() {
        return 0.0;
    }

    frame_levels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let decile = (frame_levels.len() / 10).max(1);
    let quietest = &frame_levels[..decile];
    let floor = quietest.iter().sum::<f32>() / quietest.len() as f32;

    log::debug!(
        "Noise floor estimate: {:.6} over {} of {} sub-frames",
        floor,
        decile,
        frame_levels.len()
    );

    floor
}
