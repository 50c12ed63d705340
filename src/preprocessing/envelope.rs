//! Onset envelope extraction
//!
//! Frames the filtered signal into short windows, takes RMS per frame, and
//! applies exponential smoothing. With 30 ms frames at a 10 ms hop the
//! envelope has an effective rate of ~100 Hz, which is what the interval and
//! beat-tracking detectors key off.

use crate::signal::stats::rms;
use crate::signal::window::{frame_count, frames};

/// Onset envelope with its effective feature rate
#[derive(Debug, Clone, Default)]
pub struct OnsetEnvelope {
    /// Smoothed per-frame RMS values
    pub values: Vec<f32>,
    /// Envelope frames per second (samples / hop)
    pub feature_rate: f32,
}

/// Compute an RMS onset envelope
///
/// # Arguments
///
/// * `samples` - Filtered mono samples
/// * `sample_rate` - Sample rate in Hz
/// * `frame_ms` - Frame length in milliseconds (default: 30.0)
/// * `hop_ms` - Hop in milliseconds (default: 10.0)
/// * `smoothing` - Exponential smoothing factor, `y[i] = a*x[i] + (1-a)*y[i-1]`
///   (default: 0.3)
///
/// # Returns
///
/// An `OnsetEnvelope`; empty when the signal is shorter than one frame.
pub fn onset_envelope(
    samples: &[f32],
    sample_rate: u32,
    frame_ms: f32,
    hop_ms: f32,
    smoothing: f32,
) -> OnsetEnvelope {
    if samples.is_empty() || sample_rate == 0 || frame_ms <= 0.0 || hop_ms <= 0.0 {
        return OnsetEnvelope::default();
    }

    let frame_size = ((sample_rate as f32 * frame_ms / 1000.0).round() as usize).max(1);
    let hop_size = ((sample_rate as f32 * hop_ms / 1000.0).round() as usize).max(1);

    if samples.len() < frame_size {
        return OnsetEnvelope::default();
    }

    let mut values = Vec::with_capacity(frame_count(samples.len(), frame_size, hop_size));

    let alpha = smoothing.clamp(0.0, 1.0);
    let mut prev = 0.0f32;
    for (i, frame) in frames(samples, frame_size, hop_size).enumerate() {
        let raw = rms(frame);
        let smoothed = if i == 0 {
            raw
        } else {
            alpha * raw + (1.0 - alpha) * prev
        };
        values.push(smoothed);
        prev = smoothed;
    }

    let feature_rate = sample_rate as f32 / hop_size as f32;

    log::debug!(
        "Onset envelope: {} frames at {:.1} Hz (frame={}, hop={})",
        values.len(),
        feature_rate,
        frame_size,
        hop_size
    );

    OnsetEnvelope {
        values,
        feature_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_rate() {
        let samples = vec![0.1f32; 44100];
        let env = onset_envelope(&samples, 44100, 30.0, 10.0, 0.3);
        assert!((env.feature_rate - 100.0).abs() < 1.0);
        // ~1 second of envelope at ~100 Hz
        assert!(env.values.len() > 90 && env.values.len() < 101);
    }

    #[test]
    fn test_envelope_tracks_bursts() {
        // Silence with a loud burst in the middle
        let mut samples = vec![0.0f32; 44100];
        for x in samples.iter_mut().skip(22050).take(2205) {
            *x = 0.8;
        }
        let env = onset_envelope(&samples, 44100, 30.0, 10.0, 0.3);
        let peak_idx = env
            .values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // Burst starts at 0.5 s => envelope frame ~50
        assert!(peak_idx >= 48 && peak_idx <= 58, "peak at {}", peak_idx);
    }

    #[test]
    fn test_envelope_short_input() {
        let env = onset_envelope(&[0.1; 10], 44100, 30.0, 10.0, 0.3);
        assert!(env.values.is_empty());
    }

    #[test]
    fn test_envelope_empty_input() {
        let env = onset_envelope(&[], 44100, 30.0, 10.0, 0.3);
        assert!(env.values.is_empty());
        assert_eq!(env.feature_rate, 0.0);
    }
}
