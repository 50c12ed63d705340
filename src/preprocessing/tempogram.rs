//! Tempogram computation
//!
//! A tempo-vs-time magnitude matrix derived from the novelty curve: an 8 s
//! window slides at a 1 s hop, each window is Fourier-transformed, and the
//! magnitude spectrum is resampled onto a fixed BPM axis by linear
//! interpolation. Each time slice is normalized by its own maximum, and a
//! dominant-tempo/strength trace (predominant local pulse) is recorded per
//! slice.
//!
//! # Reference
//!
//! Grosche, P., & Müller, M. (2011). Extracting Predominant Local Pulse
//! Information from Music Recordings. *IEEE Transactions on Audio, Speech,
//! and Language Processing*, 19(6), 1688-1701.

use serde::{Deserialize, Serialize};

use crate::signal::fft::magnitude_spectrum;
use crate::signal::window::{apply_window, hann_window};

/// Tempo-vs-time periodicity representation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tempogram {
    /// `n_slices × n_tempo_bins` magnitudes, each slice max-normalized
    pub matrix: Vec<Vec<f32>>,
    /// BPM value of each tempo bin
    pub bpm_axis: Vec<f32>,
    /// Dominant BPM per time slice
    pub dominant_bpm: Vec<f32>,
    /// Contrast-based dominance strength per slice, in [0, 1]
    pub dominant_strength: Vec<f32>,
    /// Time of each slice center in seconds
    pub slice_times: Vec<f32>,
}

impl Tempogram {
    /// True when no slice could be computed
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Median dominant BPM across slices, None when empty
    pub fn global_dominant_bpm(&self) -> Option<f32> {
        if self.dominant_bpm.is_empty() {
            return None;
        }
        Some(crate::signal::stats::median(&self.dominant_bpm))
    }
}

/// Compute a tempogram from a novelty curve
///
/// # Arguments
///
/// * `novelty` - Novelty curve values
/// * `feature_rate` - Novelty frames per second
/// * `window_secs` - Analysis window (default: 8.0)
/// * `hop_secs` - Window hop (default: 1.0)
/// * `min_bpm` / `max_bpm` - BPM axis bounds (default: 50 / 250)
/// * `n_bins` - BPM axis resolution (default: 120)
///
/// # Returns
///
/// A `Tempogram`; empty when the novelty curve is shorter than one window.
/// A curve between one hop and one window long is analyzed as a single
/// truncated slice so short buffers still yield a trace.
pub fn compute_tempogram(
    novelty: &[f32],
    feature_rate: f32,
    window_secs: f32,
    hop_secs: f32,
    min_bpm: f32,
    max_bpm: f32,
    n_bins: usize,
) -> Tempogram {
    if novelty.is_empty() || feature_rate <= 0.0 || n_bins < 2 || min_bpm >= max_bpm {
        return Tempogram::default();
    }

    let window_len = ((feature_rate * window_secs).round() as usize).max(2);
    let hop_len = ((feature_rate * hop_secs).round() as usize).max(1);

    // Short curves: analyze what we have as one slice
    let effective_window = window_len.min(novelty.len());
    if effective_window < hop_len.min(window_len) || novelty.len() < hop_len {
        return Tempogram::default();
    }

    let bpm_axis: Vec<f32> = (0..n_bins)
        .map(|i| min_bpm + (max_bpm - min_bpm) * i as f32 / (n_bins - 1) as f32)
        .collect();

    let fft_size = (effective_window * 4).next_power_of_two();
    let window_fn = hann_window(effective_window);

    let mut matrix = Vec::new();
    let mut dominant_bpm = Vec::new();
    let mut dominant_strength = Vec::new();
    let mut slice_times = Vec::new();

    let mut start = 0usize;
    while start + effective_window <= novelty.len() {
        let mut frame = novelty[start..start + effective_window].to_vec();
        apply_window(&mut frame, &window_fn);

        let spectrum = magnitude_spectrum(&frame, fft_size);
        if spectrum.is_empty() {
            break;
        }

        // Resample onto the BPM axis: bin frequency = k * rate / fft_size,
        // tempo frequency = bpm / 60.
        let mut slice: Vec<f32> = bpm_axis
            .iter()
            .map(|&bpm| {
                let freq = bpm / 60.0;
                let pos = freq * fft_size as f32 / feature_rate;
                let lower = pos.floor() as usize;
                let frac = pos - pos.floor();
                if lower + 1 < spectrum.len() {
                    spectrum[lower] * (1.0 - frac) + spectrum[lower + 1] * frac
                } else {
                    0.0
                }
            })
            .collect();

        let max_val = slice.iter().copied().fold(0.0f32, f32::max);
        if max_val > 1e-10 {
            for v in &mut slice {
                *v /= max_val;
            }
        }

        let (bpm, strength) = slice_dominant(&slice, &bpm_axis);
        dominant_bpm.push(bpm);
        dominant_strength.push(strength);
        slice_times.push((start as f32 + effective_window as f32 / 2.0) / feature_rate);
        matrix.push(slice);

        start += hop_len;
    }

    log::debug!(
        "Tempogram: {} slices x {} tempo bins, window={} frames",
        matrix.len(),
        n_bins,
        effective_window
    );

    Tempogram {
        matrix,
        bpm_axis,
        dominant_bpm,
        dominant_strength,
        slice_times,
    }
}

/// Dominant BPM of one slice plus a contrast strength (top peak vs runner-up)
fn slice_dominant(slice: &[f32], bpm_axis: &[f32]) -> (f32, f32) {
    let mut best_idx = 0usize;
    let mut best_val = 0.0f32;
    for (i, &v) in slice.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    if best_val <= 1e-10 {
        return (bpm_axis.first().copied().unwrap_or(0.0), 0.0);
    }

    // Runner-up: strongest local maximum away from the winner's neighborhood
    let exclusion = 3usize;
    let mut runner_up = 0.0f32;
    for i in 1..slice.len().saturating_sub(1) {
        if i.abs_diff(best_idx) <= exclusion {
            continue;
        }
        if slice[i] >= slice[i - 1] && slice[i] >= slice[i + 1] && slice[i] > runner_up {
            runner_up = slice[i];
        }
    }

    let strength = ((best_val - runner_up) / best_val).clamp(0.0, 1.0);
    (bpm_axis[best_idx], strength)
}
