//! Mel filterbank and mel spectrogram
//!
//! Triangular mel filters applied to STFT magnitudes. The 40-band spectrogram
//! is diagnostic; a coarser 6-band variant feeds the novelty curve where broad
//! band grouping suppresses pitch-change false positives.

use crate::signal::fft::stft_magnitudes;

/// Mel spectrogram: per-frame band energies plus per-band means
#[derive(Debug, Clone, Default)]
pub struct MelSpectrogram {
    /// `n_frames × n_bands` band energies
    pub frames: Vec<Vec<f32>>,
    /// Mean energy per band across all frames
    pub band_means: Vec<f32>,
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Build a triangular mel filterbank
///
/// # Arguments
///
/// * `n_bands` - Number of mel bands
/// * `n_bins` - Number of FFT bins (frame_size / 2 + 1)
/// * `sample_rate` - Sample rate in Hz
/// * `fmin_hz` - Lowest band edge in Hz
/// * `fmax_hz` - Highest band edge in Hz (clamped to Nyquist)
///
/// # Returns
///
/// `n_bands` filters, each `n_bins` weights.
pub fn mel_filterbank(
    n_bands: usize,
    n_bins: usize,
    sample_rate: u32,
    fmin_hz: f32,
    fmax_hz: f32,
) -> Vec<Vec<f32>> {
    if n_bands == 0 || n_bins < 2 || sample_rate == 0 {
        return Vec::new();
    }

    let nyquist = sample_rate as f32 / 2.0;
    let fmax = fmax_hz.min(nyquist).max(fmin_hz + 1.0);
    let mel_min = hz_to_mel(fmin_hz.max(0.0));
    let mel_max = hz_to_mel(fmax);

    // n_bands + 2 evenly spaced mel points define the triangle edges
    let mel_points: Vec<f32> = (0..n_bands + 2)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_bands + 1) as f32)
        .collect();
    let bin_freqs: Vec<f32> = (0..n_bins)
        .map(|b| b as f32 * nyquist / (n_bins - 1) as f32)
        .collect();

    let mut filters = Vec::with_capacity(n_bands);
    for band in 0..n_bands {
        let left = mel_to_hz(mel_points[band]);
        let center = mel_to_hz(mel_points[band + 1]);
        let right = mel_to_hz(mel_points[band + 2]);

        let mut weights = vec![0.0f32; n_bins];
        for (b, &freq) in bin_freqs.iter().enumerate() {
            if freq > left && freq < center {
                weights[b] = (freq - left) / (center - left).max(1e-6);
            } else if freq >= center && freq < right {
                weights[b] = (right - freq) / (right - center).max(1e-6);
            }
        }
        filters.push(weights);
    }

    filters
}

/// Apply a filterbank to one magnitude frame
pub fn apply_filterbank(frame: &[f32], filterbank: &[Vec<f32>]) -> Vec<f32> {
    filterbank
        .iter()
        .map(|filter| {
            frame
                .iter()
                .zip(filter.iter())
                .map(|(&m, &w)| m * w)
                .sum::<f32>()
        })
        .collect()
}

/// Compute a mel spectrogram from raw samples
///
/// Empty or too-short input yields an empty spectrogram.
///
/// # Arguments
///
/// * `samples` - Mono samples
/// * `sample_rate` - Sample rate in Hz
/// * `n_bands` - Mel band count (default: 40)
/// * `fmin_hz` / `fmax_hz` - Band range (default: 20 Hz to min(5 kHz, Nyquist))
/// * `frame_size` / `hop_size` - STFT parameters (default: 1024 / 512)
pub fn mel_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    n_bands: usize,
    fmin_hz: f32,
    fmax_hz: f32,
    frame_size: usize,
    hop_size: usize,
) -> MelSpectrogram {
    let stft = stft_magnitudes(samples, frame_size, hop_size);
    if stft.is_empty() {
        return MelSpectrogram::default();
    }

    let n_bins = stft[0].len();
    let filterbank = mel_filterbank(n_bands, n_bins, sample_rate, fmin_hz, fmax_hz);
    if filterbank.is_empty() {
        return MelSpectrogram::default();
    }

    let frames: Vec<Vec<f32>> = stft
        .iter()
        .map(|frame| apply_filterbank(frame, &filterbank))
        .collect();

    let mut band_means = vec![0.0f32; n_bands];
    for frame in &frames {
        for (mean, &v) in band_means.iter_mut().zip(frame.iter()) {
            *mean += v;
        }
    }
    let n = frames.len() as f32;
    for mean in &mut band_means {
        *mean /= n;
    }

    log::debug!(
        "Mel spectrogram: {} frames x {} bands",
        frames.len(),
        n_bands
    );

    MelSpectrogram { frames, band_means }
}
