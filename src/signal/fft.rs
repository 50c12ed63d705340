//! FFT-based transforms
//!
//! Thin wrappers around `rustfft` for the spectral operations the pipeline
//! needs: magnitude spectra, the STFT, and FFT-accelerated autocorrelation
//! (`ACF = IFFT(|FFT(x)|²)`).

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::signal::window::{apply_window, frame_count, frames, hann_window};

/// Compute the magnitude spectrum of a real signal
///
/// The input is zero-padded to `fft_size` when shorter. Only the first
/// `fft_size / 2 + 1` bins (DC through Nyquist) are returned.
///
/// # Arguments
///
/// * `signal` - Real input samples
/// * `fft_size` - Transform size; rounded up to the next power of two
pub fn magnitude_spectrum(signal: &[f32], fft_size: usize) -> Vec<f32> {
    if signal.is_empty() || fft_size < 2 {
        return Vec::new();
    }
    let n = fft_size.next_power_of_two();

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .take(n)
        .map(|&x| Complex::new(x, 0.0))
        .collect();
    buffer.resize(n, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    buffer[..n / 2 + 1].iter().map(|c| c.norm()).collect()
}

/// Compute an STFT magnitude spectrogram with a Hann window
///
/// Returns `n_frames × (frame_size / 2 + 1)` magnitudes. Signals shorter than
/// one frame produce an empty spectrogram rather than an error; downstream
/// consumers treat that as insufficient evidence.
pub fn stft_magnitudes(signal: &[f32], frame_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    let n_frames = frame_count(signal.len(), frame_size, hop_size);
    if n_frames == 0 || frame_size < 2 {
        return Vec::new();
    }

    let fft_size = frame_size.next_power_of_two();
    let window = hann_window(frame_size);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);

    let mut spectrogram = Vec::with_capacity(n_frames);
    let mut windowed = vec![0.0f32; frame_size];
    for frame in frames(signal, frame_size, hop_size) {
        windowed.copy_from_slice(frame);
        apply_window(&mut windowed, &window);

        let mut buffer: Vec<Complex<f32>> =
            windowed.iter().map(|&x| Complex::new(x, 0.0)).collect();
        buffer.resize(fft_size, Complex::new(0.0, 0.0));
        fft.process(&mut buffer);

        spectrogram.push(buffer[..fft_size / 2 + 1].iter().map(|c| c.norm()).collect());
    }

    spectrogram
}

/// Compute the full autocorrelation function via FFT acceleration
///
/// Uses the identity `ACF = IFFT(|FFT(x)|²)` with zero-padding to avoid
/// circular wrap-around. O(n log n) instead of O(n²).
///
/// # Returns
///
/// Non-negative ACF values, same length as the input.
pub fn autocorrelation_fft(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let fft_size = (2 * n).next_power_of_two();
    let mut buffer: Vec<Complex<f32>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    for x in &mut buffer {
        *x = *x * x.conj();
    }

    let ifft = planner.plan_fft_inverse(fft_size);
    ifft.process(&mut buffer);

    let scale = 1.0 / (fft_size as f32);
    buffer[..n].iter().map(|x| (x.re * scale).max(0.0)).collect()
}

/// Autocorrelation at a single lag, computed directly
///
/// Normalized by the zero-lag energy of the overlapping region so values are
/// comparable across lags. Returns 0.0 when the lag leaves no overlap.
pub fn autocorrelation_at_lag(signal: &[f32], lag: usize) -> f32 {
    if lag == 0 || lag >= signal.len() {
        return 0.0;
    }
    let n = signal.len() - lag;
    let mut dot = 0.0f32;
    let mut energy = 0.0f32;
    for i in 0..n {
        dot += signal[i] * signal[i + lag];
        energy += signal[i] * signal[i];
    }
    if energy > 1e-10 {
        (dot / energy).max(0.0)
    } else {
        0.0
    }
}
