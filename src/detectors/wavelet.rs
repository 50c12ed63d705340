//! Multiresolution wavelet energy detector
//!
//! Decomposes the mid-rate signal with an iterative Haar transform and looks
//! for a common beat period across the subband energy envelopes. Each level
//! halves the working rate, so the same beat appears at a halved lag; a tempo
//! supported by several scales at once is strong evidence against noise.
//!
//! Subband estimates enter candidate refinement as literal values: the scale
//! ladder already encodes the octave structure, so harmonic expansion on top
//! of it would double-count.

use crate::config::DetectionContext;
use crate::preprocessing::PreprocessedSignal;
use crate::signal::fft::autocorrelation_at_lag;
use crate::signal::stats::{moving_average, remove_mean, EPSILON};
use crate::signal::window::previous_power_of_two;
use crate::tempo::harmonics::refine_from_candidates;
use crate::tempo::TempoCandidate;

use super::{meta, AlgorithmId, BpmReading, Detector};

/// Decomposition depth
const LEVELS: usize = 2;

/// Minimum trimmed length worth decomposing
const MIN_SAMPLES: usize = 1024;

/// Envelope smoothing window in band samples
const SMOOTH_WINDOW: usize = 4;

/// Coarse lag scan budget per band
const MAX_COARSE_EVALS: usize = 100;

/// Cluster tolerance handed to candidate refinement, in BPM
const CLUSTER_TOLERANCE_BPM: f32 = 3.0;

const SQRT_2_INV: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Haar-subband beat period detector
#[derive(Debug, Clone, Default)]
pub struct WaveletEnergyDetector;

impl WaveletEnergyDetector {
    /// One Haar analysis step: pairwise `(a+b)/sqrt(2)` and `(a-b)/sqrt(2)`
    fn haar_step(samples: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let half = samples.len() / 2;
        let mut approx = Vec::with_capacity(half);
        let mut detail = Vec::with_capacity(half);
        for pair in samples.chunks_exact(2) {
            approx.push((pair[0] + pair[1]) * SQRT_2_INV);
            detail.push((pair[0] - pair[1]) * SQRT_2_INV);
        }
        (approx, detail)
    }

    /// Subband energy envelope: rectify, smooth, center
    fn band_envelope(band: &[f32]) -> Vec<f32> {
        let rectified: Vec<f32> = band.iter().map(|x| x.abs()).collect();
        let mut envelope = moving_average(&rectified, SMOOTH_WINDOW);
        remove_mean(&mut envelope);
        envelope
    }

    /// Coarse-then-fine autocorrelation scan over a band's lag range
    fn best_band_lag(
        envelope: &[f32],
        min_lag: usize,
        max_lag: usize,
    ) -> Option<(usize, f32)> {
        let max_lag = max_lag.min(envelope.len() / 2);
        let span = max_lag.checked_sub(min_lag)?;
        if span < 3 {
            return None;
        }

        let stride = (span / MAX_COARSE_EVALS).max(1);
        let mut best_lag = min_lag;
        let mut best_value = f32::NEG_INFINITY;
        let mut lag = min_lag;
        while lag <= max_lag {
            let value = autocorrelation_at_lag(envelope, lag);
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
            lag += stride;
        }

        // Refinement pass around the coarse winner
        let lo = best_lag.saturating_sub(2 * stride).max(min_lag);
        let hi = (best_lag + 2 * stride).min(max_lag);
        for lag in lo..=hi {
            let value = autocorrelation_at_lag(envelope, lag);
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
        }

        if best_value > EPSILON {
            Some((best_lag, best_value))
        } else {
            None
        }
    }
}

impl Detector for WaveletEnergyDetector {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::WaveletEnergy
    }

    fn analyze(
        &self,
        signal: &PreprocessedSignal,
        ctx: &DetectionContext,
    ) -> Option<BpmReading> {
        let rate = signal.mid_rate_hz;
        if rate == 0 || signal.mid_rate.len() < rate as usize {
            return None;
        }

        let trimmed_len = previous_power_of_two(signal.mid_rate.len());
        if trimmed_len < MIN_SAMPLES {
            return None;
        }
        let mut current = signal.mid_rate[..trimmed_len].to_vec();

        // Decompose and collect (band, band_rate): detail of each level plus
        // the final approximation
        let mut bands: Vec<(Vec<f32>, f32)> = Vec::with_capacity(LEVELS + 1);
        let mut band_rate = rate as f32;
        for _ in 0..LEVELS {
            let (approx, detail) = Self::haar_step(&current);
            band_rate /= 2.0;
            bands.push((detail, band_rate));
            current = approx;
        }
        bands.push((current, band_rate));

        let mut candidates: Vec<TempoCandidate> = Vec::new();
        let mut best_value = 0.0f32;
        for (band, band_rate) in &bands {
            let envelope = Self::band_envelope(band);
            let min_lag = (band_rate * 60.0 / ctx.max_bpm) as usize;
            let max_lag = (band_rate * 60.0 / ctx.min_bpm) as usize;
            if let Some((lag, value)) = Self::best_band_lag(&envelope, min_lag.max(1), max_lag)
            {
                let bpm = 60.0 * band_rate / lag as f32;
                candidates.push(TempoCandidate::literal(bpm, value.max(0.0)));
                best_value = best_value.max(value);
                log::debug!(
                    "Wavelet band @{:.0} Hz: lag {} => {:.1} BPM (value={:.3})",
                    band_rate,
                    lag,
                    bpm,
                    value
                );
            }
        }

        let refinement = refine_from_candidates(
            &candidates,
            ctx.min_bpm,
            ctx.max_bpm,
            CLUSTER_TOLERANCE_BPM,
        )?;

        let score_share = if refinement.total_score > EPSILON {
            (refinement.score / refinement.total_score).clamp(0.0, 1.0)
        } else {
            0.0
        };
        // Cross-scale agreement is the detector's whole value proposition:
        // a singleton cluster gets half the confidence of full agreement
        let agreement = refinement.cluster_size as f32 / candidates.len().max(1) as f32;
        let confidence = (0.4 * refinement.consistency
            + 0.3 * score_share
            + 0.3 * best_value.clamp(0.0, 1.0))
            * (0.5 + 0.5 * agreement);

        Some(
            BpmReading::new(self.id(), refinement.bpm, confidence)
                .with_meta("bands", candidates.len() as f64)
                .with_meta("cluster_size", refinement.cluster_size as f64)
                .with_meta(meta::CONSISTENCY, refinement.consistency as f64)
                .with_meta(meta::CLAMPED, if refinement.clamped { 1.0 } else { 0.0 }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessParams;
    use crate::io::AudioFrame;
    use crate::preprocessing::process;

    /// Deterministic pseudo-noise (no rand dependency in tests)
    fn noise(seed: u64, n: usize, amplitude: f32) -> Vec<f32> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn noisy_beat(bpm: f32, secs: f32, sample_rate: u32, noise_amp: f32, seed: u64) -> Vec<f32> {
        let n = (sample_rate as f32 * secs) as usize;
        let period = (60.0 / bpm * sample_rate as f32) as usize;
        let noise = noise(seed, n, noise_amp);
        (0..n)
            .map(|i| {
                let phase = (i % period) as f32 / sample_rate as f32;
                let env = (-phase * 25.0).exp();
                let tone =
                    (2.0 * std::f32::consts::PI * 90.0 * i as f32 / sample_rate as f32).sin();
                env * tone + noise[i]
            })
            .collect()
    }

    fn preprocess(samples: Vec<f32>) -> PreprocessedSignal {
        let ctx = DetectionContext::with_defaults(44100).unwrap();
        let frames = vec![AudioFrame::new(samples, 44100, 0)];
        process(&frames, &ctx, &PreprocessParams::default())
    }

    #[test]
    fn test_haar_step_energy_preserving() {
        let samples = vec![1.0, 0.5, -0.25, 0.75, 0.1, -0.9, 0.3, 0.2];
        let (approx, detail) = WaveletEnergyDetector::haar_step(&samples);
        assert_eq!(approx.len(), 4);
        assert_eq!(detail.len(), 4);

        let input_energy: f32 = samples.iter().map(|x| x * x).sum();
        let output_energy: f32 = approx
            .iter()
            .chain(detail.iter())
            .map(|x| x * x)
            .sum();
        assert!((input_energy - output_energy).abs() < 1e-5);
    }

    #[test]
    fn test_detects_noisy_beat() {
        let signal = preprocess(noisy_beat(96.0, 10.0, 44100, 0.05, 42));
        let ctx = DetectionContext::with_defaults(44100).unwrap();
        let reading = WaveletEnergyDetector.analyze(&signal, &ctx).unwrap();

        let near_family =
            (reading.bpm - 96.0).abs() <= 4.0 || (reading.bpm - 192.0).abs() <= 8.0;
        assert!(near_family, "got {:.1} BPM", reading.bpm);
        assert!(reading.bpm >= ctx.min_bpm && reading.bpm <= ctx.max_bpm);
        assert!(reading.confidence > 0.0 && reading.confidence <= 1.0);
    }

    #[test]
    fn test_pure_noise_low_confidence() {
        let signal = preprocess(noise(7, 44100 * 6, 0.5));
        let ctx = DetectionContext::with_defaults(44100).unwrap();
        // Pure noise may produce a reading, but never a confident one
        if let Some(reading) = WaveletEnergyDetector.analyze(&signal, &ctx) {
            assert!(reading.confidence < 0.6, "noise gave {:.2}", reading.confidence);
            assert!(reading.bpm >= ctx.min_bpm && reading.bpm <= ctx.max_bpm);
        }
    }

    #[test]
    fn test_short_input_returns_none() {
        let signal = preprocess(noisy_beat(96.0, 0.4, 44100, 0.05, 42));
        let ctx = DetectionContext::with_defaults(44100).unwrap();
        assert!(WaveletEnergyDetector.analyze(&signal, &ctx).is_none());
    }

    #[test]
    fn test_empty_signal_returns_none() {
        let signal = PreprocessedSignal::default();
        let ctx = DetectionContext::with_defaults(44100).unwrap();
        assert!(WaveletEnergyDetector.analyze(&signal, &ctx).is_none());
    }
}
