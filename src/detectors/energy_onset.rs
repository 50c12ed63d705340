//! Energy-onset interval detector
//!
//! The workhorse time-domain estimator: frame the bandpassed signal into
//! short energy windows, pick energy peaks, and vote the peak-to-peak
//! intervals into a harmonic-aware histogram. Robust on percussive material;
//! degrades on pad-heavy signals with soft attacks.
//!
//! # Algorithm
//!
//! 1. 30 ms non-overlapping frame energies over the filtered signal
//! 2. Local maxima at or above 0.25x the strongest frame become onsets
//! 3. Consecutive onset gaps vote into an [`IntervalHistogram`] with
//!    duration-squared weights (longer gaps are rarer and more informative)
//! 4. Length boost + shorter-harmonic suppression, then selection with the
//!    prefer-longer rule
//! 5. Confidence blends raw-interval tightness around the winner with the
//!    winning bucket's share of total score

use crate::config::DetectionContext;
use crate::preprocessing::PreprocessedSignal;
use crate::signal::stats::EPSILON;
use crate::tempo::histogram::{
    IntervalHistogram, DEFAULT_MIN_SHARE, DEFAULT_SUPPRESSION_FACTOR,
};

use super::{meta, AlgorithmId, BpmReading, Detector};

/// Minimum audio needed before the detector will vote, in seconds
const MIN_DURATION_SECS: f32 = 1.0;

/// Minimum onset count (two intervals) for a meaningful histogram
const MIN_PEAKS: usize = 3;

/// Relative error under which a raw interval counts as supporting the winner
const TIGHTNESS_TOLERANCE: f32 = 0.15;

/// Energy-onset interval histogram detector
#[derive(Debug, Clone)]
pub struct EnergyOnsetDetector {
    /// Energy frame length in milliseconds
    frame_ms: f32,
    /// Peak threshold as a fraction of the strongest frame energy
    peak_threshold: f32,
}

impl Default for EnergyOnsetDetector {
    fn default() -> Self {
        Self {
            frame_ms: 30.0,
            peak_threshold: 0.25,
        }
    }
}

impl EnergyOnsetDetector {
    /// Frame energies (mean square) over non-overlapping windows
    fn frame_energies(&self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        let frame_len = (self.frame_ms / 1000.0 * sample_rate as f32) as usize;
        if frame_len == 0 {
            return Vec::new();
        }
        samples
            .chunks(frame_len)
            .filter(|c| c.len() == frame_len)
            .map(|c| c.iter().map(|&x| x * x).sum::<f32>() / frame_len as f32)
            .collect()
    }

    /// Local maxima at or above `threshold`, as frame indices
    fn pick_peaks(energies: &[f32], threshold: f32) -> Vec<usize> {
        let mut peaks = Vec::new();
        for i in 1..energies.len().saturating_sub(1) {
            if energies[i] >= threshold
                && energies[i] >= energies[i - 1]
                && energies[i] > energies[i + 1]
            {
                peaks.push(i);
            }
        }
        peaks
    }

    /// Fraction of raw intervals that land (after octave folding) near the
    /// winning interval
    fn interval_tightness(intervals_ms: &[f32], winner_ms: f32) -> f32 {
        if intervals_ms.is_empty() || winner_ms <= EPSILON {
            return 0.0;
        }
        let supporting = intervals_ms
            .iter()
            .filter(|&&interval| {
                let mut folded = interval;
                while folded < winner_ms / 1.5 && folded > EPSILON {
                    folded *= 2.0;
                }
                while folded > winner_ms * 1.5 {
                    folded /= 2.0;
                }
                (folded - winner_ms).abs() / winner_ms <= TIGHTNESS_TOLERANCE
            })
            .count();
        supporting as f32 / intervals_ms.len() as f32
    }
}

impl Detector for EnergyOnsetDetector {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::EnergyOnset
    }

    fn analyze(
        &self,
        signal: &PreprocessedSignal,
        ctx: &DetectionContext,
    ) -> Option<BpmReading> {
        if signal.is_empty() || signal.duration_secs() < MIN_DURATION_SECS {
            return None;
        }

        let energies = self.frame_energies(&signal.filtered, signal.sample_rate);
        let max_energy = energies.iter().cloned().fold(0.0f32, f32::max);
        if max_energy <= EPSILON {
            return None;
        }

        let peaks = Self::pick_peaks(&energies, self.peak_threshold * max_energy);
        if peaks.len() < MIN_PEAKS {
            log::debug!("Energy onset: only {} peaks, skipping", peaks.len());
            return None;
        }

        let intervals_ms: Vec<f32> = peaks
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) as f32 * self.frame_ms)
            .filter(|&gap| gap > EPSILON)
            .collect();
        if intervals_ms.len() < MIN_PEAKS - 1 {
            return None;
        }

        let mut histogram = IntervalHistogram::for_bpm_range(ctx.min_bpm, ctx.max_bpm);
        for &interval in &intervals_ms {
            // Longer gaps are rarer and carry more information per vote
            let weight = (interval / 1000.0).powi(2);
            histogram.accumulate(interval, weight, 1);
        }
        histogram.apply_length_boost();
        histogram.suppress_shorter_harmonics(DEFAULT_MIN_SHARE, DEFAULT_SUPPRESSION_FACTOR);

        let selection = histogram.select(true)?;
        let tightness = Self::interval_tightness(&intervals_ms, selection.interval_ms);
        let confidence = 0.45 * tightness + 0.55 * selection.dominance();

        log::debug!(
            "Energy onset: {:.1} BPM from {} peaks ({} intervals, tightness={:.2}, dominance={:.2})",
            selection.bpm,
            peaks.len(),
            intervals_ms.len(),
            tightness,
            selection.dominance()
        );

        Some(
            BpmReading::new(self.id(), selection.bpm, confidence)
                .with_meta("peaks", peaks.len() as f64)
                .with_meta("intervals", intervals_ms.len() as f64)
                .with_meta("winning_interval_ms", selection.interval_ms as f64)
                .with_meta(meta::CONSISTENCY, tightness as f64),
        )
    }
}
