//! Lag-domain autocorrelation detector
//!
//! Scans beat-period lags on the mid-rate (~8 kHz) copy of the filtered
//! signal and reads the tempo off the strongest self-similarity lag.
//! Evaluation cost is bounded by a two-stage scan: a coarse stride pass over
//! the full lag range followed by a unit-stride refinement around the coarse
//! winner.

use crate::config::DetectionContext;
use crate::preprocessing::PreprocessedSignal;
use crate::signal::fft::autocorrelation_at_lag;
use crate::signal::stats::{peak_normalize, remove_mean, EPSILON};
use crate::tempo::harmonics::coerce_to_range;

use super::{meta, AlgorithmId, BpmReading, Detector};

/// Budget for the coarse scan
const MAX_COARSE_EVALS: usize = 100;

/// Budget for the refinement scan
const MAX_REFINE_EVALS: usize = 300;

/// Minimum usable lag span
const MIN_LAG_SPAN: usize = 3;

/// Autocorrelation tempo detector on the mid-rate signal
#[derive(Debug, Clone, Default)]
pub struct AutocorrelationDetector;

impl AutocorrelationDetector {
    /// Coarse-then-fine lag scan
    ///
    /// # Returns
    ///
    /// `(best_lag, best_value, mean_value)` where `mean_value` is the average
    /// coarse-scan correlation, used as the confidence baseline.
    fn scan_lags(
        samples: &[f32],
        min_lag: usize,
        max_lag: usize,
    ) -> Option<(usize, f32, f32)> {
        let span = max_lag.checked_sub(min_lag)?;
        if span < MIN_LAG_SPAN {
            return None;
        }

        let stride = (span / MAX_COARSE_EVALS).max(1);
        let mut best_lag = min_lag;
        let mut best_value = f32::NEG_INFINITY;
        let mut sum = 0.0f32;
        let mut count = 0usize;

        let mut lag = min_lag;
        while lag <= max_lag {
            let value = autocorrelation_at_lag(samples, lag);
            sum += value;
            count += 1;
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
            lag += stride;
        }

        // Unit-stride refinement around the coarse winner
        let lo = best_lag.saturating_sub(2 * stride).max(min_lag);
        let hi = (best_lag + 2 * stride).min(max_lag);
        for lag in lo..=hi.min(lo + MAX_REFINE_EVALS) {
            let value = autocorrelation_at_lag(samples, lag);
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
        }

        let mean_value = if count > 0 { sum / count as f32 } else { 0.0 };
        Some((best_lag, best_value, mean_value))
    }
}

impl Detector for AutocorrelationDetector {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::Autocorrelation
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

        let mut samples = signal.mid_rate.clone();
        remove_mean(&mut samples);
        peak_normalize(&mut samples);

        // Lag bounds from the BPM range; a lag must leave at least half the
        // buffer of overlap to correlate against
        let min_lag = (rate as f32 * 60.0 / ctx.max_bpm) as usize;
        let max_lag = ((rate as f32 * 60.0 / ctx.min_bpm) as usize).min(samples.len() / 2);
        let (best_lag, best_value, mean_value) =
            Self::scan_lags(&samples, min_lag.max(1), max_lag)?;

        if best_value <= EPSILON || best_lag == 0 {
            return None;
        }

        let raw_bpm = 60.0 * rate as f32 / best_lag as f32;
        let coerced = coerce_to_range(raw_bpm, ctx.min_bpm, ctx.max_bpm);

        // Peak prominence over the scan baseline, discounted when the
        // estimate needed a harmonic correction
        let contrast = ((best_value - mean_value) / (best_value.abs() + EPSILON))
            .clamp(0.0, 1.0);
        let harmonic_deviation =
            (coerced.multiplier.max(1.0 / coerced.multiplier.max(EPSILON))) - 1.0;
        let mut confidence =
            (0.55 * best_value.clamp(0.0, 1.0) + 0.45 * contrast) / (1.0 + harmonic_deviation);
        if coerced.clamped {
            confidence *= 0.5;
        }

        log::debug!(
            "Autocorrelation: {:.1} BPM at lag {} (value={:.3}, baseline={:.3})",
            coerced.bpm,
            best_lag,
            best_value,
            mean_value
        );

        Some(
            BpmReading::new(self.id(), coerced.bpm, confidence)
                .with_meta("lag", best_lag as f64)
                .with_meta("peak_value", best_value as f64)
                .with_meta(meta::HARMONIC_MULTIPLIER, coerced.multiplier as f64)
                .with_meta(meta::CLAMPED, if coerced.clamped { 1.0 } else { 0.0 }),
        )
    }
}
