//! Configuration parameters for tempo detection
//!
//! `DetectionContext` is the immutable per-session analysis context shared by
//! preprocessing and every detector. The tuning structs expose the per-stage
//! constants as named parameters with documented defaults rather than burying
//! them at call sites.

use crate::error::AnalysisError;

/// Immutable configuration for one analysis session
///
/// Constructed once per session (or per adaptive change) and shared by
/// reference across preprocessing and all detectors.
#[derive(Debug, Clone)]
pub struct DetectionContext {
    /// Input sample rate in Hz
    pub sample_rate: u32,

    /// Minimum BPM to consider (default: 60.0)
    pub min_bpm: f32,

    /// Maximum BPM to consider (default: 200.0)
    pub max_bpm: f32,

    /// Analysis window duration in seconds (default: 5.0)
    pub window_secs: f32,
}

impl DetectionContext {
    /// Create a new detection context, validating the invariants
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if `sample_rate == 0`, either BPM
    /// bound is non-positive, or `min_bpm >= max_bpm`. These indicate caller
    /// bugs and fail fast rather than degrading silently.
    pub fn new(
        sample_rate: u32,
        min_bpm: f32,
        max_bpm: f32,
        window_secs: f32,
    ) -> Result<Self, AnalysisError> {
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput(
                "Sample rate must be > 0".to_string(),
            ));
        }
        if min_bpm <= 0.0 || max_bpm <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "BPM bounds must be positive, got [{:.1}, {:.1}]",
                min_bpm, max_bpm
            )));
        }
        if min_bpm >= max_bpm {
            return Err(AnalysisError::InvalidInput(format!(
                "Invalid BPM range: [{:.1}, {:.1}]",
                min_bpm, max_bpm
            )));
        }
        if !window_secs.is_finite() || window_secs <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Window duration must be positive, got {:.2}",
                window_secs
            )));
        }

        Ok(Self {
            sample_rate,
            min_bpm,
            max_bpm,
            window_secs,
        })
    }

    /// Context with library defaults at the given sample rate
    pub fn with_defaults(sample_rate: u32) -> Result<Self, AnalysisError> {
        Self::new(sample_rate, 60.0, 200.0, 5.0)
    }
}

/// Preprocessing pipeline tuning parameters
#[derive(Debug, Clone)]
pub struct PreprocessParams {
    /// RMS normalization target in dBFS (default: -18.0)
    pub target_rms_dbfs: f32,

    /// Bandpass high-pass corner in Hz (default: 20.0)
    pub highpass_hz: f32,

    /// Bandpass low-pass corner in Hz (default: 1500.0)
    pub lowpass_hz: f32,

    /// Onset envelope frame length in milliseconds (default: 30.0)
    pub envelope_frame_ms: f32,

    /// Onset envelope hop in milliseconds (default: 10.0)
    pub envelope_hop_ms: f32,

    /// Exponential smoothing factor for the envelope (default: 0.3)
    pub envelope_smoothing: f32,

    /// Sub-frame size for noise floor estimation (default: 2048)
    pub noise_frame_size: usize,

    /// Target rate for the mid-rate decimated copy in Hz (default: 8000)
    pub mid_rate_hz: u32,

    /// Target rate for the low-rate decimated copy in Hz (default: 400)
    pub low_rate_hz: u32,

    /// Mel spectrogram band count (default: 40)
    pub mel_bands: usize,

    /// Novelty curve mel band count (default: 6)
    pub novelty_mel_bands: usize,

    /// Log compression constant for the novelty curve (default: 1000.0)
    pub novelty_log_compression: f32,

    /// STFT window size for mel/novelty features (default: 1024)
    pub stft_size: usize,

    /// STFT hop size for mel/novelty features (default: 512)
    pub stft_hop: usize,

    /// Tempogram analysis window in seconds (default: 8.0)
    pub tempogram_window_secs: f32,

    /// Tempogram hop in seconds (default: 1.0)
    pub tempogram_hop_secs: f32,

    /// Tempogram BPM axis bin count (default: 120)
    pub tempogram_bins: usize,

    /// Tempogram BPM axis lower bound (default: 50.0)
    pub tempogram_min_bpm: f32,

    /// Tempogram BPM axis upper bound (default: 250.0)
    pub tempogram_max_bpm: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            target_rms_dbfs: -18.0,
            highpass_hz: 20.0,
            lowpass_hz: 1500.0,
            envelope_frame_ms: 30.0,
            envelope_hop_ms: 10.0,
            envelope_smoothing: 0.3,
            noise_frame_size: 2048,
            mid_rate_hz: 8000,
            low_rate_hz: 400,
            mel_bands: 40,
            novelty_mel_bands: 6,
            novelty_log_compression: 1000.0,
            stft_size: 1024,
            stft_hop: 512,
            tempogram_window_secs: 8.0,
            tempogram_hop_secs: 1.0,
            tempogram_bins: 120,
            tempogram_min_bpm: 50.0,
            tempogram_max_bpm: 250.0,
        }
    }
}

/// Consensus engine tuning parameters
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Per-algorithm rolling history depth (default: 10)
    pub history_depth: usize,

    /// Per-algorithm outlier rejection threshold vs own median, in BPM (default: 8.0)
    pub outlier_threshold_bpm: f32,

    /// Cluster membership tolerance in BPM (default: 3.0)
    pub cluster_tolerance_bpm: f32,

    /// Base exponential smoothing factor (default: 0.35)
    pub smoothing_factor: f32,

    /// Smoothing factor once the stability counter is satisfied (default: 0.15)
    pub stable_smoothing_factor: f32,

    /// Consecutive low-deviation cycles required for stable smoothing (default: 4)
    pub stability_cycles: u32,

    /// Deviation below which a cycle counts toward stability, in BPM (default: 2.0)
    pub stability_deviation_bpm: f32,

    /// Bounded history of consensus outputs used for variance scoring (default: 12)
    pub output_history_depth: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            history_depth: 10,
            outlier_threshold_bpm: 8.0,
            cluster_tolerance_bpm: 3.0,
            smoothing_factor: 0.35,
            stable_smoothing_factor: 0.15,
            stability_cycles: 4,
            stability_deviation_bpm: 2.0,
            output_history_depth: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_valid() {
        let ctx = DetectionContext::new(44100, 60.0, 180.0, 5.0).unwrap();
        assert_eq!(ctx.sample_rate, 44100);
        assert_eq!(ctx.min_bpm, 60.0);
    }

    #[test]
    fn test_context_rejects_inverted_range() {
        assert!(DetectionContext::new(44100, 180.0, 60.0, 5.0).is_err());
        assert!(DetectionContext::new(44100, 120.0, 120.0, 5.0).is_err());
    }

    #[test]
    fn test_context_rejects_bad_params() {
        assert!(DetectionContext::new(0, 60.0, 180.0, 5.0).is_err());
        assert!(DetectionContext::new(44100, -10.0, 180.0, 5.0).is_err());
        assert!(DetectionContext::new(44100, 60.0, 180.0, 0.0).is_err());
    }
}
