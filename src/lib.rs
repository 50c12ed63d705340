//! # Cadence DSP
//!
//! A multi-algorithm musical tempo estimation engine. Several independent
//! detectors analyze a shared preprocessed view of the audio and a consensus
//! engine fuses their readings into one stable BPM estimate with a calibrated
//! confidence score.
//!
//! ## Features
//!
//! - **Shared preprocessing**: normalization, bandpass, multi-rate decimation,
//!   onset envelope, mel novelty curve, and tempogram computed once per window
//! - **Independent detectors**: energy-onset histogram, autocorrelation,
//!   spectral FFT, wavelet energy, and a DP beat tracker, run in parallel
//! - **Consensus fusion**: harmonic normalization, outlier rejection,
//!   clustering, and adaptive smoothing across analysis cycles
//!
//! ## Quick Start
//!
//! ```no_run
//! use cadence_dsp::{analyze_window, DetectionContext};
//!
//! let samples: Vec<f32> = vec![]; // Mono audio, normalized to [-1.0, 1.0]
//! let ctx = DetectionContext::with_defaults(44100)?;
//!
//! let summary = analyze_window(&samples, &ctx)?;
//! if let Some(consensus) = summary.consensus {
//!     println!("BPM: {:.1} (confidence: {:.2})", consensus.bpm, consensus.confidence);
//! }
//! # Ok::<(), cadence_dsp::AnalysisError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Audio Frames -> Preprocessing -> Detector Batch (parallel) -> Consensus -> Estimate
//! ```
//!
//! For streaming use, [`coordinator::TempoAnalyzer`] maintains the sliding
//! buffer and per-session consensus state across repeated analysis cycles.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod detectors;
pub mod error;
pub mod io;
pub mod preprocessing;
pub mod signal;
pub mod tempo;

// Re-export main types
pub use config::{ConsensusParams, DetectionContext, PreprocessParams};
pub use consensus::{ConsensusEngine, ConsensusResult};
pub use coordinator::{AnalysisStatus, AnalysisSummary, TempoAnalyzer};
pub use detectors::{AlgorithmId, BpmReading, Detector};
pub use error::AnalysisError;
pub use io::AudioFrame;

/// One-shot analysis of a single audio window
///
/// Convenience wrapper for offline use: builds a fresh [`TempoAnalyzer`],
/// pushes the samples as one frame, and runs a single analysis cycle. For
/// streaming input, hold a `TempoAnalyzer` and feed it frames instead, so
/// consensus state carries across cycles.
///
/// # Arguments
///
/// * `samples` - Mono audio samples, normalized to [-1.0, 1.0]
/// * `ctx` - Detection context (sample rate, BPM range, window)
///
/// # Returns
///
/// The cycle's [`AnalysisSummary`]; `consensus` is `None` when no detector
/// found a tempo.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` when `samples` is empty.
pub fn analyze_window(
    samples: &[f32],
    ctx: &DetectionContext,
) -> Result<AnalysisSummary, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "Empty audio samples".to_string(),
        ));
    }

    log::debug!(
        "One-shot analysis: {} samples at {} Hz",
        samples.len(),
        ctx.sample_rate
    );

    let window_secs =
        (samples.len() as f32 / ctx.sample_rate as f32).max(ctx.window_secs);
    let mut analyzer = TempoAnalyzer::with_params(
        DetectionContext::new(ctx.sample_rate, ctx.min_bpm, ctx.max_bpm, window_secs)?,
        PreprocessParams::default(),
        ConsensusParams::default(),
        coordinator::AnalyzerOptions::default(),
    );
    analyzer.push_frame(AudioFrame::new(samples.to_vec(), ctx.sample_rate, 0));
    Ok(analyzer.analyze_cycle())
}
