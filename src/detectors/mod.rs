//! Tempo detection algorithms
//!
//! Four-plus independent estimators, each consuming the shared
//! `PreprocessedSignal` and producing a `BpmReading`. They are peers, not
//! pipeline stages: no shared mutable state, independently schedulable, and
//! each brings a distinct numeric strategy and its own harmonic-error
//! handling. Detectors never fail on malformed or short input; "insufficient
//! evidence" is `None`.

pub mod autocorrelation;
pub mod beat_tracker;
pub mod energy_onset;
pub mod spectral_fft;
pub mod wavelet;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DetectionContext;
use crate::preprocessing::PreprocessedSignal;

/// Identity of a detection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlgorithmId {
    /// Energy-onset interval histogram
    EnergyOnset,
    /// Lag-domain autocorrelation on the downsampled signal
    Autocorrelation,
    /// Spectral peak of the energy envelope
    SpectralFft,
    /// Multiresolution Haar wavelet energy
    WaveletEnergy,
    /// Dynamic-programming beat tracker
    BeatTracker,
}

impl AlgorithmId {
    /// Human-readable algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmId::EnergyOnset => "energy_onset",
            AlgorithmId::Autocorrelation => "autocorrelation",
            AlgorithmId::SpectralFft => "spectral_fft",
            AlgorithmId::WaveletEnergy => "wavelet_energy",
            AlgorithmId::BeatTracker => "beat_tracker",
        }
    }
}

/// One detector's tempo estimate for one analysis window
///
/// Created by a detector and consumed by the consensus engine and any
/// UI/telemetry listener. The coordinator stamps `timestamp_ms` and the
/// consensus engine records applied harmonic folds under
/// [`meta::OCTAVE_RATIO`]; the estimate itself is never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BpmReading {
    /// Producing algorithm
    pub algorithm: AlgorithmId,
    /// Estimated tempo in BPM, always within the requested range
    pub bpm: f32,
    /// Estimate confidence in [0, 1]
    pub confidence: f32,
    /// Cycle timestamp in milliseconds, stamped by the coordinator
    pub timestamp_ms: u64,
    /// Algorithm-specific numeric diagnostics (lags, cluster stats,
    /// harmonic-correction flags encoded as 0/1)
    pub metadata: BTreeMap<String, f64>,
}

impl BpmReading {
    /// Create a reading with clamped confidence and empty metadata
    pub fn new(algorithm: AlgorithmId, bpm: f32, confidence: f32) -> Self {
        Self {
            algorithm,
            bpm,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp_ms: 0,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry (builder style)
    pub fn with_meta(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Read a metadata entry, defaulting when absent
    pub fn meta_or(&self, key: &str, default: f64) -> f64 {
        self.metadata.get(key).copied().unwrap_or(default)
    }
}

/// Common metadata keys shared between detectors and the consensus engine
pub mod meta {
    /// Cluster/histogram consistency in [0, 1]
    pub const CONSISTENCY: &str = "consistency";
    /// Net harmonic multiplier applied to bring the estimate in range
    pub const HARMONIC_MULTIPLIER: &str = "harmonic_multiplier";
    /// 1.0 when the estimate had to be clamped to a range bound
    pub const CLAMPED: &str = "clamped";
    /// Octave/harmonic ratio applied by consensus normalization
    pub const OCTAVE_RATIO: &str = "octave_ratio";
}

/// A tempo estimation algorithm
///
/// Implementations are pure functions of the shared signal: no mutable state
/// across calls, safe to run in parallel. `analyze` must never panic on
/// malformed or short input; expected "no evidence" conditions return `None`.
pub trait Detector: Send + Sync {
    /// Algorithm identity
    fn id(&self) -> AlgorithmId;

    /// Human-readable algorithm name
    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Estimate tempo from the shared preprocessed signal
    fn analyze(&self, signal: &PreprocessedSignal, ctx: &DetectionContext)
        -> Option<BpmReading>;
}

/// The standard detector set, constructed at session setup
///
/// A compile-time list: no dynamic registry is needed, every algorithm is a
/// known type. The DP beat tracker is included by default; pass
/// `with_beat_tracker = false` to run the four-core set on constrained
/// targets.
pub fn default_registry(with_beat_tracker: bool) -> Vec<Box<dyn Detector>> {
    let mut detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(energy_onset::EnergyOnsetDetector::default()),
        Box::new(autocorrelation::AutocorrelationDetector::default()),
        Box::new(spectral_fft::SpectralFftDetector::default()),
        Box::new(wavelet::WaveletEnergyDetector::default()),
    ];
    if with_beat_tracker {
        detectors.push(Box::new(beat_tracker::BeatTrackerDetector::default()));
    }
    detectors
}
