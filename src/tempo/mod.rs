//! Tempo candidate generation and harmonic clustering
//!
//! Shared logic used by multiple detectors to turn many weighted
//! interval/BPM hypotheses into one fundamental-tempo decision while resisting
//! harmonic lock-in (octave, 3/2, 2/3). The harmonic ratio table in
//! [`harmonics`] is the single source of ratios for both the detectors and
//! the consensus engine, so tuning cannot diverge between call sites.

pub mod harmonics;
pub mod histogram;

/// A weighted raw BPM hypothesis
///
/// Ephemeral: exists only during a single refinement call.
#[derive(Debug, Clone)]
pub struct TempoCandidate {
    /// Hypothesized tempo in BPM
    pub bpm: f32,
    /// Evidence weight (non-negative)
    pub weight: f32,
    /// Origin tag for diagnostics
    pub source: Option<&'static str>,
    /// Whether harmonic expansion (x0.5, x2, x1.5, ...) may be applied.
    /// Detectors whose representation already encodes an octave ladder
    /// (e.g. wavelet scale levels) pass literal candidates.
    pub allow_harmonics: bool,
}

impl TempoCandidate {
    /// Candidate with harmonic expansion enabled
    pub fn new(bpm: f32, weight: f32) -> Self {
        Self {
            bpm,
            weight,
            source: None,
            allow_harmonics: true,
        }
    }

    /// Candidate taken at face value, no harmonic expansion
    pub fn literal(bpm: f32, weight: f32) -> Self {
        Self {
            bpm,
            weight,
            source: None,
            allow_harmonics: false,
        }
    }
}

/// Result of clustering a set of tempo candidates
#[derive(Debug, Clone)]
pub struct TempoRefinement {
    /// Winning tempo in BPM (already coerced into range)
    pub bpm: f32,
    /// Aggregate score of the winning cluster
    pub score: f32,
    /// Total score across all competing clusters
    pub total_score: f32,
    /// Number of candidates in the winning cluster
    pub cluster_size: usize,
    /// Cluster consistency in [0, 1] (spread/harmonic/clamp penalties applied)
    pub consistency: f32,
    /// True when the winner had to be clamped to a range bound (lower trust)
    pub clamped: bool,
}

/// The winning bucket of an interval histogram pass
#[derive(Debug, Clone)]
pub struct HistogramSelection {
    /// Winning beat interval in milliseconds
    pub interval_ms: f32,
    /// Equivalent tempo in BPM
    pub bpm: f32,
    /// Winning bucket score
    pub score: f32,
    /// Total score across all buckets
    pub total_score: f32,
    /// Number of raw intervals supporting the winning bucket
    pub supporters: usize,
    /// BPMs of buckets that were suppressed as shorter harmonics
    pub suppressed_bpms: Vec<f32>,
}

impl HistogramSelection {
    /// Winning bucket's share of the total score, in [0, 1]
    pub fn dominance(&self) -> f32 {
        if self.total_score > 1e-10 {
            (self.score / self.total_score).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
