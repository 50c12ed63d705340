//! Error types for the tempo detection engine

use std::fmt;

/// Errors that can occur during tempo analysis
///
/// "Insufficient evidence" conditions (short buffers, silent signals, collapsed
/// search ranges) are deliberately *not* errors: preprocessing degrades to empty
/// features and detectors return `None`. This enum covers caller bugs and
/// genuine processing faults only.
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// Invalid input parameters (caller bug, fail fast)
    InvalidInput(String),

    /// Audio decoding error
    DecodingError(String),

    /// Processing error during analysis
    ProcessingError(String),

    /// Numerical error (overflow, NaN propagation, etc.)
    NumericalError(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AnalysisError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            AnalysisError::ProcessingError(msg) => write!(f, "Processing error: {}", msg),
            AnalysisError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}
