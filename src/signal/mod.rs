//! Stateless signal primitives
//!
//! Pure math shared by the preprocessing pipeline and the detectors:
//! windowing, FFT-based transforms, basic statistics, and decimation.

pub mod fft;
pub mod resample;
pub mod stats;
pub mod window;
