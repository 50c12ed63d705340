//! External interface types and fixture loading
//!
//! The boundary with the audio-capture collaborator: capture hands the core a
//! stream of `AudioFrame`s in arrival order; the WAV loader exists for the
//! test-fixture convention (PCM16 files whose filename encodes ground-truth
//! BPM).

pub mod wav;

/// One immutable chunk of mono PCM from the capture layer
///
/// Samples are floats in [-1, 1]. Stereo sources must be downmixed by the
/// capture layer (or via [`wav::load_wav_mono`]). Never mutated after
/// creation.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono amplitude samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the original capture (informational; samples are mono)
    pub channels: u16,
    /// Monotonic ordering key assigned by the capture layer
    pub sequence: u64,
}

impl AudioFrame {
    /// Create a frame from mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
            sequence,
        }
    }

    /// Frame duration in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}
