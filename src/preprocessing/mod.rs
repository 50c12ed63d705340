//! Preprocessing pipeline
//!
//! Turns a window of raw audio frames into the `PreprocessedSignal` bundle
//! shared read-only by every detector: normalized and filtered buffers,
//! multi-rate decimated copies, the onset envelope, a mel spectrogram, the
//! novelty curve, and the tempogram. Computed once per analysis window.
//!
//! Every step degrades to an empty feature on insufficient data; the pipeline
//! never fails. Detectors treat empty features as "insufficient evidence" and
//! return no reading.

pub mod envelope;
pub mod filters;
pub mod mel;
pub mod normalization;
pub mod novelty;
pub mod tempogram;

use crate::config::{DetectionContext, PreprocessParams};
use crate::io::AudioFrame;
use crate::signal::resample::decimate_to_rate;

use envelope::OnsetEnvelope;
use mel::MelSpectrogram;
use novelty::NoveltyCurve;
use tempogram::Tempogram;

/// The shared per-window analysis artifact
///
/// Owned by the pass that created it and immutable once returned; all
/// detectors read the same instance, guaranteeing consistent input across
/// algorithms.
#[derive(Debug, Clone, Default)]
pub struct PreprocessedSignal {
    /// Native sample rate in Hz
    pub sample_rate: u32,

    /// RMS-normalized samples at the native rate
    pub normalized: Vec<f32>,

    /// Bandpass-filtered (20-1500 Hz) samples at the native rate
    pub filtered: Vec<f32>,

    /// Filtered samples decimated to ~8 kHz
    pub mid_rate: Vec<f32>,
    /// Actual rate of `mid_rate` in Hz
    pub mid_rate_hz: u32,

    /// Filtered samples decimated to ~400 Hz
    pub low_rate: Vec<f32>,
    /// Actual rate of `low_rate` in Hz
    pub low_rate_hz: u32,

    /// Smoothed RMS onset envelope (~100 Hz effective rate)
    pub envelope: OnsetEnvelope,

    /// 40-band mel spectrogram (diagnostic)
    pub mel: MelSpectrogram,

    /// Mel-filtered log-compressed spectral-flux novelty curve
    pub novelty: NoveltyCurve,

    /// Tempogram over the novelty curve, None when the curve was too short
    pub tempogram: Option<Tempogram>,

    /// Noise floor RMS estimate (diagnostic only, never gates analysis)
    pub noise_floor: f32,
}

impl PreprocessedSignal {
    /// True when the window carried no usable audio
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Window duration in seconds at the native rate
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.normalized.len() as f32 / self.sample_rate as f32
    }
}

/// Run the full preprocessing pipeline over a window of frames
///
/// Steps, in order: concatenate, noise-floor estimate, RMS normalization,
/// 20-1500 Hz bandpass, onset envelope, multi-rate decimation, mel
/// spectrogram, novelty curve, tempogram.
///
/// An empty frame list (or all-empty frames) returns a well-formed all-empty
/// signal; this function never fails.
pub fn process(
    frames: &[AudioFrame],
    ctx: &DetectionContext,
    params: &PreprocessParams,
) -> PreprocessedSignal {
    let total_len: usize = frames.iter().map(|f| f.samples.len()).sum();
    if total_len == 0 {
        log::debug!("Preprocessing: empty window, returning empty signal");
        return PreprocessedSignal {
            sample_rate: ctx.sample_rate,
            ..PreprocessedSignal::default()
        };
    }

    // Step 1: concatenate frame samples into one buffer
    let mut samples = Vec::with_capacity(total_len);
    for frame in frames {
        samples.extend_from_slice(&frame.samples);
    }

    log::debug!(
        "Preprocessing {} samples ({:.2} s) from {} frames",
        samples.len(),
        samples.len() as f32 / ctx.sample_rate as f32,
        frames.len()
    );

    // Step 2: noise floor (diagnostic only)
    let noise_floor = normalization::estimate_noise_floor(&samples, params.noise_frame_size);

    // Step 3: RMS normalization
    normalization::rms_normalize(&mut samples, params.target_rms_dbfs);
    let normalized = samples;

    // Step 4: bandpass 20-1500 Hz
    let filtered = filters::bandpass(
        &normalized,
        params.highpass_hz,
        params.lowpass_hz,
        ctx.sample_rate,
    );

    // Step 5: onset envelope on the filtered signal
    let envelope = envelope::onset_envelope(
        &filtered,
        ctx.sample_rate,
        params.envelope_frame_ms,
        params.envelope_hop_ms,
        params.envelope_smoothing,
    );

    // Step 6: decimated copies
    let (mid_rate, mid_rate_hz) =
        decimate_to_rate(&filtered, ctx.sample_rate, params.mid_rate_hz);
    let (low_rate, low_rate_hz) =
        decimate_to_rate(&filtered, ctx.sample_rate, params.low_rate_hz);

    // Step 7: mel spectrogram (diagnostic + novelty grounding)
    let nyquist = ctx.sample_rate as f32 / 2.0;
    let mel = mel::mel_spectrogram(
        &normalized,
        ctx.sample_rate,
        params.mel_bands,
        20.0,
        5000.0f32.min(nyquist),
        params.stft_size,
        params.stft_hop,
    );

    // Step 8: novelty curve
    let novelty = novelty::novelty_curve(
        &normalized,
        ctx.sample_rate,
        params.novelty_mel_bands,
        params.novelty_log_compression,
        params.stft_size,
        params.stft_hop,
    );

    // Step 9: tempogram, only when the novelty curve exists
    let tempogram = if novelty.values.is_empty() {
        None
    } else {
        let tg = tempogram::compute_tempogram(
            &novelty.values,
            novelty.feature_rate,
            params.tempogram_window_secs,
            params.tempogram_hop_secs,
            params.tempogram_min_bpm,
            params.tempogram_max_bpm,
            params.tempogram_bins,
        );
        if tg.is_empty() {
            None
        } else {
            Some(tg)
        }
    };

    PreprocessedSignal {
        sample_rate: ctx.sample_rate,
        normalized,
        filtered,
        mid_rate,
        mid_rate_hz,
        low_rate,
        low_rate_hz,
        envelope,
        mel,
        novelty,
        tempogram,
        noise_floor,
    }
}
