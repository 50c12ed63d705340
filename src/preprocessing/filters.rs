//! Rhythm-band filtering
//!
//! Cascaded single-pole RC-style recursive filters: a 20 Hz high-pass removes
//! rumble and DC drift, a 1500 Hz low-pass removes non-rhythmic high
//! harmonics. Standard digital approximations:
//! high-pass `alpha = RC/(RC+dt)`, low-pass `alpha = dt/(RC+dt)`.

/// Single-pole high-pass filter
///
/// `y[i] = alpha * (y[i-1] + x[i] - x[i-1])` with `alpha = RC/(RC+dt)`.
pub fn highpass(samples: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 || cutoff_hz <= 0.0 {
        return samples.to_vec();
    }

    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    out.push(samples[0]);
    for i in 1..samples.len() {
        let y = alpha * (out[i - 1] + samples[i] - samples[i - 1]);
        out.push(y);
    }
    out
}

/// Single-pole low-pass filter
///
/// `y[i] = y[i-1] + alpha * (x[i] - y[i-1])` with `alpha = dt/(RC+dt)`.
pub fn lowpass(samples: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 || cutoff_hz <= 0.0 {
        return samples.to_vec();
    }

    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let alpha = dt / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    out.push(samples[0] * alpha);
    for i in 1..samples.len() {
        let y = out[i - 1] + alpha * (samples[i] - out[i - 1]);
        out.push(y);
    }
    out
}

/// Bandpass via cascaded high-pass then low-pass
pub fn bandpass(samples: &[f32], low_hz: f32, high_hz: f32, sample_rate: u32) -> Vec<f32> {
    let hp = highpass(samples, low_hz, sample_rate);
    lowpass(&hp, high_hz, sample_rate)
}
