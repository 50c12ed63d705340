//! Integer-factor decimation
//!
//! Simple decimation is sufficient here: the decimated copies feed
//! periodicity estimators that key off beat-rate energy fluctuations, far
//! below any aliased content.

/// Decimate a signal by an integer factor
///
/// Returns every `factor`-th sample. A factor of 0 or 1 returns a copy.
pub fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return samples.to_vec();
    }
    samples.iter().step_by(factor).copied().collect()
}

/// Decimate toward a target rate, returning the samples and the actual rate
///
/// The factor is `source_rate / target_rate` rounded down (minimum 1), so the
/// achieved rate can differ from the request; callers must use the returned
/// rate for any time/frequency conversion.
pub fn decimate_to_rate(samples: &[f32], source_rate: u32, target_rate: u32) -> (Vec<f32>, u32) {
    if target_rate == 0 || source_rate == 0 || target_rate >= source_rate {
        return (samples.to_vec(), source_rate);
    }
    let factor = (source_rate / target_rate).max(1) as usize;
    let actual_rate = source_rate / factor as u32;
    (decimate(samples, factor), actual_rate)
}
