//! Basic statistics and normalization helpers

/// Numerical stability epsilon
pub const EPSILON: f32 = 1e-10;

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f32>() / samples.len() as f32
}

/// Population variance; 0.0 for an empty slice
pub fn variance(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let m = mean(samples);
    samples.iter().map(|&x| (x - m) * (x - m)).sum::<f32>() / samples.len() as f32
}

/// Root-mean-square level; 0.0 for an empty slice
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Subtract the mean in place
pub fn remove_mean(samples: &mut [f32]) {
    let m = mean(samples);
    for x in samples {
        *x -= m;
    }
}

/// Scale in place so the absolute peak is 1.0
///
/// Degenerate (all-zero) input is left unchanged.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if peak > EPSILON {
        let inv = 1.0 / peak;
        for x in samples {
            *x *= inv;
        }
    }
}

/// Normalize a non-negative curve in place to [0, 1] by dividing by its maximum
pub fn normalize_max(curve: &mut [f32]) {
    let max_val = curve.iter().copied().fold(0.0f32, f32::max);
    if max_val > EPSILON {
        for v in curve {
            *v /= max_val;
        }
    }
}

/// Simple centered moving-average smoothing
pub fn moving_average(x: &[f32], window: usize) -> Vec<f32> {
    if x.is_empty() || window <= 1 {
        return x.to_vec();
    }
    let half = window / 2;
    let mut out = vec![0.0f32; x.len()];
    for i in 0..x.len() {
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(x.len());
        let sum: f32 = x[start..end].iter().sum();
        out[i] = sum / (end - start) as f32;
    }
    out
}

/// Mean with a fraction trimmed from both ends
///
/// Used for robust inter-beat interval averaging: a 10% trim drops the
/// occasional skipped or doubled beat before the mean is taken.
pub fn trimmed_mean(values: &[f32], trim_fraction: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let trim = ((sorted.len() as f32) * trim_fraction.clamp(0.0, 0.45)).floor() as usize;
    let slice = &sorted[trim..sorted.len() - trim];
    if slice.is_empty() {
        return mean(&sorted);
    }
    mean(slice)
}

/// Median of a slice; 0.0 for an empty slice
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
