//! Windowing and framing helpers

/// Generate a Hann window of the given length
pub fn hann_window(size: usize) -> Vec<f32> {
    if size == 0 {
        return Vec::new();
    }
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Apply a window to a frame in place
///
/// The shorter of the two lengths determines how many samples are scaled.
pub fn apply_window(frame: &mut [f32], window: &[f32]) {
    for (x, w) in frame.iter_mut().zip(window.iter()) {
        *x *= w;
    }
}

/// Number of complete frames for the given framing parameters
pub fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> usize {
    if frame_size == 0 || hop_size == 0 || len < frame_size {
        return 0;
    }
    (len - frame_size) / hop_size + 1
}

/// Iterate complete frames as slices
pub fn frames<'a>(
    samples: &'a [f32],
    frame_size: usize,
    hop_size: usize,
) -> impl Iterator<Item = &'a [f32]> + 'a {
    let n = frame_count(samples.len(), frame_size, hop_size);
    (0..n).map(move |i| &samples[i * hop_size..i * hop_size + frame_size])
}

/// Largest power of two less than or equal to `n`; 0 when `n == 0`
pub fn previous_power_of_two(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut p = 1usize;
    while p * 2 <= n {
        p *= 2;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_endpoints() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-6);
        assert!(w[7].abs() < 1e-6);
        // Peak near the middle
        assert!(w[3] > 0.8 || w[4] > 0.8);
    }

    #[test]
    fn test_hann_window_degenerate() {
        assert!(hann_window(0).is_empty());
        assert_eq!(hann_window(1), vec![1.0]);
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(1024, 256, 128), 7);
        assert_eq!(frame_count(100, 256, 128), 0);
        assert_eq!(frame_count(100, 0, 128), 0);
    }

    #[test]
    fn test_frames_iterate() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let collected: Vec<&[f32]> = frames(&samples, 4, 2).collect();
        assert_eq!(collected.len(), 4);
        assert_eq!(collected[0], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(collected[3], &[6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_previous_power_of_two() {
        assert_eq!(previous_power_of_two(0), 0);
        assert_eq!(previous_power_of_two(1), 1);
        assert_eq!(previous_power_of_two(1000), 512);
        assert_eq!(previous_power_of_two(1024), 1024);
    }
}
