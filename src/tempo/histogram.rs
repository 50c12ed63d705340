//! Interval histogram with harmonic-aware selection
//!
//! Buckets raw beat intervals, boosts longer (slower) fundamentals, and
//! suppresses buckets that sit at integer/fractional multiples of a stronger
//! bucket. The boost and suppression exist for the same empirical reason:
//! faster harmonics are statistically more common false positives than slower
//! ones, so when competing buckets have comparable raw support the longer
//! interval is the better bet.

use crate::signal::stats::EPSILON;
use crate::tempo::harmonics::MAX_OCTAVE_STEPS;

use super::{HistogramSelection, TempoCandidate};

/// Default bucket width in milliseconds
pub const DEFAULT_BIN_MS: f32 = 20.0;

/// Default minimum share of total score a bucket needs to suppress harmonics
pub const DEFAULT_MIN_SHARE: f32 = 0.25;

/// Default multiplier applied to suppressed harmonic buckets
pub const DEFAULT_SUPPRESSION_FACTOR: f32 = 0.12;

/// Interval ratios treated as harmonic relations between buckets
const HARMONIC_BUCKET_RATIOS: [f32; 3] = [1.5, 2.0, 3.0];

#[derive(Debug, Clone)]
struct Bucket {
    /// Weighted mean interval of accumulated members, in milliseconds
    interval_ms: f32,
    /// Accumulated weight
    score: f32,
    /// Number of raw intervals accumulated
    supporters: usize,
    /// Marked by `suppress_shorter_harmonics`
    suppressed: bool,
}

/// Harmonic-aware interval histogram
///
/// Usage: `accumulate` each interval, then `apply_length_boost`,
/// `suppress_shorter_harmonics`, and `select`.
#[derive(Debug, Clone)]
pub struct IntervalHistogram {
    buckets: Vec<Bucket>,
    bin_ms: f32,
    min_interval_ms: f32,
    max_interval_ms: f32,
    longest_interval_ms: f32,
}

impl IntervalHistogram {
    /// Create a histogram covering the interval range implied by a BPM range
    pub fn for_bpm_range(min_bpm: f32, max_bpm: f32) -> Self {
        Self::with_bin(min_bpm, max_bpm, DEFAULT_BIN_MS)
    }

    /// Create a histogram with an explicit bucket width
    pub fn with_bin(min_bpm: f32, max_bpm: f32, bin_ms: f32) -> Self {
        // BPM range maps inversely onto interval range
        let min_interval_ms = 60_000.0 / max_bpm.max(1.0);
        let max_interval_ms = 60_000.0 / min_bpm.max(1.0);
        Self {
            buckets: Vec::new(),
            bin_ms: bin_ms.max(1.0),
            min_interval_ms,
            max_interval_ms,
            longest_interval_ms: 0.0,
        }
    }

    /// Accumulate one raw interval
    ///
    /// The interval is normalized into the target range by repeated doubling
    /// or halving (bounded at [`MAX_OCTAVE_STEPS`] iterations); intervals that
    /// cannot be normalized are dropped. The weight lands in the 20 ms bucket
    /// containing the normalized interval.
    pub fn accumulate(&mut self, interval_ms: f32, weight: f32, supporters: usize) {
        if !(interval_ms.is_finite() && interval_ms > 0.0) || !(weight > 0.0) {
            return;
        }

        let mut interval = interval_ms;
        let mut steps = 0u32;
        while interval < self.min_interval_ms && steps < MAX_OCTAVE_STEPS {
            interval *= 2.0;
            steps += 1;
        }
        while interval > self.max_interval_ms && steps < MAX_OCTAVE_STEPS {
            interval /= 2.0;
            steps += 1;
        }
        if interval < self.min_interval_ms || interval > self.max_interval_ms {
            return;
        }

        self.longest_interval_ms = self.longest_interval_ms.max(interval);

        // Find or create the bucket whose center is within half a bin
        let half_bin = self.bin_ms / 2.0;
        if let Some(bucket) = self
            .buckets
            .iter_mut()
            .find(|b| (b.interval_ms - interval).abs() <= half_bin)
        {
            // Weighted running mean keeps the bucket centered on its members
            let total = bucket.score + weight;
            bucket.interval_ms =
                (bucket.interval_ms * bucket.score + interval * weight) / total;
            bucket.score = total;
            bucket.supporters += supporters.max(1);
        } else {
            self.buckets.push(Bucket {
                interval_ms: interval,
                score: weight,
                supporters: supporters.max(1),
                suppressed: false,
            });
        }
    }

    /// Boost longer intervals: `score *= clamp(interval/longest, 0.3, 1.0)^3`
    ///
    /// With comparable raw support, this actively prefers the slower
    /// fundamental over its faster harmonics.
    pub fn apply_length_boost(&mut self) {
        if self.longest_interval_ms <= EPSILON {
            return;
        }
        for bucket in &mut self.buckets {
            let ratio = (bucket.interval_ms / self.longest_interval_ms).clamp(0.3, 1.0);
            bucket.score *= ratio * ratio * ratio;
        }
    }

    /// Suppress buckets that are harmonics of a sufficiently strong bucket
    ///
    /// For every bucket pair whose interval ratio is ~1.5, ~2.0 or ~3.0, if
    /// the longer bucket holds at least `min_share` of the total score, the
    /// shorter bucket's score is multiplied by `suppression_factor` and the
    /// bucket is marked suppressed.
    pub fn suppress_shorter_harmonics(&mut self, min_share: f32, suppression_factor: f32) {
        let total: f32 = self.buckets.iter().map(|b| b.score).sum();
        if total <= EPSILON || self.buckets.len() < 2 {
            return;
        }

        let snapshot: Vec<(f32, f32)> = self
            .buckets
            .iter()
            .map(|b| (b.interval_ms, b.score))
            .collect();

        for bucket in &mut self.buckets {
            if bucket.suppressed {
                continue;
            }
            for &(longer_interval, longer_score) in &snapshot {
                if longer_interval <= bucket.interval_ms {
                    continue;
                }
                if longer_score / total < min_share {
                    continue;
                }
                let ratio = longer_interval / bucket.interval_ms;
                let is_harmonic = HARMONIC_BUCKET_RATIOS
                    .iter()
                    .any(|&h| (ratio - h).abs() < 0.1 * h);
                if is_harmonic {
                    log::debug!(
                        "Suppressing harmonic bucket {:.0} ms (ratio {:.2} of {:.0} ms)",
                        bucket.interval_ms,
                        ratio,
                        longer_interval
                    );
                    bucket.score *= suppression_factor;
                    bucket.suppressed = true;
                    break;
                }
            }
        }
    }

    /// Select the winning bucket
    ///
    /// Picks the highest-score non-suppressed bucket. With `prefer_longer`,
    /// a longer bucket (interval ratio >= 1.45x) whose score reaches 55% of
    /// the top score wins instead: when in doubt, pick the slower tempo,
    /// because fast detectors over-trigger on subdivisions.
    ///
    /// Returns `None` when the histogram is empty.
    pub fn select(&self, prefer_longer: bool) -> Option<HistogramSelection> {
        let candidates: Vec<&Bucket> = {
            let unsuppressed: Vec<&Bucket> =
                self.buckets.iter().filter(|b| !b.suppressed).collect();
            if unsuppressed.is_empty() {
                self.buckets.iter().collect()
            } else {
                unsuppressed
            }
        };

        let top = candidates.iter().copied().max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

        let mut winner = top;
        if prefer_longer {
            for bucket in &candidates {
                if bucket.interval_ms / top.interval_ms >= 1.45
                    && bucket.score >= 0.55 * top.score
                    && bucket.interval_ms > winner.interval_ms
                {
                    winner = bucket;
                }
            }
            if !std::ptr::eq(winner, top) {
                log::debug!(
                    "Preferring longer interval {:.0} ms over {:.0} ms ({}% of top score)",
                    winner.interval_ms,
                    top.interval_ms,
                    (100.0 * winner.score / top.score.max(EPSILON)) as i32
                );
            }
        }

        let total_score: f32 = self.buckets.iter().map(|b| b.score).sum();
        let suppressed_bpms: Vec<f32> = self
            .buckets
            .iter()
            .filter(|b| b.suppressed)
            .map(|b| 60_000.0 / b.interval_ms)
            .collect();

        Some(HistogramSelection {
            interval_ms: winner.interval_ms,
            bpm: 60_000.0 / winner.interval_ms,
            score: winner.score,
            total_score,
            supporters: winner.supporters,
            suppressed_bpms,
        })
    }

    /// Export buckets as weighted tempo candidates for generic refinement
    pub fn to_tempo_candidates(&self) -> Vec<TempoCandidate> {
        self.buckets
            .iter()
            .filter(|b| b.score > EPSILON)
            .map(|b| TempoCandidate {
                bpm: 60_000.0 / b.interval_ms,
                weight: b.score,
                source: Some("interval_histogram"),
                allow_harmonics: true,
            })
            .collect()
    }

    /// Number of populated buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when nothing has been accumulated
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
