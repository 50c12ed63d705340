//! Dynamic-programming beat tracker
//!
//! Instead of asking "what period repeats", this detector places an explicit
//! beat sequence on the onset envelope and reads the tempo off the resulting
//! inter-beat gaps. A forward pass scores every (frame, tempo) state as the
//! local onset strength plus the best predecessor one beat period earlier,
//! with a penalty for changing period between beats; backtracking from the
//! best terminal state yields the beat positions.
//!
//! Cost is O(frames x grid^2), bounded by tail-windowing the envelope and a
//! coarse 2 BPM tempo grid.

use crate::config::DetectionContext;
use crate::preprocessing::PreprocessedSignal;
use crate::signal::stats::{mean, trimmed_mean, EPSILON};
use crate::tempo::harmonics::coerce_to_range;

use super::{meta, AlgorithmId, BpmReading, Detector};

/// Tempo grid step in BPM
const GRID_STEP_BPM: f32 = 2.0;

/// Penalty per envelope frame of period change between consecutive beats
const TRANSITION_PENALTY: f32 = 0.6;

/// Envelope tail window bound, in frames (~12 s at the 100 Hz envelope rate)
const MAX_FRAMES: usize = 1200;

/// Trim fraction for the inter-beat interval mean
const INTERVAL_TRIM: f32 = 0.1;

/// Beat onset-coverage ratio mapped to full confidence
const FULL_CONFIDENCE_COVERAGE: f32 = 4.0;

/// DP beat tracking detector over the onset envelope
#[derive(Debug, Clone, Default)]
pub struct BeatTrackerDetector;

struct TrackedBeats {
    /// Beat positions as envelope frame indices, ascending
    frames: Vec<usize>,
}

impl BeatTrackerDetector {
    /// Forward DP over (frame, tempo) states, then backtrack the beat chain
    fn track(onsets: &[f32], periods: &[usize]) -> Option<TrackedBeats> {
        let n_frames = onsets.len();
        let n_tempi = periods.len();
        if n_frames == 0 || n_tempi == 0 {
            return None;
        }

        let mut score = vec![vec![0.0f32; n_tempi]; n_frames];
        let mut parent = vec![vec![usize::MAX; n_tempi]; n_frames];

        for t in 0..n_frames {
            for (ti, &period) in periods.iter().enumerate() {
                let local = onsets[t];
                if t < period {
                    score[t][ti] = local;
                    continue;
                }
                let prev_t = t - period;
                let mut best = f32::NEG_INFINITY;
                let mut best_prev = usize::MAX;
                for (pi, &prev_period) in periods.iter().enumerate() {
                    let penalty = TRANSITION_PENALTY
                        * (period as f32 - prev_period as f32).abs();
                    let candidate = score[prev_t][pi] - penalty;
                    if candidate > best {
                        best = candidate;
                        best_prev = pi;
                    }
                }
                score[t][ti] = local + best;
                parent[t][ti] = best_prev;
            }
        }

        // Best terminal state within the last beat period of the envelope
        let longest_period = *periods.iter().max()?;
        let tail_start = n_frames.saturating_sub(longest_period);
        let mut best_state: Option<(usize, usize)> = None;
        let mut best_score = f32::NEG_INFINITY;
        for t in tail_start..n_frames {
            for ti in 0..n_tempi {
                if score[t][ti] > best_score {
                    best_score = score[t][ti];
                    best_state = Some((t, ti));
                }
            }
        }

        let (mut t, mut ti) = best_state?;
        let mut beats = vec![t];
        while t >= periods[ti] && parent[t][ti] != usize::MAX {
            let prev_ti = parent[t][ti];
            t -= periods[ti];
            ti = prev_ti;
            beats.push(t);
        }
        beats.reverse();
        Some(TrackedBeats { frames: beats })
    }
}

impl Detector for BeatTrackerDetector {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::BeatTracker
    }

    fn analyze(
        &self,
        signal: &PreprocessedSignal,
        ctx: &DetectionContext,
    ) -> Option<BpmReading> {
        let feature_rate = signal.envelope.feature_rate;
        if feature_rate <= EPSILON
            || (signal.envelope.values.len() as f32) < feature_rate
        {
            return None;
        }

        let values = &signal.envelope.values;
        if values.iter().cloned().fold(0.0f32, f32::max) <= EPSILON {
            return None;
        }
        let onsets: &[f32] = if values.len() > MAX_FRAMES {
            &values[values.len() - MAX_FRAMES..]
        } else {
            values
        };

        // Tempo grid as beat periods in envelope frames; dedupe since coarse
        // BPM steps can collapse onto the same frame count
        let mut periods: Vec<usize> = Vec::new();
        let mut bpm = ctx.min_bpm;
        while bpm <= ctx.max_bpm {
            let period = (feature_rate * 60.0 / bpm).round() as usize;
            if period >= 2 && period < onsets.len() && periods.last() != Some(&period) {
                periods.push(period);
            }
            bpm += GRID_STEP_BPM;
        }
        if periods.len() < 2 {
            return None;
        }

        let beats = Self::track(onsets, &periods)?;
        if beats.frames.len() < 3 {
            return None;
        }

        let intervals_secs: Vec<f32> = beats
            .frames
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) as f32 / feature_rate)
            .collect();
        let mean_interval = trimmed_mean(&intervals_secs, INTERVAL_TRIM);
        if mean_interval <= EPSILON {
            return None;
        }

        let raw_bpm = 60.0 / mean_interval;
        let coerced = coerce_to_range(raw_bpm, ctx.min_bpm, ctx.max_bpm);

        // Coverage: onset energy under the beats vs the envelope average
        let beat_mean =
            beats.frames.iter().map(|&f| onsets[f]).sum::<f32>() / beats.frames.len() as f32;
        let envelope_mean = mean(onsets);
        let coverage = beat_mean / (envelope_mean + EPSILON);
        let coverage_factor = (coverage / FULL_CONFIDENCE_COVERAGE).clamp(0.0, 1.0);

        // Regularity: coefficient of variation of the inter-beat gaps
        let interval_std = {
            let m = mean(&intervals_secs);
            (intervals_secs.iter().map(|&x| (x - m) * (x - m)).sum::<f32>()
                / intervals_secs.len() as f32)
                .sqrt()
        };
        let cv = interval_std / mean_interval;
        let regularity = (1.0 - 2.0 * cv).clamp(0.0, 1.0);

        let mut confidence = coverage_factor * regularity;
        if coerced.clamped {
            confidence *= 0.5;
        }

        log::debug!(
            "Beat tracker: {:.1} BPM from {} beats (coverage={:.2}, cv={:.3})",
            coerced.bpm,
            beats.frames.len(),
            coverage,
            cv
        );

        Some(
            BpmReading::new(self.id(), coerced.bpm, confidence)
                .with_meta("beats", beats.frames.len() as f64)
                .with_meta("coverage", coverage as f64)
                .with_meta("interval_cv", cv as f64)
                .with_meta(meta::CONSISTENCY, regularity as f64)
                .with_meta(meta::CLAMPED, if coerced.clamped { 1.0 } else { 0.0 }),
        )
    }
}
