//! Consensus fusion engine
//!
//! Fuses per-detector readings into one stable tempo estimate. Strictly
//! sequential per session: `combine` is called once per analysis cycle and
//! carries rolling state (per-algorithm histories, the smoothed output, a
//! stability counter) across cycles.
//!
//! # Algorithm
//!
//! 1. Harmonically normalize every reading against the running reference
//!    (the smoothed output, or the incoming median on the first cycle)
//! 2. Reject readings that deviate from their own algorithm's rolling median
//! 3. Greedily cluster the survivors, requiring two members for a valid
//!    cluster (a lone detector still wins, at reduced confidence)
//! 4. Select the cluster with the highest total trust weight, breaking near
//!    ties toward the current smoothed output
//! 5. Smooth adaptively: tighter once the estimate has been stable for a few
//!    cycles, looser right after a jump
//! 6. Blend a multi-factor confidence score
//!
//! When a cycle yields no usable readings the engine emits the previous
//! smoothed value at reduced confidence; `None` appears only before the first
//! consensus is established.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::{ConsensusParams, DetectionContext};
use crate::detectors::{meta, AlgorithmId, BpmReading};
use crate::signal::stats::{median, EPSILON};
use crate::tempo::harmonics::{coerce_to_range, normalize_to_reference};

/// Penalty applied when consensus rests on a single detector
const SINGLETON_PENALTY: f32 = 0.6;

/// Relative score margin treated as a tie during cluster selection
const TIE_MARGIN: f32 = 0.1;

/// Smoothing factor cap right after a tempo jump
const JUMP_SMOOTHING_CAP: f32 = 0.6;

/// One fused tempo estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Smoothed consensus tempo in BPM
    pub bpm: f32,
    /// Fused confidence in [0, 1]
    pub confidence: f32,
    /// Pre-smoothing cluster tempo for this cycle
    pub raw_bpm: f32,
    /// Number of readings in the winning cluster (0 on stale fallback)
    pub cluster_size: usize,
    /// Trust weight per contributing algorithm
    pub weights: BTreeMap<AlgorithmId, f32>,
}

#[derive(Debug, Clone)]
struct NormalizedReading {
    algorithm: AlgorithmId,
    bpm: f32,
    trust: f32,
    consistency: f32,
    harmonic_deviation: f32,
}

/// Sequential consensus engine
#[derive(Debug)]
pub struct ConsensusEngine {
    params: ConsensusParams,
    /// Accepted normalized BPMs per algorithm, bounded by `history_depth`
    history: BTreeMap<AlgorithmId, VecDeque<f32>>,
    /// Decaying count of recent octave corrections per algorithm
    octave_corrections: BTreeMap<AlgorithmId, f32>,
    /// Recent raw consensus outputs, bounded by `output_history_depth`
    outputs: VecDeque<f32>,
    smoothed: Option<f32>,
    stable_cycles: u32,
}

impl ConsensusEngine {
    /// Create an engine with the given tuning parameters
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            params,
            history: BTreeMap::new(),
            octave_corrections: BTreeMap::new(),
            outputs: VecDeque::new(),
            smoothed: None,
            stable_cycles: 0,
        }
    }

    /// Drop all rolling state, as if freshly constructed
    pub fn reset(&mut self) {
        self.history.clear();
        self.octave_corrections.clear();
        self.outputs.clear();
        self.smoothed = None;
        self.stable_cycles = 0;
    }

    /// Current smoothed estimate, if any consensus has been established
    pub fn current_bpm(&self) -> Option<f32> {
        self.smoothed
    }

    /// Fuse one cycle of detector readings
    ///
    /// Readings that get harmonically folded against the reference are tagged
    /// with [`meta::OCTAVE_RATIO`] in place, so downstream listeners can see
    /// the applied correction.
    ///
    /// Returns `None` only when no consensus has ever been established and
    /// this cycle provides no usable readings either.
    pub fn combine(
        &mut self,
        readings: &mut [BpmReading],
        ctx: &DetectionContext,
    ) -> Option<ConsensusResult> {
        // Octave-correction counters decay every cycle regardless of outcome
        for value in self.octave_corrections.values_mut() {
            *value *= 0.5;
        }

        let usable: Vec<usize> = readings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.bpm.is_finite() && r.bpm > 0.0 && r.confidence > 0.0)
            .map(|(i, _)| i)
            .collect();
        if usable.is_empty() {
            return self.stale_fallback();
        }

        // Step 1: harmonic normalization against the running reference.
        // When a majority of readings would need folding, the reference (not
        // the detectors) is the likely culprit, e.g. right after a genuine
        // tempo change; folding is skipped for that cycle.
        let reference = self.smoothed.unwrap_or_else(|| {
            let bpms: Vec<f32> = usable.iter().map(|&i| readings[i].bpm).collect();
            median(&bpms)
        });
        let folds: Vec<(f32, f32)> = usable
            .iter()
            .map(|&i| {
                normalize_to_reference(readings[i].bpm, reference, ctx.min_bpm, ctx.max_bpm)
            })
            .collect();
        let folded_count = folds
            .iter()
            .filter(|(ratio, _)| (ratio - 1.0).abs() > 1e-3)
            .count();
        let distrust_reference = folded_count * 2 > usable.len();
        if distrust_reference {
            log::debug!(
                "Consensus: {}/{} readings disagree with reference {:.1}, skipping folds",
                folded_count,
                usable.len(),
                reference
            );
        }

        let mut normalized: Vec<NormalizedReading> = Vec::with_capacity(usable.len());
        for (&index, &(fold_ratio, folded_bpm)) in usable.iter().zip(folds.iter()) {
            let reading = &mut readings[index];
            let (ratio, bpm) = if distrust_reference {
                let coerced = coerce_to_range(reading.bpm, ctx.min_bpm, ctx.max_bpm);
                (coerced.multiplier, coerced.bpm)
            } else {
                (fold_ratio, folded_bpm)
            };
            let harmonic_deviation = ratio.max(1.0 / ratio.max(EPSILON)) - 1.0;
            if harmonic_deviation > EPSILON {
                *self
                    .octave_corrections
                    .entry(reading.algorithm)
                    .or_insert(0.0) += 1.0;
                reading
                    .metadata
                    .insert(meta::OCTAVE_RATIO.to_string(), f64::from(ratio));
                log::debug!(
                    "Consensus: {} reading {:.1} folded x{:.3} to {:.1}",
                    reading.algorithm.name(),
                    reading.bpm,
                    ratio,
                    bpm
                );
            }
            let consistency = reading.meta_or(meta::CONSISTENCY, 0.5) as f32;
            let corrections = self
                .octave_corrections
                .get(&reading.algorithm)
                .copied()
                .unwrap_or(0.0);
            let trust = reading.confidence
                * (0.5 + 0.5 * consistency)
                * (1.0 / (1.0 + harmonic_deviation))
                * (1.0 / (1.0 + 0.25 * corrections));
            normalized.push(NormalizedReading {
                algorithm: reading.algorithm,
                bpm,
                trust: trust.max(0.0),
                consistency,
                harmonic_deviation,
            });
        }

        // Step 2: per-algorithm outlier rejection against the rolling median.
        // The rejected value still enters the history so a real tempo change
        // re-converges within a few cycles.
        let mut survivors: Vec<NormalizedReading> = Vec::with_capacity(normalized.len());
        for reading in normalized {
            let entry = self.history.entry(reading.algorithm).or_default();
            let rejected = if entry.len() >= 3 {
                let history: Vec<f32> = entry.iter().copied().collect();
                let own_median = median(&history);
                (reading.bpm - own_median).abs() > self.params.outlier_threshold_bpm
            } else {
                false
            };
            entry.push_back(reading.bpm);
            while entry.len() > self.params.history_depth {
                entry.pop_front();
            }
            if rejected {
                log::debug!(
                    "Consensus: rejecting {} outlier at {:.1} BPM",
                    reading.algorithm.name(),
                    reading.bpm
                );
            } else {
                survivors.push(reading);
            }
        }
        if survivors.is_empty() {
            return self.stale_fallback();
        }

        // Steps 3-4: greedy clustering and trust-weighted selection
        let (cluster, total_trust) = self.select_cluster(&survivors)?;
        let singleton = cluster.len() < 2;

        let cluster_trust: f32 = cluster.iter().map(|r| r.trust).sum();
        let raw_bpm = cluster
            .iter()
            .map(|r| r.bpm * r.trust)
            .sum::<f32>()
            / cluster_trust.max(EPSILON);

        // Step 5: adaptive exponential smoothing
        let previous = self.smoothed;
        let smoothed = match previous {
            None => raw_bpm,
            Some(prev) => {
                let deviation = (raw_bpm - prev).abs();
                if deviation <= self.params.stability_deviation_bpm {
                    self.stable_cycles += 1;
                } else {
                    self.stable_cycles = 0;
                }
                let alpha = if deviation > 4.0 * self.params.stability_deviation_bpm {
                    // A jump: follow faster, but never snap
                    (self.params.smoothing_factor * 1.5).min(JUMP_SMOOTHING_CAP)
                } else if self.stable_cycles >= self.params.stability_cycles {
                    self.params.stable_smoothing_factor
                } else {
                    self.params.smoothing_factor
                };
                prev + alpha * (raw_bpm - prev)
            }
        };
        self.smoothed = Some(smoothed);

        self.outputs.push_back(raw_bpm);
        while self.outputs.len() > self.params.output_history_depth {
            self.outputs.pop_front();
        }

        // Step 6: multi-factor confidence
        let mut confidence =
            self.blend_confidence(&cluster, cluster_trust, total_trust, raw_bpm, smoothed);
        if singleton {
            confidence *= SINGLETON_PENALTY;
        }

        let mut weights = BTreeMap::new();
        for reading in &cluster {
            *weights.entry(reading.algorithm).or_insert(0.0) += reading.trust;
        }

        log::debug!(
            "Consensus: {:.1} BPM (raw {:.1}, {} members, confidence {:.2})",
            smoothed,
            raw_bpm,
            cluster.len(),
            confidence
        );

        Some(ConsensusResult {
            bpm: smoothed,
            confidence: confidence.clamp(0.0, 1.0),
            raw_bpm,
            cluster_size: cluster.len(),
            weights,
        })
    }

    /// Greedy clustering, then selection by total trust with a continuity
    /// tie-break toward the current smoothed output
    ///
    /// # Returns
    ///
    /// `(winning cluster, total trust across all clusters)`
    fn select_cluster(
        &self,
        survivors: &[NormalizedReading],
    ) -> Option<(Vec<NormalizedReading>, f32)> {
        let mut order: Vec<usize> = (0..survivors.len()).collect();
        order.sort_by(|&a, &b| {
            survivors[b]
                .trust
                .partial_cmp(&survivors[a].trust)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let tol = self.params.cluster_tolerance_bpm.max(0.5);
        let mut assigned = vec![false; survivors.len()];
        let mut clusters: Vec<(Vec<usize>, f32)> = Vec::new();
        for &anchor in &order {
            if assigned[anchor] {
                continue;
            }
            let anchor_bpm = survivors[anchor].bpm;
            let members: Vec<usize> = (0..survivors.len())
                .filter(|&i| !assigned[i] && (survivors[i].bpm - anchor_bpm).abs() <= tol)
                .collect();
            for &i in &members {
                assigned[i] = true;
            }
            let trust: f32 = members.iter().map(|&i| survivors[i].trust).sum();
            clusters.push((members, trust));
        }

        let total_trust: f32 = clusters.iter().map(|(_, t)| t).sum();

        // Multi-member clusters outrank singletons at any trust level
        clusters.sort_by(|a, b| {
            let a_key = (a.0.len() >= 2, a.1);
            let b_key = (b.0.len() >= 2, b.1);
            b_key
                .partial_cmp(&a_key)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut winner = 0usize;
        if let Some(reference) = self.smoothed {
            let top_trust = clusters[0].1;
            for (i, (members, trust)) in clusters.iter().enumerate().skip(1) {
                if (members.len() >= 2) == (clusters[0].0.len() >= 2)
                    && *trust >= (1.0 - TIE_MARGIN) * top_trust
                {
                    let mean = |idx: &[usize]| {
                        idx.iter().map(|&j| survivors[j].bpm).sum::<f32>() / idx.len() as f32
                    };
                    if (mean(members) - reference).abs() < (mean(&clusters[winner].0) - reference).abs()
                    {
                        winner = i;
                    }
                }
            }
        }

        let cluster: Vec<NormalizedReading> = clusters
            .get(winner)?
            .0
            .iter()
            .map(|&i| survivors[i].clone())
            .collect();
        if cluster.is_empty() {
            return None;
        }
        Some((cluster, total_trust))
    }

    /// Fixed-weight confidence blend
    fn blend_confidence(
        &self,
        cluster: &[NormalizedReading],
        cluster_trust: f32,
        total_trust: f32,
        raw_bpm: f32,
        smoothed: f32,
    ) -> f32 {
        let tol = self.params.cluster_tolerance_bpm.max(0.5);

        let majority = (cluster_trust / total_trust.max(EPSILON)).clamp(0.0, 1.0);

        let spread = {
            let var = cluster
                .iter()
                .map(|r| {
                    let d = r.bpm - raw_bpm;
                    d * d * r.trust
                })
                .sum::<f32>()
                / cluster_trust.max(EPSILON);
            var.sqrt()
        };
        let spread_factor = (1.0 - spread / tol).clamp(0.0, 1.0);

        let avg_consistency = cluster
            .iter()
            .map(|r| r.consistency * r.trust)
            .sum::<f32>()
            / cluster_trust.max(EPSILON);

        let harmonic_factor = cluster
            .iter()
            .map(|r| 1.0 / (1.0 + r.harmonic_deviation))
            .sum::<f32>()
            / cluster.len() as f32;

        let stability = if self.outputs.len() >= 2 {
            let values: Vec<f32> = self.outputs.iter().copied().collect();
            let m = values.iter().sum::<f32>() / values.len() as f32;
            let std = (values.iter().map(|&x| (x - m) * (x - m)).sum::<f32>()
                / values.len() as f32)
                .sqrt();
            (1.0 - std / 5.0).clamp(0.0, 1.0)
        } else {
            0.5
        };

        let drift_span = 4.0 * self.params.stability_deviation_bpm;
        let drift = (1.0 - (raw_bpm - smoothed).abs() / drift_span).clamp(0.0, 1.0);

        0.25 * majority
            + 0.15 * spread_factor
            + 0.15 * avg_consistency.clamp(0.0, 1.0)
            + 0.10 * harmonic_factor.clamp(0.0, 1.0)
            + 0.20 * stability
            + 0.15 * drift
    }

    /// Emit the previous smoothed value at reduced, stability-derived
    /// confidence; `None` before any consensus exists
    fn stale_fallback(&mut self) -> Option<ConsensusResult> {
        let bpm = self.smoothed?;
        let confidence = (0.1 + 0.05 * self.stable_cycles as f32).clamp(0.1, 0.4);
        log::debug!(
            "Consensus: no usable readings, holding {:.1} BPM at {:.2}",
            bpm,
            confidence
        );
        Some(ConsensusResult {
            bpm,
            confidence,
            raw_bpm: bpm,
            cluster_size: 0,
            weights: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DetectionContext {
        DetectionContext::with_defaults(44100).unwrap()
    }

    fn reading(algorithm: AlgorithmId, bpm: f32, confidence: f32) -> BpmReading {
        BpmReading::new(algorithm, bpm, confidence).with_meta(meta::CONSISTENCY, 0.8)
    }

    fn four_at(bpm: f32) -> Vec<BpmReading> {
        vec![
            reading(AlgorithmId::EnergyOnset, bpm, 0.8),
            reading(AlgorithmId::Autocorrelation, bpm + 0.5, 0.7),
            reading(AlgorithmId::SpectralFft, bpm - 0.5, 0.7),
            reading(AlgorithmId::WaveletEnergy, bpm + 1.0, 0.6),
        ]
    }

    #[test]
    fn test_majority_beats_outlier() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        let mut readings = vec![
            reading(AlgorithmId::EnergyOnset, 155.0, 0.8),
            reading(AlgorithmId::Autocorrelation, 155.5, 0.7),
            reading(AlgorithmId::SpectralFft, 154.5, 0.7),
            reading(AlgorithmId::WaveletEnergy, 50.0, 0.9),
        ];
        let result = engine.combine(&mut readings, &ctx()).unwrap();
        assert!(
            (result.bpm - 155.0).abs() <= 3.0,
            "expected ~155, got {:.1}",
            result.bpm
        );
        assert!(result.cluster_size >= 3);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn test_none_before_first_consensus() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        assert!(engine.combine(&mut [], &ctx()).is_none());
        assert!(engine.current_bpm().is_none());
    }

    #[test]
    fn test_stale_fallback_after_established() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.combine(&mut four_at(120.0), &ctx()).unwrap();

        let stale = engine.combine(&mut [], &ctx()).unwrap();
        assert!((stale.bpm - 120.0).abs() <= 1.5);
        assert_eq!(stale.cluster_size, 0);
        assert!(stale.confidence <= 0.4);
    }

    #[test]
    fn test_smoothing_bounds_jumps() {
        let params = ConsensusParams::default();
        let max_alpha = 0.6f32;
        let mut engine = ConsensusEngine::new(params);
        let first = engine.combine(&mut four_at(120.0), &ctx()).unwrap();

        let second = engine.combine(&mut four_at(140.0), &ctx()).unwrap();
        let moved = (second.bpm - first.bpm).abs();
        let gap = (second.raw_bpm - first.bpm).abs();
        assert!(
            moved <= max_alpha * gap + 0.01,
            "moved {:.2} of a {:.2} gap",
            moved,
            gap
        );
        assert!(second.bpm > first.bpm);
    }

    #[test]
    fn test_converges_on_sustained_change() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.combine(&mut four_at(100.0), &ctx()).unwrap();
        let mut last = 0.0;
        for _ in 0..20 {
            last = engine.combine(&mut four_at(150.0), &ctx()).unwrap().bpm;
        }
        assert!((last - 150.0).abs() < 2.0, "got {:.1}", last);
    }

    #[test]
    fn test_harmonic_reading_folds_to_reference() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.combine(&mut four_at(150.0), &ctx()).unwrap();

        // One detector flips to the 75 BPM subharmonic; normalization folds
        // it back and consensus barely moves
        let mut readings = vec![
            reading(AlgorithmId::EnergyOnset, 150.0, 0.8),
            reading(AlgorithmId::Autocorrelation, 75.0, 0.7),
            reading(AlgorithmId::SpectralFft, 150.5, 0.7),
        ];
        let result = engine.combine(&mut readings, &ctx()).unwrap();
        assert!(
            (result.bpm - 150.0).abs() <= 3.0,
            "expected ~150, got {:.1}",
            result.bpm
        );
        // The folded reading is tagged with the applied ratio; the others
        // stay untagged
        assert!((readings[1].meta_or(meta::OCTAVE_RATIO, 0.0) - 2.0).abs() < 1e-3);
        assert!(!readings[0].metadata.contains_key(meta::OCTAVE_RATIO));
        assert!(!readings[2].metadata.contains_key(meta::OCTAVE_RATIO));
    }

    #[test]
    fn test_outlier_rejection_uses_own_history() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        for _ in 0..4 {
            engine.combine(&mut four_at(120.0), &ctx()).unwrap();
        }
        // EnergyOnset jumps to 133: no harmonic ratio lands near 120, and it
        // deviates from its own median by more than the threshold
        let mut readings = vec![
            reading(AlgorithmId::EnergyOnset, 133.0, 0.9),
            reading(AlgorithmId::Autocorrelation, 120.0, 0.7),
            reading(AlgorithmId::SpectralFft, 120.5, 0.7),
        ];
        let result = engine.combine(&mut readings, &ctx()).unwrap();
        assert!(
            (result.bpm - 120.0).abs() <= 2.0,
            "expected ~120, got {:.1}",
            result.bpm
        );
    }

    #[test]
    fn test_single_reading_reduced_confidence() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        let full = engine
            .combine(&mut four_at(128.0), &ctx())
            .unwrap()
            .confidence;

        let mut lone_engine = ConsensusEngine::new(ConsensusParams::default());
        let lone = lone_engine
            .combine(&mut [reading(AlgorithmId::EnergyOnset, 128.0, 0.8)], &ctx())
            .unwrap();
        assert!((lone.bpm - 128.0).abs() < 0.5);
        assert_eq!(lone.cluster_size, 1);
        assert!(lone.confidence < full);
    }

    #[test]
    fn test_deterministic() {
        let run = || {
            let mut engine = ConsensusEngine::new(ConsensusParams::default());
            let mut results = Vec::new();
            for bpm in [120.0, 121.0, 119.5, 120.5, 120.0] {
                results.push(engine.combine(&mut four_at(bpm), &ctx()).unwrap().bpm);
            }
            results
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.combine(&mut four_at(120.0), &ctx()).unwrap();
        engine.reset();
        assert!(engine.current_bpm().is_none());
        assert!(engine.combine(&mut [], &ctx()).is_none());
    }

    #[test]
    fn test_confidence_always_in_unit_range() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        for bpm in [60.0, 200.0, 60.0, 200.0, 130.0] {
            let result = engine.combine(&mut four_at(bpm), &ctx()).unwrap();
            assert!(
                (0.0..=1.0).contains(&result.confidence),
                "confidence {} out of range",
                result.confidence
            );
            assert!(result.bpm >= 60.0 && result.bpm <= 200.0);
        }
    }
}
