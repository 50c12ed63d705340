//! Harmonic ratio handling
//!
//! Detectors routinely lock onto integer or simple-ratio multiples of the
//! true tempo (double, half, 3/2). This module holds the single shared ratio
//! table plus the two operations built on it: coercing an out-of-range BPM
//! back into the requested range, and cluster-based candidate refinement with
//! harmonic expansion.
//!
//! The ratio set mixes octave ratios with musical-interval ratios; it was
//! tuned empirically against click-track fixtures rather than derived
//! analytically, so thresholds here are candidates for retuning against a
//! larger validation corpus.

use crate::signal::stats::EPSILON;

use super::{TempoCandidate, TempoRefinement};

/// Harmonic ratios tested when normalizing a reading against a reference,
/// ordered by how commonly the corresponding confusion occurs
pub const HARMONIC_RATIOS: [f32; 11] = [
    1.0,
    0.5,
    2.0,
    1.0 / 3.0,
    3.0,
    2.0 / 3.0,
    1.5,
    0.25,
    4.0,
    0.75,
    1.25,
];

/// Ratios used to expand a candidate into its plausible harmonic family
pub const EXPANSION_RATIOS: [f32; 6] = [1.0, 0.5, 2.0, 1.5, 2.0 / 3.0, 3.0];

/// Bound on doubling/halving iterations during range normalization
pub const MAX_OCTAVE_STEPS: u32 = 6;

/// Result of coercing a BPM into a target range
#[derive(Debug, Clone, Copy)]
pub struct CoercedBpm {
    /// BPM after coercion, guaranteed in `[min_bpm, max_bpm]`
    pub bpm: f32,
    /// Net multiplier that was applied (1.0 when already in range)
    pub multiplier: f32,
    /// True when no octave shift landed in range and the value was clamped
    pub clamped: bool,
}

/// Coerce a BPM into `[min_bpm, max_bpm]` by octave shifts
///
/// Repeatedly doubles or halves (bounded at [`MAX_OCTAVE_STEPS`] iterations to
/// guard against runaway loops on degenerate ranges). If no power-of-two
/// multiple lands in range the value is clamped to the nearest bound and
/// flagged, which callers translate into lower trust.
pub fn coerce_to_range(bpm: f32, min_bpm: f32, max_bpm: f32) -> CoercedBpm {
    if !bpm.is_finite() || bpm <= 0.0 {
        return CoercedBpm {
            bpm: min_bpm,
            multiplier: 1.0,
            clamped: true,
        };
    }

    let mut adjusted = bpm;
    let mut steps = 0u32;
    while adjusted < min_bpm && steps < MAX_OCTAVE_STEPS {
        adjusted *= 2.0;
        steps += 1;
    }
    while adjusted > max_bpm && steps < MAX_OCTAVE_STEPS {
        adjusted /= 2.0;
        steps += 1;
    }

    if adjusted >= min_bpm && adjusted <= max_bpm {
        CoercedBpm {
            bpm: adjusted,
            multiplier: adjusted / bpm,
            clamped: false,
        }
    } else {
        let clamped = adjusted.clamp(min_bpm, max_bpm);
        CoercedBpm {
            bpm: clamped,
            multiplier: clamped / bpm,
            clamped: true,
        }
    }
}

/// Find the harmonic ratio that brings `bpm` closest to `reference`
///
/// Only ratios whose scaled value stays inside `[min_bpm, max_bpm]` are
/// considered; unity is always a candidate via clamping, so the result is
/// never empty.
///
/// # Returns
///
/// `(ratio, adjusted_bpm)`
pub fn normalize_to_reference(
    bpm: f32,
    reference: f32,
    min_bpm: f32,
    max_bpm: f32,
) -> (f32, f32) {
    // Baseline: range coercion. Its multiplier is the applied ratio, so an
    // out-of-range reading reports the octave fold even when no table ratio
    // improves on it.
    let coerced = coerce_to_range(bpm, min_bpm, max_bpm);
    let mut best_ratio = coerced.multiplier;
    let mut best_bpm = coerced.bpm;
    let mut best_dist = (best_bpm - reference).abs();

    for &ratio in HARMONIC_RATIOS.iter() {
        let scaled = bpm * ratio;
        if scaled < min_bpm || scaled > max_bpm {
            continue;
        }
        let dist = (scaled - reference).abs();
        if dist < best_dist {
            best_dist = dist;
            best_ratio = ratio;
            best_bpm = scaled;
        }
    }

    (best_ratio, best_bpm)
}

/// Cluster harmonic-expanded candidates and pick the best-supported tempo
///
/// Candidates with `allow_harmonics` are expanded through
/// [`EXPANSION_RATIOS`] (expanded members carry reduced weight); literal
/// candidates enter as-is. Members are greedily clustered within
/// `tolerance_bpm` of an anchor and clusters scored by
/// `total_weight x consistency`, where consistency penalizes BPM spread,
/// harmonic deviation (expanded members), and range-clamped members.
///
/// # Returns
///
/// `None` when no candidate lands in range with positive weight.
pub fn refine_from_candidates(
    candidates: &[TempoCandidate],
    min_bpm: f32,
    max_bpm: f32,
    tolerance_bpm: f32,
) -> Option<TempoRefinement> {
    if candidates.is_empty() || min_bpm >= max_bpm {
        return None;
    }

    struct Member {
        bpm: f32,
        weight: f32,
        harmonic_deviation: f32,
        clamped: bool,
    }

    // Expand into the harmonic family, keeping only in-range members
    let mut members: Vec<Member> = Vec::new();
    for cand in candidates {
        if !(cand.weight > 0.0) || !cand.bpm.is_finite() || cand.bpm <= 0.0 {
            continue;
        }
        if cand.allow_harmonics {
            for &ratio in EXPANSION_RATIOS.iter() {
                let bpm = cand.bpm * ratio;
                if bpm < min_bpm || bpm > max_bpm {
                    continue;
                }
                // Non-unity harmonics are weaker evidence than the raw reading
                let harmonic_deviation = (ratio.max(1.0 / ratio)) - 1.0;
                let weight = cand.weight / (1.0 + harmonic_deviation);
                members.push(Member {
                    bpm,
                    weight,
                    harmonic_deviation,
                    clamped: false,
                });
            }
        } else {
            // Literal candidates get no harmonic adjustment: out-of-range
            // values are clamped to the nearest bound and flagged
            let clamped = cand.bpm < min_bpm || cand.bpm > max_bpm;
            members.push(Member {
                bpm: cand.bpm.clamp(min_bpm, max_bpm),
                weight: cand.weight,
                harmonic_deviation: 0.0,
                clamped,
            });
        }
    }

    if members.is_empty() {
        // Nothing in range: fall back to the heaviest candidate, clamped
        let heaviest = candidates
            .iter()
            .filter(|c| c.weight > 0.0 && c.bpm.is_finite() && c.bpm > 0.0)
            .max_by(|a, b| {
                a.weight
                    .partial_cmp(&b.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        let coerced = coerce_to_range(heaviest.bpm, min_bpm, max_bpm);
        return Some(TempoRefinement {
            bpm: coerced.bpm,
            score: heaviest.weight * 0.25,
            total_score: heaviest.weight,
            cluster_size: 1,
            consistency: 0.25,
            clamped: true,
        });
    }

    // Greedy clustering: heaviest unassigned member anchors each cluster
    members.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let tol = tolerance_bpm.max(0.5);
    let mut assigned = vec![false; members.len()];
    let mut best: Option<TempoRefinement> = None;
    let mut total_score = 0.0f32;

    for anchor in 0..members.len() {
        if assigned[anchor] {
            continue;
        }
        let anchor_bpm = members[anchor].bpm;
        let mut cluster: Vec<usize> = Vec::new();
        for (i, member) in members.iter().enumerate() {
            if !assigned[i] && (member.bpm - anchor_bpm).abs() <= tol {
                cluster.push(i);
            }
        }
        for &i in &cluster {
            assigned[i] = true;
        }

        let weight_sum: f32 = cluster.iter().map(|&i| members[i].weight).sum();
        if weight_sum <= EPSILON {
            continue;
        }

        let mean_bpm: f32 =
            cluster.iter().map(|&i| members[i].bpm * members[i].weight).sum::<f32>() / weight_sum;

        // Consistency: spread, harmonic-deviation and clamp penalties
        let spread: f32 = (cluster
            .iter()
            .map(|&i| {
                let d = members[i].bpm - mean_bpm;
                d * d * members[i].weight
            })
            .sum::<f32>()
            / weight_sum)
            .sqrt();
        let spread_factor = (1.0 - spread / tol).clamp(0.0, 1.0);

        let mean_harmonic_dev: f32 = cluster
            .iter()
            .map(|&i| members[i].harmonic_deviation * members[i].weight)
            .sum::<f32>()
            / weight_sum;
        let harmonic_factor = 1.0 / (1.0 + mean_harmonic_dev);

        let clamped_any = cluster.iter().any(|&i| members[i].clamped);
        let clamp_factor = if clamped_any { 0.5 } else { 1.0 };

        let consistency = (spread_factor * harmonic_factor * clamp_factor).clamp(0.0, 1.0);
        let score = weight_sum * consistency;
        total_score += score;

        let replace = match &best {
            None => true,
            Some(b) => score > b.score,
        };
        if replace {
            best = Some(TempoRefinement {
                bpm: mean_bpm,
                score,
                total_score: 0.0, // filled below
                cluster_size: cluster.len(),
                consistency,
                clamped: clamped_any,
            });
        }
    }

    best.map(|mut refinement| {
        refinement.total_score = total_score.max(refinement.score);
        log::debug!(
            "Tempo refinement: {:.2} BPM (score={:.3}/{:.3}, {} members, consistency={:.3})",
            refinement.bpm,
            refinement.score,
            refinement.total_score,
            refinement.cluster_size,
            refinement.consistency
        );
        refinement
    })
}

/// Refine directly from raw beat intervals in milliseconds
pub fn refine_from_intervals(
    intervals_ms: &[(f32, f32)],
    min_bpm: f32,
    max_bpm: f32,
    tolerance_bpm: f32,
) -> Option<TempoRefinement> {
    let candidates: Vec<TempoCandidate> = intervals_ms
        .iter()
        .filter(|(interval, _)| *interval > 0.0)
        .map(|&(interval, weight)| TempoCandidate::new(60_000.0 / interval, weight))
        .collect();
    refine_from_candidates(&candidates, min_bpm, max_bpm, tolerance_bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_in_range_identity() {
        let c = coerce_to_range(120.0, 60.0, 180.0);
        assert_eq!(c.bpm, 120.0);
        assert_eq!(c.multiplier, 1.0);
        assert!(!c.clamped);
    }

    #[test]
    fn test_coerce_halves_and_doubles() {
        let c = coerce_to_range(240.0, 60.0, 180.0);
        assert_eq!(c.bpm, 120.0);
        assert!((c.multiplier - 0.5).abs() < 1e-6);
        assert!(!c.clamped);

        let c = coerce_to_range(40.0, 60.0, 180.0);
        assert_eq!(c.bpm, 80.0);
        assert!((c.multiplier - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_coerce_clamps_when_impossible() {
        // Narrow range 100..110: 80 doubles past it
        let c = coerce_to_range(80.0, 100.0, 110.0);
        assert!(c.clamped);
        assert!(c.bpm >= 100.0 && c.bpm <= 110.0);
    }

    #[test]
    fn test_coerce_degenerate_input() {
        let c = coerce_to_range(f32::NAN, 60.0, 180.0);
        assert!(c.clamped);
        assert_eq!(c.bpm, 60.0);
    }

    #[test]
    fn test_normalize_to_reference_picks_half() {
        // 310 is out of range; half (155) matches the reference exactly
        let (ratio, bpm) = normalize_to_reference(310.0, 155.0, 60.0, 200.0);
        assert!((ratio - 0.5).abs() < 1e-6);
        assert!((bpm - 155.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_to_reference_third_subharmonic() {
        // A reading at 50 against a 150 reference: x3 recovers the beat level
        let (ratio, bpm) = normalize_to_reference(50.0, 150.0, 60.0, 200.0);
        assert!((ratio - 3.0).abs() < 1e-6);
        assert!((bpm - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_reports_coercion_fold() {
        // No table ratio brings 1600 in range; the octave coercion does, and
        // the returned ratio must be the applied multiplier, not unity
        let (ratio, bpm) = normalize_to_reference(1600.0, 180.0, 60.0, 200.0);
        assert!((ratio - 0.125).abs() < 1e-6);
        assert!((bpm - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_refine_agreeing_candidates() {
        let candidates = vec![
            TempoCandidate::new(120.0, 1.0),
            TempoCandidate::new(120.5, 0.9),
            TempoCandidate::new(119.5, 0.8),
        ];
        let refinement = refine_from_candidates(&candidates, 60.0, 200.0, 3.0).unwrap();
        assert!((refinement.bpm - 120.0).abs() < 1.0);
        assert!(refinement.consistency > 0.5);
        assert!(!refinement.clamped);
    }

    #[test]
    fn test_refine_harmonic_family_converges() {
        // Half- and double-tempo readings should reinforce the fundamental
        let candidates = vec![
            TempoCandidate::new(120.0, 1.0),
            TempoCandidate::new(60.0, 0.6),
            TempoCandidate::new(240.0, 0.5),
        ];
        let refinement = refine_from_candidates(&candidates, 60.0, 200.0, 3.0).unwrap();
        assert!(
            (refinement.bpm - 120.0).abs() < 3.0,
            "got {:.1}",
            refinement.bpm
        );
    }

    #[test]
    fn test_refine_empty() {
        assert!(refine_from_candidates(&[], 60.0, 200.0, 3.0).is_none());
    }

    #[test]
    fn test_refine_out_of_range_clamps() {
        let candidates = vec![TempoCandidate::literal(500.0, 1.0)];
        let refinement = refine_from_candidates(&candidates, 60.0, 200.0, 3.0).unwrap();
        // A literal candidate pins to the nearest bound; no octave fold to 125
        assert!((refinement.bpm - 200.0).abs() < 1e-3);
        assert!(refinement.clamped);
        assert!(refinement.consistency <= 0.5);
    }

    #[test]
    fn test_refine_literal_in_range_untouched() {
        let candidates = vec![TempoCandidate::literal(150.0, 1.0)];
        let refinement = refine_from_candidates(&candidates, 60.0, 200.0, 3.0).unwrap();
        assert!((refinement.bpm - 150.0).abs() < 1e-3);
        assert!(!refinement.clamped);
    }

    #[test]
    fn test_refine_from_intervals() {
        // 500 ms intervals => 120 BPM
        let intervals: Vec<(f32, f32)> = (0..6).map(|_| (500.0, 1.0)).collect();
        let refinement = refine_from_intervals(&intervals, 60.0, 200.0, 3.0).unwrap();
        assert!((refinement.bpm - 120.0).abs() < 2.0);
    }
}
