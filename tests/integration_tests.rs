//! End-to-end tests for the tempo estimation engine

use std::path::PathBuf;

use cadence_dsp::config::PreprocessParams;
use cadence_dsp::detectors::{default_registry, AlgorithmId};
use cadence_dsp::io::wav::{bpm_from_filename, load_wav_mono};
use cadence_dsp::preprocessing::process;
use cadence_dsp::{
    analyze_window, AnalysisStatus, AudioFrame, DetectionContext, TempoAnalyzer,
};

const SAMPLE_RATE: u32 = 44100;

/// Amplitude-modulated beat: exponential hit envelope over a fundamental
/// plus two harmonics
fn beat_signal(bpm: f32, secs: f32) -> Vec<f32> {
    let n = (SAMPLE_RATE as f32 * secs) as usize;
    let period = (60.0 / bpm * SAMPLE_RATE as f32) as usize;
    (0..n)
        .map(|i| {
            let phase = (i % period) as f32 / SAMPLE_RATE as f32;
            let env = (-phase * 30.0).exp();
            let t = i as f32 / SAMPLE_RATE as f32;
            let tone = (2.0 * std::f32::consts::PI * 80.0 * t).sin()
                + 0.5 * (2.0 * std::f32::consts::PI * 160.0 * t).sin()
                + 0.25 * (2.0 * std::f32::consts::PI * 240.0 * t).sin();
            env * tone
        })
        .collect()
}

/// Click track: sharp 5 ms triangular pulses on the beat grid
fn click_track(bpm: f32, secs: f32, amplitude: f32) -> Vec<f32> {
    let n = (SAMPLE_RATE as f32 * secs) as usize;
    let period = (60.0 / bpm * SAMPLE_RATE as f32) as usize;
    let click_len = SAMPLE_RATE as usize * 5 / 1000;
    (0..n)
        .map(|i| {
            let in_click = i % period;
            if in_click < click_len {
                let ramp = in_click as f32 / click_len as f32;
                let tri = if ramp < 0.5 { 2.0 * ramp } else { 2.0 - 2.0 * ramp };
                tri * amplitude
            } else {
                0.0
            }
        })
        .collect()
}

/// Deterministic pseudo-noise from a seeded LCG
fn noise(seed: u64, n: usize, amplitude: f32) -> Vec<f32> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

#[test]
fn test_clean_beat_120() {
    let beat = beat_signal(120.0, 8.0);
    let noise = noise(1, beat.len(), 0.05);
    let mixed: Vec<f32> = beat.iter().zip(noise.iter()).map(|(a, b)| a + b).collect();

    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 8.0).unwrap();
    let summary = analyze_window(&mixed, &ctx).unwrap();

    let onset = summary
        .readings
        .iter()
        .find(|r| r.algorithm == AlgorithmId::EnergyOnset)
        .expect("energy onset reading on a clean beat");
    assert!(
        (onset.bpm - 120.0).abs() <= 3.0,
        "energy onset got {:.1} BPM",
        onset.bpm
    );
    assert!(onset.confidence > 0.25);

    let consensus = summary.consensus.expect("consensus on clean beat");
    assert!(
        (consensus.bpm - 120.0).abs() <= 3.0,
        "consensus got {:.1} BPM",
        consensus.bpm
    );
}

#[test]
fn test_click_track_180() {
    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 10.0).unwrap();
    let summary = analyze_window(&click_track(180.0, 10.0, 0.8), &ctx).unwrap();

    // A pure click train has no subharmonic energy, so the envelope spectrum
    // peak sits on the fundamental
    let fft = summary
        .readings
        .iter()
        .find(|r| r.algorithm == AlgorithmId::SpectralFft)
        .expect("spectral reading on a click track");
    assert!(
        (fft.bpm - 180.0).abs() <= 4.0,
        "spectral detector got {:.1} BPM",
        fft.bpm
    );
}

#[test]
fn test_noisy_beat_96() {
    let beat = beat_signal(96.0, 10.0);
    let noise = noise(42, beat.len(), 0.1);
    let mixed: Vec<f32> = beat.iter().zip(noise.iter()).map(|(a, b)| a + b).collect();

    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 10.0).unwrap();
    let summary = analyze_window(&mixed, &ctx).unwrap();

    let wavelet = summary
        .readings
        .iter()
        .find(|r| r.algorithm == AlgorithmId::WaveletEnergy)
        .expect("wavelet reading on a noisy beat");
    let near_family =
        (wavelet.bpm - 96.0).abs() <= 4.0 || (wavelet.bpm - 192.0).abs() <= 8.0;
    assert!(near_family, "wavelet got {:.1} BPM", wavelet.bpm);

    let consensus = summary.consensus.expect("consensus on noisy beat");
    let consensus_ok =
        (consensus.bpm - 96.0).abs() <= 4.0 || (consensus.bpm - 192.0).abs() <= 8.0;
    assert!(consensus_ok, "consensus got {:.1} BPM", consensus.bpm);
}

#[test]
fn test_subdivisions_do_not_double_tempo() {
    // 80 BPM beat with weak eighth-note ghosts between the main hits
    let n = (SAMPLE_RATE as f32 * 10.0) as usize;
    let beat_period = (60.0 / 80.0 * SAMPLE_RATE as f32) as usize;
    let ghost_offset = beat_period / 2;
    let samples: Vec<f32> = (0..n)
        .map(|i| {
            let in_beat = i % beat_period;
            let strong = (-(in_beat as f32 / SAMPLE_RATE as f32) * 30.0).exp();
            let ghost_phase = (in_beat + beat_period - ghost_offset) % beat_period;
            let ghost = 0.3 * (-(ghost_phase as f32 / SAMPLE_RATE as f32) * 30.0).exp();
            let tone =
                (2.0 * std::f32::consts::PI * 80.0 * i as f32 / SAMPLE_RATE as f32).sin();
            (strong + ghost) * tone
        })
        .collect();

    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 10.0).unwrap();
    let summary = analyze_window(&samples, &ctx).unwrap();
    let consensus = summary.consensus.expect("consensus with ghost notes");
    assert!(
        (consensus.bpm - 80.0).abs() <= 5.0,
        "ghost notes doubled the tempo: {:.1} BPM",
        consensus.bpm
    );
}

#[test]
fn test_interfering_harmonic_click_trains() {
    // A dominant 100 BPM click train with a weaker train at a harmonic rate:
    // the interval-based detectors must stay on the fundamental (within 8%)
    for interferer_bpm in [200.0, 50.0] {
        let main = click_track(100.0, 10.0, 0.8);
        let other = click_track(interferer_bpm, 10.0, 0.25);
        let mixed: Vec<f32> = main.iter().zip(other.iter()).map(|(a, b)| a + b).collect();

        let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 10.0).unwrap();
        let summary = analyze_window(&mixed, &ctx).unwrap();

        for id in [AlgorithmId::EnergyOnset, AlgorithmId::Autocorrelation] {
            if let Some(reading) = summary.readings.iter().find(|r| r.algorithm == id) {
                assert!(
                    (reading.bpm - 100.0).abs() <= 8.0,
                    "{} pulled to {:.1} BPM by {:.0} BPM interferer",
                    reading.algorithm.name(),
                    reading.bpm,
                    interferer_bpm
                );
            }
        }
    }
}

#[test]
fn test_empty_input_degrades_gracefully() {
    let ctx = DetectionContext::with_defaults(SAMPLE_RATE).unwrap();
    let signal = process(&[], &ctx, &PreprocessParams::default());
    assert!(signal.is_empty());

    for detector in default_registry(true) {
        assert!(
            detector.analyze(&signal, &ctx).is_none(),
            "{} produced a reading from nothing",
            detector.name()
        );
    }
}

#[test]
fn test_all_readings_respect_range_and_confidence() {
    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 8.0).unwrap();
    for bpm in [65.0, 96.0, 120.0, 150.0, 185.0] {
        let summary = analyze_window(&beat_signal(bpm, 8.0), &ctx).unwrap();
        for reading in &summary.readings {
            assert!(
                reading.bpm >= ctx.min_bpm && reading.bpm <= ctx.max_bpm,
                "{} out of range at source tempo {:.0}: {:.1}",
                reading.algorithm.name(),
                bpm,
                reading.bpm
            );
            assert!(
                (0.0..=1.0).contains(&reading.confidence),
                "{} confidence {:.3}",
                reading.algorithm.name(),
                reading.confidence
            );
        }
        if let Some(consensus) = summary.consensus {
            assert!(consensus.bpm >= ctx.min_bpm && consensus.bpm <= ctx.max_bpm);
            assert!((0.0..=1.0).contains(&consensus.confidence));
        }
    }
}

#[test]
fn test_streaming_determinism() {
    let run = || {
        let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 6.0).unwrap();
        let mut analyzer = TempoAnalyzer::new(ctx);
        let samples = beat_signal(132.0, 12.0);
        let mut outputs = Vec::new();
        for (i, chunk) in samples.chunks(SAMPLE_RATE as usize * 2).enumerate() {
            analyzer.push_frame(AudioFrame::new(chunk.to_vec(), SAMPLE_RATE, i as u64));
            let summary = analyzer.analyze_cycle();
            outputs.push(summary.consensus.map(|c| (c.bpm, c.confidence)));
        }
        outputs
    };
    assert_eq!(run(), run());
}

#[test]
fn test_streaming_smoothing_is_bounded() {
    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 6.0).unwrap();
    let mut analyzer = TempoAnalyzer::new(ctx);

    // Establish consensus at 120, then slide the buffer into 160 BPM material
    analyzer.push_frame(AudioFrame::new(beat_signal(120.0, 6.0), SAMPLE_RATE, 0));
    let before = analyzer
        .analyze_cycle()
        .consensus
        .expect("initial consensus")
        .bpm;

    analyzer.push_frame(AudioFrame::new(beat_signal(160.0, 6.0), SAMPLE_RATE, 1));
    let after = analyzer.analyze_cycle().consensus.expect("second consensus");

    let moved = (after.bpm - before).abs();
    let gap = (after.raw_bpm - before).abs();
    assert!(
        moved <= 0.6 * gap + 0.05,
        "output jumped {:.2} BPM on a {:.2} BPM raw gap",
        moved,
        gap
    );
}

#[test]
fn test_status_progression() {
    let ctx = DetectionContext::new(SAMPLE_RATE, 60.0, 200.0, 6.0).unwrap();
    let mut analyzer = TempoAnalyzer::new(ctx);

    let summary = analyzer.analyze_cycle();
    assert_eq!(summary.status, AnalysisStatus::Buffering);

    analyzer.push_frame(AudioFrame::new(beat_signal(120.0, 6.0), SAMPLE_RATE, 0));
    let summary = analyzer.analyze_cycle();
    assert_ne!(summary.status, AnalysisStatus::Buffering);
    assert!(summary.consensus.is_some());
}

#[test]
fn test_wav_fixtures_when_present() {
    let dir = fixture_dir();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("No fixture directory at {}, skipping", dir.display());
            return;
        }
    };

    let mut tested = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("wav") {
            continue;
        }
        let Some(expected) = bpm_from_filename(&path) else {
            continue;
        };

        let (samples, rate) = load_wav_mono(&path).expect("fixture should decode");
        let ctx = DetectionContext::with_defaults(rate).unwrap();
        let summary = analyze_window(&samples, &ctx).unwrap();
        let consensus = summary
            .consensus
            .unwrap_or_else(|| panic!("no consensus for {}", path.display()));

        // Accept the labeled tempo or an in-range octave relative
        let ok = [0.5f32, 1.0, 2.0].iter().any(|&r| {
            let target = expected * r;
            target >= ctx.min_bpm
                && target <= ctx.max_bpm
                && (consensus.bpm - target).abs() / target <= 0.05
        });
        assert!(
            ok,
            "{}: expected ~{:.1} BPM, got {:.1}",
            path.display(),
            expected,
            consensus.bpm
        );
        tested += 1;
    }
    if tested == 0 {
        eprintln!("No labeled WAV fixtures found, skipping");
    }
}
