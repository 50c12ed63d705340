//! Example: analyze a WAV file and print the tempo estimate
//!
//! Usage: `cargo run --example analyze_file -- path/to/track.wav [--json]`

use std::path::PathBuf;

use cadence_dsp::io::wav::{bpm_from_filename, load_wav_mono};
use cadence_dsp::{analyze_window, DetectionContext};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = PathBuf::from(args.next().ok_or("usage: analyze_file <file.wav> [--json]")?);
    let as_json = args.next().as_deref() == Some("--json");

    let (samples, sample_rate) = load_wav_mono(&path)?;
    let ctx = DetectionContext::with_defaults(sample_rate)?;
    let summary = analyze_window(&samples, &ctx)?;

    if as_json {
        println!("{}", summary.to_json()?);
        return Ok(());
    }

    println!("Analysis of {}:", path.display());
    for reading in &summary.readings {
        println!(
            "  {:>16}: {:6.1} BPM (confidence {:.2})",
            reading.algorithm.name(),
            reading.bpm,
            reading.confidence
        );
    }
    match summary.consensus {
        Some(consensus) => {
            println!(
                "  {:>16}: {:6.1} BPM (confidence {:.2}, {} detectors)",
                "consensus", consensus.bpm, consensus.confidence, consensus.cluster_size
            );
            if let Some(expected) = bpm_from_filename(&path) {
                println!("  {:>16}: {:6.1} BPM", "labeled", expected);
            }
        }
        None => println!("  no consensus (insufficient evidence)"),
    }

    Ok(())
}
