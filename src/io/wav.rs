//! WAV fixture loading
//!
//! Parses standard RIFF/WAVE PCM files, downmixes to mono float, and extracts
//! the ground-truth BPM encoded in fixture filenames
//! (`metronome_98.wav` => 98.0).

use std::path::Path;

use crate::error::AnalysisError;

/// Load a WAV file as mono float samples
///
/// Integer PCM is scaled by the full-scale value of its bit depth (16-bit:
/// `value / 32768.0`); stereo channels are averaged.
///
/// # Returns
///
/// `(samples, sample_rate)`
///
/// # Errors
///
/// Returns `AnalysisError::DecodingError` when the file cannot be opened or
/// parsed as RIFF/WAVE.
pub fn load_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), AnalysisError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AnalysisError::DecodingError(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AnalysisError::DecodingError(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AnalysisError::DecodingError(e.to_string()))?
        }
    };

    let mono = if spec.channels > 1 {
        let ch = spec.channels as usize;
        samples
            .chunks(ch)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    } else {
        samples
    };

    log::debug!(
        "Loaded {}: {} mono samples at {} Hz ({} ch, {} bit)",
        path.display(),
        mono.len(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    Ok((mono, spec.sample_rate))
}

/// Parse the ground-truth BPM encoded in a fixture filename
///
/// The convention is a trailing `_<bpm>` before the extension:
/// `metronome_98.wav` => `Some(98.0)`, `click_127.5.wav` => `Some(127.5)`.
pub fn bpm_from_filename(path: &Path) -> Option<f32> {
    let stem = path.file_stem()?.to_str()?;
    let tail = stem.rsplit('_').next()?;
    let bpm: f32 = tail.parse().ok()?;
    if bpm > 0.0 && bpm.is_finite() {
        Some(bpm)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_bpm_from_filename() {
        assert_eq!(
            bpm_from_filename(&PathBuf::from("metronome_98.wav")),
            Some(98.0)
        );
        assert_eq!(
            bpm_from_filename(&PathBuf::from("fixtures/click_127.5.wav")),
            Some(127.5)
        );
        assert_eq!(
            bpm_from_filename(&PathBuf::from("drum_loop_120.wav")),
            Some(120.0)
        );
    }

    #[test]
    fn test_bpm_from_filename_invalid() {
        assert_eq!(bpm_from_filename(&PathBuf::from("metronome.wav")), None);
        assert_eq!(bpm_from_filename(&PathBuf::from("track_fast.wav")), None);
        assert_eq!(bpm_from_filename(&PathBuf::from("neg_-5.wav")), None);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_wav_mono(&PathBuf::from("/nonexistent/file.wav"));
        assert!(matches!(result, Err(AnalysisError::DecodingError(_))));
    }

    #[test]
    fn test_load_roundtrip_pcm16() {
        // Write a small stereo PCM16 file and read it back as mono
        let dir = std::env::temp_dir();
        let path = dir.join("cadence_dsp_test_110.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..1000i32 {
            let v = ((i % 100) * 300 - 15000) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, rate) = load_wav_mono(&path).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(samples.len(), 1000);
        assert!(samples.iter().all(|&x| (-1.0..=1.0).contains(&x)));
        assert_eq!(bpm_from_filename(&path), Some(110.0));

        let _ = std::fs::remove_file(&path);
    }
}
