//! Analysis session coordinator
//!
//! Owns the sliding sample buffer, the detector set, and the consensus
//! engine, and drives one analysis cycle end to end: preprocess once, fan the
//! detector batch out across the rayon pool with per-detector panic
//! isolation, then fold the readings through the strictly sequential
//! consensus update.
//!
//! Timestamps are derived from the sample count pushed so far, not the wall
//! clock, so identical input through a fresh analyzer reproduces identical
//! output.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ConsensusParams, DetectionContext, PreprocessParams};
use crate::consensus::{ConsensusEngine, ConsensusResult};
use crate::detectors::{default_registry, BpmReading, Detector};
use crate::io::AudioFrame;
use crate::preprocessing::tempogram::Tempogram;
use crate::preprocessing::{process, PreprocessedSignal};

/// Buffered audio below this duration keeps the session in `Buffering`
const MIN_ANALYSIS_SECS: f32 = 1.0;

/// Consensus confidence at which the session reports `Streaming`
const STREAMING_CONFIDENCE: f32 = 0.4;

/// Default detector batch timeout
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifecycle state reported with every summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisStatus {
    /// Not enough audio buffered for a meaningful cycle
    Buffering,
    /// Analyzing, but no confident consensus yet
    Analyzing,
    /// Stable consensus is being produced
    Streaming,
}

/// Everything one analysis cycle produced
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    /// Session state after this cycle
    pub status: AnalysisStatus,
    /// Per-detector readings, in registry order (missing detectors yielded
    /// nothing or timed out)
    pub readings: Vec<BpmReading>,
    /// Fused estimate, `None` until a first consensus exists
    pub consensus: Option<ConsensusResult>,
    /// Tempogram of the analyzed window, for visualization
    pub tempogram_snapshot: Option<Tempogram>,
}

impl AnalysisSummary {
    /// Serialize the summary as pretty-printed JSON, for UIs and telemetry
    pub fn to_json(&self) -> Result<String, crate::error::AnalysisError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::AnalysisError::ProcessingError(format!(
                "Failed to serialize summary: {}",
                e
            ))
        })
    }
}

/// Coordinator tuning knobs beyond the detection context
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Sliding buffer bound in seconds (default: the context window)
    pub buffer_window_secs: Option<f32>,
    /// Detector batch timeout; `None` runs the batch to completion
    pub batch_timeout: Option<Duration>,
    /// Include the DP beat tracker in the default registry
    pub beat_tracker: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            buffer_window_secs: None,
            batch_timeout: Some(DEFAULT_BATCH_TIMEOUT),
            beat_tracker: true,
        }
    }
}

/// Streaming tempo analysis session
pub struct TempoAnalyzer {
    ctx: DetectionContext,
    preprocess_params: PreprocessParams,
    detectors: Arc<Vec<Box<dyn Detector>>>,
    consensus: ConsensusEngine,
    buffer: VecDeque<AudioFrame>,
    buffered_samples: usize,
    buffer_window_secs: f32,
    batch_timeout: Option<Duration>,
    last_sequence: Option<u64>,
    total_samples: u64,
}

impl TempoAnalyzer {
    /// Analyzer with default parameters and the standard detector set
    pub fn new(ctx: DetectionContext) -> Self {
        Self::with_params(
            ctx,
            PreprocessParams::default(),
            ConsensusParams::default(),
            AnalyzerOptions::default(),
        )
    }

    /// Analyzer with explicit tuning parameters
    pub fn with_params(
        ctx: DetectionContext,
        preprocess_params: PreprocessParams,
        consensus_params: ConsensusParams,
        options: AnalyzerOptions,
    ) -> Self {
        let detectors = Arc::new(default_registry(options.beat_tracker));
        Self::assemble(ctx, preprocess_params, consensus_params, options, detectors)
    }

    /// Analyzer over a caller-provided detector set
    pub fn with_detectors(
        ctx: DetectionContext,
        detectors: Vec<Box<dyn Detector>>,
        options: AnalyzerOptions,
    ) -> Self {
        Self::assemble(
            ctx,
            PreprocessParams::default(),
            ConsensusParams::default(),
            options,
            Arc::new(detectors),
        )
    }

    fn assemble(
        ctx: DetectionContext,
        preprocess_params: PreprocessParams,
        consensus_params: ConsensusParams,
        options: AnalyzerOptions,
        detectors: Arc<Vec<Box<dyn Detector>>>,
    ) -> Self {
        let buffer_window_secs = options
            .buffer_window_secs
            .unwrap_or(ctx.window_secs)
            .max(0.1);
        Self {
            ctx,
            preprocess_params,
            detectors,
            consensus: ConsensusEngine::new(consensus_params),
            buffer: VecDeque::new(),
            buffered_samples: 0,
            buffer_window_secs,
            batch_timeout: options.batch_timeout,
            last_sequence: None,
            total_samples: 0,
        }
    }

    /// Append a capture frame to the sliding buffer
    ///
    /// Frames must arrive in strictly increasing sequence order; an
    /// out-of-order frame is dropped with a warning and `false` is returned.
    /// The oldest frames are evicted once the buffer exceeds its window.
    pub fn push_frame(&mut self, frame: AudioFrame) -> bool {
        if let Some(last) = self.last_sequence {
            if frame.sequence <= last {
                log::warn!(
                    "Dropping out-of-order frame: sequence {} after {}",
                    frame.sequence,
                    last
                );
                return false;
            }
        }
        self.last_sequence = Some(frame.sequence);
        self.total_samples += frame.samples.len() as u64;
        self.buffered_samples += frame.samples.len();
        self.buffer.push_back(frame);

        let max_samples =
            (self.buffer_window_secs * self.ctx.sample_rate as f32) as usize;
        while self.buffered_samples > max_samples && self.buffer.len() > 1 {
            if let Some(evicted) = self.buffer.pop_front() {
                self.buffered_samples -= evicted.samples.len();
            }
        }
        true
    }

    /// Buffered audio duration in seconds
    pub fn buffered_secs(&self) -> f32 {
        self.buffered_samples as f32 / self.ctx.sample_rate as f32
    }

    /// Run one full analysis cycle over the current buffer
    pub fn analyze_cycle(&mut self) -> AnalysisSummary {
        let frames = self.buffer.make_contiguous();
        let signal = Arc::new(process(frames, &self.ctx, &self.preprocess_params));

        // Stream position in milliseconds, derived from pushed samples
        let timestamp_ms =
            self.total_samples * 1000 / u64::from(self.ctx.sample_rate.max(1));

        let mut readings = self.run_batch(Arc::clone(&signal));
        for reading in &mut readings {
            reading.timestamp_ms = timestamp_ms;
        }

        let consensus = self.consensus.combine(&mut readings, &self.ctx);

        let status = match &consensus {
            None if self.buffered_secs() < MIN_ANALYSIS_SECS => AnalysisStatus::Buffering,
            None => AnalysisStatus::Analyzing,
            Some(result) if result.confidence >= STREAMING_CONFIDENCE => {
                AnalysisStatus::Streaming
            }
            Some(_) => AnalysisStatus::Analyzing,
        };

        log::debug!(
            "Cycle at {} ms: {} readings, status {:?}",
            timestamp_ms,
            readings.len(),
            status
        );

        AnalysisSummary {
            status,
            readings,
            consensus,
            tempogram_snapshot: signal.tempogram.clone(),
        }
    }

    /// Run the detector batch, in registry order, with panic isolation
    fn run_batch(&self, signal: Arc<PreprocessedSignal>) -> Vec<BpmReading> {
        match self.batch_timeout {
            None => Self::run_batch_blocking(&self.detectors, &signal, &self.ctx),
            Some(timeout) => self.run_batch_with_timeout(signal, timeout),
        }
    }

    fn run_batch_blocking(
        detectors: &[Box<dyn Detector>],
        signal: &PreprocessedSignal,
        ctx: &DetectionContext,
    ) -> Vec<BpmReading> {
        detectors
            .par_iter()
            .map(|detector| Self::analyze_isolated(detector.as_ref(), signal, ctx))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Batch with a deadline: a detached worker runs the rayon batch and
    /// streams indexed results back; whatever arrived by the deadline is used
    fn run_batch_with_timeout(
        &self,
        signal: Arc<PreprocessedSignal>,
        timeout: Duration,
    ) -> Vec<BpmReading> {
        let (tx, rx) = mpsc::channel::<(usize, Option<BpmReading>)>();
        let detectors = Arc::clone(&self.detectors);
        let ctx = self.ctx.clone();

        std::thread::spawn(move || {
            detectors
                .par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (index, detector)| {
                    let result = Self::analyze_isolated(detector.as_ref(), &signal, &ctx);
                    let _ = tx.send((index, result));
                });
        });

        let expected = self.detectors.len();
        let deadline = Instant::now() + timeout;
        let mut slots: Vec<Option<BpmReading>> = vec![None; expected];
        let mut received = 0usize;
        while received < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, result)) => {
                    slots[index] = result;
                    received += 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Detector batch timed out: {}/{} finished, degrading to partial results",
                        received,
                        expected
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// One detector call behind a panic boundary
    fn analyze_isolated(
        detector: &dyn Detector,
        signal: &PreprocessedSignal,
        ctx: &DetectionContext,
    ) -> Option<BpmReading> {
        match catch_unwind(AssertUnwindSafe(|| detector.analyze(signal, ctx))) {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Detector {} panicked, excluding it from this cycle",
                    detector.name()
                );
                None
            }
        }
    }

    /// Drop buffered audio and all consensus state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.buffered_samples = 0;
        self.last_sequence = None;
        self.total_samples = 0;
        self.consensus.reset();
    }

    /// The session's detection context
    pub fn context(&self) -> &DetectionContext {
        &self.ctx
    }
}
