use std::collections::HashMap;
use std::time::Instant;

use crate::settings::main_settings::LoggingSettings;

const FRAMES_WITHOUT_DETECTIONS_TARGET: &str = "blanket::frames_without_detections";
const ANONYMIZATION_RESULTS_TARGET: &str = "blanket::anonymization_results";

/// Cross-cutting logger for pipeline orchestration events.
///
/// Decouples use cases and strategies from the output mechanism so each
/// caller can observe pipeline behavior without changing orchestration code.
pub trait PipelineLogger: Send {
    /// Report frame-level progress.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named pipeline stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A frame of `source` had no face detections.
    fn frame_without_detections(&mut self, source: &str, frame_index: usize);

    /// Outcome of anonymizing one media unit; `detail` is a short summary
    /// such as the face or frame count.
    fn anonymization_result(&mut self, source: &str, output: &str, detail: &str);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-pipeline summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn frame_without_detections(&mut self, _source: &str, _frame_index: usize) {}
    fn anonymization_result(&mut self, _source: &str, _output: &str, _detail: &str) {}
    fn info(&mut self, _message: &str) {}
}

/// `log`-backed logger that tracks per-stage timing and prints a summary
/// when the run completes.
///
/// Progress output is throttled to every `throttle_frames` frames.
/// Frames without detections and anonymization results go to dedicated
/// log targets so they can be filtered with `RUST_LOG`.
pub struct LogPipelineLogger {
    throttle_frames: usize,
    log_frames_without_detections: bool,
    log_anonymization_results: bool,
    timings: HashMap<String, Vec<f64>>,
    start_time: Instant,
    total_frames: usize,
    frames_without_detections: usize,
    anonymized_units: usize,
}

impl LogPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            log_frames_without_detections: true,
            log_anonymization_results: true,
            timings: HashMap::new(),
            start_time: Instant::now(),
            total_frames: 0,
            frames_without_detections: 0,
            anonymized_units: 0,
        }
    }

    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            log_frames_without_detections: settings.log_frames_without_detections,
            log_anonymization_results: settings.log_anonymization_result,
            ..Self::default()
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.anonymized_units == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Pipeline summary ({} units, {} frames, {:.1}s total):",
            self.anonymized_units,
            self.total_frames,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        if self.frames_without_detections > 0 {
            lines.push(format!(
                "  Frames without detections: {}",
                self.frames_without_detections
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn frames_without_detections(&self) -> usize {
        self.frames_without_detections
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.total_frames = total;
        if total > 0 && (current % self.throttle_frames == 0 || current == total) {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processing: {current}/{total} frames ({pct:.1}%)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn frame_without_detections(&mut self, source: &str, frame_index: usize) {
        self.frames_without_detections += 1;
        if self.log_frames_without_detections {
            log::info!(target: FRAMES_WITHOUT_DETECTIONS_TARGET, "{source}: frame {frame_index}");
        }
    }

    fn anonymization_result(&mut self, source: &str, output: &str, detail: &str) {
        self.anonymized_units += 1;
        if self.log_anonymization_results {
            log::info!(target: ANONYMIZATION_RESULTS_TARGET, "{source} -> {output} ({detail})");
        }
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.progress(1, 10);
        logger.timing("detect", 5.0);
        logger.frame_without_detections("clip.mp4", 3);
        logger.anonymization_result("a.png", "b.png", "2 faces");
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogPipelineLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("anonymize", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("anonymize").unwrap(), &[5.0]);
        assert!(logger.timings_for("write").is_none());
    }

    #[test]
    fn test_summary_includes_stages_and_counters() {
        let mut logger = LogPipelineLogger::new(10);
        logger.progress(4, 4);
        logger.timing("detect", 12.0);
        logger.frame_without_detections("clip.mp4", 1);
        logger.anonymization_result("clip.mp4", "out.mp4", "250 frames");

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Pipeline summary (1 units, 4 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("Frames without detections: 1"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogPipelineLogger::default().summary_string().is_none());
    }

    #[test]
    fn test_frames_without_detections_counted_when_disabled() {
        let settings = LoggingSettings {
            log_frames_without_detections: false,
            ..LoggingSettings::default()
        };
        let mut logger = LogPipelineLogger::from_settings(&settings);
        logger.frame_without_detections("clip.mp4", 0);
        logger.frame_without_detections("clip.mp4", 1);
        assert_eq!(logger.frames_without_detections(), 2);
    }

    #[test]
    fn test_progress_tracks_total() {
        let mut logger = LogPipelineLogger::new(10);
        for i in 1..=20 {
            logger.progress(i, 20);
        }
        assert_eq!(logger.total_frames, 20);
    }

    #[test]
    fn test_zero_throttle_is_clamped() {
        assert_eq!(LogPipelineLogger::new(0).throttle_frames, 1);
    }
}
