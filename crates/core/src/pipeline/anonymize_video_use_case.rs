use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::anonymization::domain::anonymizer::{Anonymizer, VideoJob};
use crate::detection::domain::detection_stage::DetectionStage;
use crate::shared::error::BlanketResult;
use crate::video::domain::image_primitive::restrict_permissions;
use crate::video::domain::video_primitive::VideoPrimitive;
use crate::video::domain::video_writer::VideoWriter;

use super::pipeline_logger::PipelineLogger;
use super::pipeline_options::PipelineOptions;

/// Orchestrates anonymization of one video.
///
/// Wires the detection stage, sink and logger into a [`VideoJob`] and lets
/// the strategy decide between frame-by-frame processing and whole-clip
/// synthesis. Setting the cancel flag from another thread stops the run
/// between frames.
pub struct AnonymizeVideoUseCase {
    anonymizer: Arc<dyn Anonymizer>,
    detection: DetectionStage,
    writer: Box<dyn VideoWriter>,
    options: PipelineOptions,
    cancelled: Arc<AtomicBool>,
}

impl AnonymizeVideoUseCase {
    pub fn new(
        anonymizer: Arc<dyn Anonymizer>,
        detection: DetectionStage,
        writer: Box<dyn VideoWriter>,
        options: PipelineOptions,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            anonymizer,
            detection,
            writer,
            options,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn execute_path(
        &mut self,
        input: &Path,
        output: &Path,
        clockwise_rotation_index: i32,
        logger: &mut dyn PipelineLogger,
    ) -> BlanketResult<VideoPrimitive> {
        let mut video = VideoPrimitive::new(input, clockwise_rotation_index);
        self.execute(&mut video, output, logger)
    }

    pub fn execute(
        &mut self,
        video: &mut VideoPrimitive,
        output: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> BlanketResult<VideoPrimitive> {
        let source = video.path().display().to_string();
        logger.info(&format!(
            "Anonymizing {source} with {}",
            self.anonymizer.method()
        ));

        let mut job = VideoJob {
            detection: &mut self.detection,
            writer: self.writer.as_mut(),
            logger: &mut *logger,
            cancelled: &self.cancelled,
            blacken_without_detections: self.options.blacken_without_detections,
        };
        let anonymized = self.anonymizer.anonymize_video(video, output, &mut job)?;

        if self.options.restrict_access_to_saved && anonymized.path().exists() {
            restrict_permissions(anonymized.path())?;
        }

        let detail = match video.total_frames() {
            Ok(total) => format!("{total} frames"),
            Err(_) => "frame count unknown".to_string(),
        };
        logger.anonymization_result(&source, &anonymized.path().display().to_string(), &detail);
        Ok(anonymized)
    }
}
