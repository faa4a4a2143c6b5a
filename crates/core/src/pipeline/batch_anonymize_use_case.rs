use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::detection::domain::detection_stage::DetectionStage;
use crate::shared::constants::is_image_path;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use crate::video::infrastructure::image_file_writer::ImageFileWriter;

use super::anonymize_image_use_case::AnonymizeImageUseCase;
use super::anonymize_video_use_case::AnonymizeVideoUseCase;
use super::pipeline_logger::PipelineLogger;
use super::pipeline_options::PipelineOptions;

/// Supplies the detection stage for one input file.
pub type DetectionProvider = Box<dyn Fn(&Path) -> BlanketResult<DetectionStage> + Send + Sync>;

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    /// Input path and rendered error for every unit that failed.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Anonymizes every file of a folder into an output folder.
///
/// Only the top level is visited, in file name order. Image extensions go
/// through the image pipeline and everything else is treated as video. A
/// failing unit is recorded and the batch moves on.
pub struct BatchAnonymizeUseCase {
    anonymizer: Arc<dyn Anonymizer>,
    detections: DetectionProvider,
    options: PipelineOptions,
    clockwise_rotation_index: i32,
    cancelled: Arc<AtomicBool>,
}

impl BatchAnonymizeUseCase {
    pub fn new(
        anonymizer: Arc<dyn Anonymizer>,
        detections: DetectionProvider,
        options: PipelineOptions,
        clockwise_rotation_index: i32,
    ) -> Self {
        Self {
            anonymizer,
            detections,
            options,
            clockwise_rotation_index,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Files directly inside `input_folder`, sorted, hidden files skipped.
    pub fn collect_inputs(input_folder: &Path) -> BlanketResult<Vec<PathBuf>> {
        let entries = fs::read_dir(input_folder).map_err(|e| BlanketError::io(input_folder, e))?;
        let mut inputs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BlanketError::io(input_folder, e))?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if path.is_file() && !hidden {
                inputs.push(path);
            }
        }
        inputs.sort();
        Ok(inputs)
    }

    pub fn execute(
        &self,
        input_folder: &Path,
        output_folder: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> BlanketResult<BatchReport> {
        let inputs = Self::collect_inputs(input_folder)?;
        fs::create_dir_all(output_folder).map_err(|e| BlanketError::io(output_folder, e))?;
        logger.info(&format!(
            "Anonymizing {} files from {} into {}",
            inputs.len(),
            input_folder.display(),
            output_folder.display()
        ));

        let mut report = BatchReport::default();
        for input in inputs {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(BlanketError::Cancelled);
            }
            let Some(file_name) = input.file_name() else {
                continue;
            };
            let output = output_folder.join(file_name);

            match self.anonymize_one(&input, &output, logger) {
                Ok(()) => report.succeeded.push(input),
                Err(BlanketError::Cancelled) => return Err(BlanketError::Cancelled),
                Err(e) => {
                    log::error!("Failed to anonymize {}: {e}", input.display());
                    report.failed.push((input, e.to_string()));
                }
            }
        }

        logger.info(&format!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        ));
        Ok(report)
    }

    fn anonymize_one(
        &self,
        input: &Path,
        output: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> BlanketResult<()> {
        let detection = (self.detections)(input)?;
        if is_image_path(input) {
            AnonymizeImageUseCase::new(
                self.anonymizer.clone(),
                detection,
                Box::new(ImageFileWriter::new()),
                self.options,
            )
            .execute_path(input, output, self.clockwise_rotation_index, logger)?;
        } else {
            AnonymizeVideoUseCase::new(
                self.anonymizer.clone(),
                detection,
                Box::new(FfmpegWriter::new()),
                self.options,
                Some(self.cancelled.clone()),
            )
            .execute_path(input, output, self.clockwise_rotation_index, logger)?;
        }
        Ok(())
    }
}
