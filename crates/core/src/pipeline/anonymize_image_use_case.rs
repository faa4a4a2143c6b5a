use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::anonymization::domain::anonymizer::{check_requirements, Anonymizer};
use crate::detection::domain::detection_stage::DetectionStage;
use crate::shared::error::BlanketResult;
use crate::shared::frame::Frame;
use crate::video::domain::image_primitive::ImagePrimitive;
use crate::video::domain::image_writer::ImageWriter;

use super::pipeline_logger::PipelineLogger;
use super::pipeline_options::PipelineOptions;

/// Single-image pipeline: detect → anonymize (or blacken) → save in the
/// original orientation.
pub struct AnonymizeImageUseCase {
    anonymizer: Arc<dyn Anonymizer>,
    detection: DetectionStage,
    image_writer: Box<dyn ImageWriter>,
    options: PipelineOptions,
}

impl AnonymizeImageUseCase {
    pub fn new(
        anonymizer: Arc<dyn Anonymizer>,
        detection: DetectionStage,
        image_writer: Box<dyn ImageWriter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            anonymizer,
            detection,
            image_writer,
            options,
        }
    }

    /// Loads `input` rotated by `clockwise_rotation_index`, then runs [`Self::execute`].
    pub fn execute_path(
        &mut self,
        input: &Path,
        output: &Path,
        clockwise_rotation_index: i32,
        logger: &mut dyn PipelineLogger,
    ) -> BlanketResult<ImagePrimitive> {
        let image = ImagePrimitive::from_path(input, clockwise_rotation_index)?;
        self.execute(&image, output, logger)
    }

    pub fn execute(
        &mut self,
        image: &ImagePrimitive,
        output: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> BlanketResult<ImagePrimitive> {
        let source = image
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        let requirements = self.anonymizer.requirements();

        let t0 = Instant::now();
        let faces = self.detection.prepare(image.image(), requirements)?;
        logger.timing("detect", t0.elapsed().as_secs_f64() * 1000.0);

        let t1 = Instant::now();
        let no_detections = requirements.needs_faces() && faces.is_empty();
        if no_detections {
            logger.frame_without_detections(&source, image.image().index());
        }
        let anonymized = if no_detections && self.options.blacken_without_detections {
            let frame = image.image();
            image.with_image(Frame::black(
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.index(),
            ))
        } else {
            check_requirements(requirements, &faces)?;
            self.anonymizer.anonymize_image(image, &faces)?
        };
        logger.timing("anonymize", t1.elapsed().as_secs_f64() * 1000.0);

        let t2 = Instant::now();
        anonymized.save_image_with(
            self.image_writer.as_ref(),
            Some(output),
            true,
            self.options.restrict_access_to_saved,
        )?;
        logger.timing("write", t2.elapsed().as_secs_f64() * 1000.0);

        logger.anonymization_result(
            &source,
            &output.display().to_string(),
            &format!("{} faces", faces.len()),
        );
        Ok(anonymized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
    use crate::anonymization::infrastructure::black_box_anonymizer::BlackBoxAnonymizer;
    use crate::anonymization::infrastructure::facefusion_anonymizer::FacefusionAnonymizer;
    use crate::detection::domain::face_detection::FaceDetection;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::pipeline::pipeline_logger::{LogPipelineLogger, NullPipelineLogger};
    use crate::shared::error::BlanketError;
    use crate::video::infrastructure::image_file_writer::ImageFileWriter;
    use std::path::PathBuf;
    use std::sync::Mutex;

    // --- Stubs ---

    struct StubDetector {
        faces: Vec<FaceDetection>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
            Ok(self.faces.clone())
        }
    }

    struct RecordingImageWriter {
        written: Arc<Mutex<Vec<(PathBuf, Frame)>>>,
    }

    impl ImageWriter for RecordingImageWriter {
        fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), frame.clone()));
            Ok(())
        }
    }

    // --- Helpers ---

    fn black_box() -> Arc<dyn Anonymizer> {
        Arc::new(BlackBoxAnonymizer::new(AnonymizerSettings::default()).unwrap())
    }

    fn use_case(
        anonymizer: Arc<dyn Anonymizer>,
        faces: Vec<FaceDetection>,
        options: PipelineOptions,
    ) -> (AnonymizeImageUseCase, Arc<Mutex<Vec<(PathBuf, Frame)>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let use_case = AnonymizeImageUseCase::new(
            anonymizer,
            DetectionStage::new(Some(Box::new(StubDetector { faces })), None),
            Box::new(RecordingImageWriter {
                written: written.clone(),
            }),
            options,
        );
        (use_case, written)
    }

    /// 6x4 white canonical image rotated one quarter turn from its source.
    fn white_image() -> ImagePrimitive {
        ImagePrimitive::new(Frame::new(vec![255; 6 * 4 * 3], 6, 4, 3, 0), 1, None)
    }

    // --- Tests ---

    #[test]
    fn test_anonymizes_detected_faces_and_saves_in_original_orientation() {
        let (mut use_case, written) = use_case(
            black_box(),
            vec![FaceDetection::new([0.0, 0.0, 1.0, 1.0], Some(0.9))],
            PipelineOptions::default(),
        );

        let result = use_case
            .execute(&white_image(), Path::new("out/face.png"), &mut NullPipelineLogger)
            .unwrap();

        assert_eq!(&result.image().data()[..3], &[0, 0, 0]);
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, PathBuf::from("out/face.png"));
        assert_eq!((written[0].1.width(), written[0].1.height()), (4, 6));
    }

    #[test]
    fn test_blackens_image_without_detections() {
        let options = PipelineOptions {
            blacken_without_detections: true,
            ..PipelineOptions::default()
        };
        let (mut use_case, written) = use_case(black_box(), Vec::new(), options);
        let mut logger = LogPipelineLogger::new(1);

        use_case
            .execute(&white_image(), Path::new("out.png"), &mut logger)
            .unwrap();

        assert!(written.lock().unwrap()[0].1.data().iter().all(|&v| v == 0));
        assert_eq!(logger.frames_without_detections(), 1);
    }

    #[test]
    fn test_image_without_detections_passes_through_unblackened() {
        let (mut use_case, written) =
            use_case(black_box(), Vec::new(), PipelineOptions::default());

        use_case
            .execute(&white_image(), Path::new("out.png"), &mut NullPipelineLogger)
            .unwrap();

        assert!(written.lock().unwrap()[0].1.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_strategy_without_image_support_writes_nothing() {
        let facefusion: Arc<dyn Anonymizer> =
            Arc::new(FacefusionAnonymizer::new(AnonymizerSettings::default()).unwrap());
        let (mut use_case, written) = use_case(facefusion, Vec::new(), PipelineOptions::default());

        let err = use_case
            .execute(&white_image(), Path::new("out.png"), &mut NullPipelineLogger)
            .unwrap_err();

        assert!(matches!(err, BlanketError::Unsupported(_)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_detector_is_precondition_error() {
        let mut use_case = AnonymizeImageUseCase::new(
            black_box(),
            DetectionStage::empty(),
            Box::new(ImageFileWriter::new()),
            PipelineOptions::default(),
        );
        let err = use_case
            .execute(&white_image(), Path::new("out.png"), &mut NullPipelineLogger)
            .unwrap_err();
        assert!(matches!(err, BlanketError::Precondition(_)));
    }

    #[test]
    fn test_execute_path_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("anonymized").join("out.png");
        ImagePrimitive::new(Frame::new(vec![200; 8 * 5 * 3], 8, 5, 3, 0), 0, None)
            .save_image(Some(&input), false, false)
            .unwrap();

        let mut use_case = AnonymizeImageUseCase::new(
            black_box(),
            DetectionStage::new(
                Some(Box::new(StubDetector {
                    faces: vec![FaceDetection::new([1.0, 1.0, 3.0, 3.0], Some(0.9))],
                })),
                None,
            ),
            Box::new(ImageFileWriter::new()),
            PipelineOptions {
                restrict_access_to_saved: true,
                ..PipelineOptions::default()
            },
        );
        use_case
            .execute_path(&input, &output, 0, &mut NullPipelineLogger)
            .unwrap();

        let saved = image::open(&output).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (8, 5));
        assert_eq!(saved.get_pixel(2, 2).0, [0, 0, 0]);
        assert_eq!(saved.get_pixel(6, 4).0, [200, 200, 200]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&output).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
