use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::detection::domain::detection_stage::{DetectionStage, Requirements};
use crate::detection::domain::face_detection::FaceDetection;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::frame::Frame;
use crate::video::domain::image_primitive::ImagePrimitive;
use crate::video::domain::video_primitive::VideoPrimitive;
use crate::video::domain::video_writer::VideoWriter;

use super::anonymization_method::AnonymizationMethod;
use super::anonymizer_settings::AnonymizerSettings;

/// Everything a video-level anonymization run needs besides the strategy itself.
pub struct VideoJob<'a> {
    pub detection: &'a mut DetectionStage,
    pub writer: &'a mut dyn VideoWriter,
    pub logger: &'a mut dyn PipelineLogger,
    pub cancelled: &'a AtomicBool,
    /// Write an all-black frame when a frame has no detections.
    pub blacken_without_detections: bool,
}

/// One anonymization strategy.
///
/// Strategies receive images in canonical orientation and return a new
/// image in the same orientation. Whole-clip strategies override
/// [`Anonymizer::anonymize_video`]; everything else runs frame by frame.
pub trait Anonymizer: Send + Sync {
    fn method(&self) -> AnonymizationMethod;

    fn settings(&self) -> &AnonymizerSettings;

    /// Inputs the strategy needs before it runs, as built in.
    fn intrinsic_requirements(&self) -> Requirements;

    /// Built-in requirements overridden by the settings flags, when present.
    fn requirements(&self) -> Requirements {
        let intrinsic = self.intrinsic_requirements();
        let settings = self.settings();
        Requirements {
            face_detections: settings
                .requires_face_detections
                .unwrap_or(intrinsic.face_detections),
            facial_landmarks: settings
                .requires_facial_landmarks_detections
                .unwrap_or(intrinsic.facial_landmarks),
        }
    }

    fn anonymize_image(
        &self,
        image: &ImagePrimitive,
        faces: &[FaceDetection],
    ) -> BlanketResult<ImagePrimitive>;

    fn anonymize_video(
        &self,
        video: &mut VideoPrimitive,
        output: &Path,
        job: &mut VideoJob<'_>,
    ) -> BlanketResult<VideoPrimitive> {
        anonymize_frame_by_frame(self, video, output, job)
    }
}

/// Fails fast when a strategy's declared inputs are not satisfied.
pub fn check_requirements(
    requirements: Requirements,
    faces: &[FaceDetection],
) -> BlanketResult<()> {
    if requirements.facial_landmarks {
        if let Some(face) = faces.iter().find(|f| !f.has_landmarks()) {
            return Err(BlanketError::Precondition(format!(
                "facial landmarks required but missing for {face}"
            )));
        }
    }
    Ok(())
}

/// Pulls frames in order, anonymizes each one and writes it rotated back
/// to the original orientation.
///
/// The writer is closed on every exit path; the first error wins.
pub fn anonymize_frame_by_frame<A: Anonymizer + ?Sized>(
    anonymizer: &A,
    video: &mut VideoPrimitive,
    output: &Path,
    job: &mut VideoJob<'_>,
) -> BlanketResult<VideoPrimitive> {
    let metadata = video.metadata()?.clone();
    job.writer
        .open(output, &metadata)
        .map_err(|e| BlanketError::VideoSink(format!("failed to open {}: {e}", output.display())))?;

    let result = write_anonymized_frames(anonymizer, video, job, metadata.total_frames);
    let closed = job
        .writer
        .close()
        .map_err(|e| BlanketError::VideoSink(format!("failed to finalize {}: {e}", output.display())));

    result?;
    closed?;
    Ok(VideoPrimitive::new(output, 0))
}

fn write_anonymized_frames<A: Anonymizer + ?Sized>(
    anonymizer: &A,
    video: &mut VideoPrimitive,
    job: &mut VideoJob<'_>,
    total: usize,
) -> BlanketResult<()> {
    let requirements = anonymizer.requirements();
    let source = video.path().display().to_string();
    let mut opened = video.open()?;

    for (position, frame) in opened.frames().enumerate() {
        if job.cancelled.load(Ordering::Relaxed) {
            return Err(BlanketError::Cancelled);
        }
        let frame = frame?;

        let t0 = Instant::now();
        let faces = job.detection.prepare(frame.image(), requirements)?;
        job.logger
            .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);
        if requirements.needs_faces() && faces.is_empty() {
            job.logger.frame_without_detections(&source, position);
        }

        let t1 = Instant::now();
        let anonymized = if job.blacken_without_detections && faces.is_empty() {
            let image = frame.image();
            frame.with_image(Frame::black(
                image.width(),
                image.height(),
                image.channels(),
                image.index(),
            ))
        } else {
            check_requirements(requirements, &faces)?;
            anonymizer.anonymize_image(&frame, &faces)?
        };
        job.logger
            .timing("anonymize", t1.elapsed().as_secs_f64() * 1000.0);

        let t2 = Instant::now();
        let restored = anonymized.to_not_rotated_image()?;
        job.writer
            .write(restored.image())
            .map_err(|e| BlanketError::VideoSink(format!("failed to write frame {position}: {e}")))?;
        job.logger
            .timing("write", t2.elapsed().as_secs_f64() * 1000.0);

        job.logger.progress(position + 1, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::video_reader::VideoReader;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct StubReader {
        total: usize,
        closes: Arc<Mutex<usize>>,
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            Ok(VideoMetadata {
                width: 4,
                height: 2,
                fps: 10.0,
                total_frames: self.total,
                codec: String::new(),
                source_path: None,
            })
        }

        fn read_frame(&mut self, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
            Ok(Frame::new(vec![200; 4 * 2 * 3], 4, 2, 3, index))
        }

        fn close(&mut self) {
            *self.closes.lock().unwrap() += 1;
        }
    }

    #[derive(Default)]
    struct WriterLog {
        opened: Option<VideoMetadata>,
        frames: Vec<Frame>,
        closed: usize,
    }

    struct StubWriter {
        log: Arc<Mutex<WriterLog>>,
        fail_on_write: bool,
    }

    impl VideoWriter for StubWriter {
        fn open(
            &mut self,
            _path: &Path,
            metadata: &VideoMetadata,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.log.lock().unwrap().opened = Some(metadata.clone());
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail_on_write {
                return Err("disk full".into());
            }
            self.log.lock().unwrap().frames.push(frame.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    /// Reports one face on even frames only.
    struct EvenFrameDetector;

    impl FaceDetector for EvenFrameDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
            if frame.index() % 2 == 0 {
                Ok(vec![FaceDetection::new([0.0, 0.0, 1.0, 1.0], Some(0.9))])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Inverts pixels and records how many faces it saw per call.
    struct InvertingAnonymizer {
        settings: AnonymizerSettings,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl InvertingAnonymizer {
        fn new() -> Self {
            Self {
                settings: AnonymizerSettings::default(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Anonymizer for InvertingAnonymizer {
        fn method(&self) -> AnonymizationMethod {
            AnonymizationMethod::BlackBox
        }

        fn settings(&self) -> &AnonymizerSettings {
            &self.settings
        }

        fn intrinsic_requirements(&self) -> Requirements {
            Requirements::FACES
        }

        fn anonymize_image(
            &self,
            image: &ImagePrimitive,
            faces: &[FaceDetection],
        ) -> BlanketResult<ImagePrimitive> {
            self.calls.lock().unwrap().push(faces.len());
            let mut out = image.image().clone();
            out.data_mut().iter_mut().for_each(|v| *v = 255 - *v);
            Ok(image.with_image(out))
        }
    }

    fn video(total: usize, k: i32) -> (VideoPrimitive, Arc<Mutex<usize>>) {
        let closes = Arc::new(Mutex::new(0));
        let reader = StubReader {
            total,
            closes: closes.clone(),
        };
        (VideoPrimitive::with_reader("in.mp4", k, Box::new(reader)), closes)
    }

    fn run(
        anonymizer: &InvertingAnonymizer,
        video: &mut VideoPrimitive,
        writer: &mut StubWriter,
        cancelled: &AtomicBool,
        blacken: bool,
    ) -> BlanketResult<VideoPrimitive> {
        let mut detection = DetectionStage::new(Some(Box::new(EvenFrameDetector)), None);
        let mut logger = NullPipelineLogger;
        let mut job = VideoJob {
            detection: &mut detection,
            writer,
            logger: &mut logger,
            cancelled,
            blacken_without_detections: blacken,
        };
        anonymizer.anonymize_video(video, Path::new("out.mp4"), &mut job)
    }

    fn writer() -> (StubWriter, Arc<Mutex<WriterLog>>) {
        let log = Arc::new(Mutex::new(WriterLog::default()));
        (
            StubWriter {
                log: log.clone(),
                fail_on_write: false,
            },
            log,
        )
    }

    // ── Requirements ─────────────────────────────────────────────────

    #[test]
    fn test_settings_flags_override_intrinsic_requirements() {
        let mut anonymizer = InvertingAnonymizer::new();
        assert_eq!(anonymizer.requirements(), Requirements::FACES);

        anonymizer.settings.requires_facial_landmarks_detections = Some(true);
        assert_eq!(anonymizer.requirements(), Requirements::FACES_AND_LANDMARKS);

        anonymizer.settings.requires_face_detections = Some(false);
        anonymizer.settings.requires_facial_landmarks_detections = Some(false);
        assert_eq!(anonymizer.requirements(), Requirements::NONE);
    }

    #[test]
    fn test_check_requirements_rejects_faces_without_landmarks() {
        let faces = vec![FaceDetection::new([0.0, 0.0, 5.0, 5.0], None)];
        assert!(check_requirements(Requirements::FACES, &faces).is_ok());
        assert!(matches!(
            check_requirements(Requirements::FACES_AND_LANDMARKS, &faces),
            Err(BlanketError::Precondition(_))
        ));
    }

    // ── Frame-by-frame orchestration ─────────────────────────────────

    #[test]
    fn test_writes_every_frame_in_order() {
        let anonymizer = InvertingAnonymizer::new();
        let (mut video, closes) = video(4, 0);
        let (mut writer, log) = writer();

        let output = run(&anonymizer, &mut video, &mut writer, &AtomicBool::new(false), false)
            .unwrap();

        assert_eq!(output.path(), Path::new("out.mp4"));
        assert_eq!(output.clockwise_rotation_index(), 0);
        let log = log.lock().unwrap();
        let indices: Vec<usize> = log.frames.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(log.frames.iter().all(|f| f.data().iter().all(|&v| v == 55)));
        assert_eq!(log.closed, 1);
        assert_eq!(*closes.lock().unwrap(), 1);
        assert_eq!(*anonymizer.calls.lock().unwrap(), vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_frames_are_written_in_original_orientation() {
        let anonymizer = InvertingAnonymizer::new();
        let (mut video, _) = video(1, 1);
        let (mut writer, log) = writer();

        run(&anonymizer, &mut video, &mut writer, &AtomicBool::new(false), false).unwrap();

        let log = log.lock().unwrap();
        let opened = log.opened.as_ref().unwrap();
        assert_eq!((opened.width, opened.height), (4, 2));
        assert_eq!((log.frames[0].width(), log.frames[0].height()), (4, 2));
    }

    #[test]
    fn test_blackens_frames_without_detections() {
        let anonymizer = InvertingAnonymizer::new();
        let (mut video, _) = video(2, 0);
        let (mut writer, log) = writer();

        run(&anonymizer, &mut video, &mut writer, &AtomicBool::new(false), true).unwrap();

        let log = log.lock().unwrap();
        assert!(log.frames[0].data().iter().all(|&v| v == 55));
        assert!(log.frames[1].data().iter().all(|&v| v == 0));
        assert_eq!(*anonymizer.calls.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_cancellation_stops_and_closes_writer() {
        let anonymizer = InvertingAnonymizer::new();
        let (mut video, closes) = video(3, 0);
        let (mut writer, log) = writer();

        let err = run(&anonymizer, &mut video, &mut writer, &AtomicBool::new(true), false)
            .unwrap_err();

        assert!(matches!(err, BlanketError::Cancelled));
        assert!(log.lock().unwrap().frames.is_empty());
        assert_eq!(log.lock().unwrap().closed, 1);
        assert_eq!(*closes.lock().unwrap(), 1);
    }

    #[test]
    fn test_sink_failure_is_reported_and_writer_closed() {
        let anonymizer = InvertingAnonymizer::new();
        let (mut video, _) = video(2, 0);
        let (mut writer, log) = writer();
        writer.fail_on_write = true;

        let err = run(&anonymizer, &mut video, &mut writer, &AtomicBool::new(false), false)
            .unwrap_err();

        assert!(matches!(err, BlanketError::VideoSink(_)));
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_missing_detector_fails_fast() {
        let anonymizer = InvertingAnonymizer::new();
        let (mut video, _) = video(2, 0);
        let (mut writer, log) = writer();
        let mut detection = DetectionStage::empty();
        let mut logger = NullPipelineLogger;
        let cancelled = AtomicBool::new(false);
        let mut job = VideoJob {
            detection: &mut detection,
            writer: &mut writer,
            logger: &mut logger,
            cancelled: &cancelled,
            blacken_without_detections: false,
        };

        let err = anonymizer
            .anonymize_video(&mut video, Path::new("out.mp4"), &mut job)
            .unwrap_err();

        assert!(matches!(err, BlanketError::Precondition(_)));
        assert!(anonymizer.calls.lock().unwrap().is_empty());
        assert_eq!(log.lock().unwrap().closed, 1);
    }
}
