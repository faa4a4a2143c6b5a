use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::{Anonymizer, VideoJob};
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::anonymization::domain::clip_synthesizer::ClipSynthesizer;
use crate::detection::domain::detection_stage::Requirements;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::video::domain::image_primitive::ImagePrimitive;
use crate::video::domain::video_primitive::VideoPrimitive;

const REFERENCE_FILE_NAME: &str = "reference.png";

/// Decides whether an inpainted frame is good enough to seed synthesis.
pub type AcceptanceFn = Box<dyn Fn(&ImagePrimitive, &[FaceDetection]) -> bool + Send + Sync>;

/// Inpaints frames until one is accepted, then synthesizes the whole clip
/// with that frame as the reference face.
pub struct ConditionedFacefusionAnonymizer {
    settings: AnonymizerSettings,
    inpainter: Arc<dyn Anonymizer>,
    synthesizer: Arc<dyn ClipSynthesizer>,
    acceptance: AcceptanceFn,
    max_seed_attempts: Option<usize>,
}

impl ConditionedFacefusionAnonymizer {
    pub fn new(
        settings: AnonymizerSettings,
        inpainter: Arc<dyn Anonymizer>,
        synthesizer: Arc<dyn ClipSynthesizer>,
    ) -> BlanketResult<Self> {
        let max_seed_attempts = settings.extra::<usize>("max_seed_attempts")?;
        Ok(Self {
            settings,
            inpainter,
            synthesizer,
            acceptance: Box::new(|_, faces| !faces.is_empty()),
            max_seed_attempts,
        })
    }

    pub fn with_acceptance(
        mut self,
        acceptance: impl Fn(&ImagePrimitive, &[FaceDetection]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.acceptance = Box::new(acceptance);
        self
    }

    /// Walks the video until a frame is inpainted and accepted, saving it to
    /// `reference`. Returns the number of frames examined on failure.
    fn find_seed(
        &self,
        video: &mut VideoPrimitive,
        reference: &Path,
        job: &mut VideoJob<'_>,
    ) -> BlanketResult<Result<(), usize>> {
        // Both the composite's flags and the inpainter's own needs apply.
        let requirements = self.requirements().union(self.inpainter.requirements());
        let source = video.path().display().to_string();
        let mut opened = video.open()?;
        let mut attempts = 0;

        for frame in opened.frames() {
            if job.cancelled.load(Ordering::Relaxed) {
                return Err(BlanketError::Cancelled);
            }
            if self.max_seed_attempts.is_some_and(|max| attempts >= max) {
                break;
            }
            let frame = frame?;
            attempts += 1;

            let faces = job.detection.prepare(frame.image(), requirements)?;
            if faces.is_empty() {
                job.logger
                    .frame_without_detections(&source, frame.image().index());
                continue;
            }

            match self.inpainter.anonymize_image(&frame, &faces) {
                Ok(candidate) if (self.acceptance)(&candidate, &faces) => {
                    candidate.save_image(Some(reference), false, true)?;
                    job.logger.info(&format!(
                        "Seed frame {} accepted after {attempts} attempts",
                        frame.image().index()
                    ));
                    return Ok(Ok(()));
                }
                Ok(_) => log::debug!("Seed frame {} rejected", frame.image().index()),
                Err(e) if e.is_retryable() => {
                    log::warn!("Inpainting frame {} failed, trying next: {e}", frame.image().index())
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Err(attempts))
    }
}

impl Anonymizer for ConditionedFacefusionAnonymizer {
    fn method(&self) -> AnonymizationMethod {
        AnonymizationMethod::StableDiffusionConditionedFacefusion
    }

    fn settings(&self) -> &AnonymizerSettings {
        &self.settings
    }

    fn intrinsic_requirements(&self) -> Requirements {
        Requirements::FACES_AND_LANDMARKS
    }

    fn anonymize_image(
        &self,
        _image: &ImagePrimitive,
        _faces: &[FaceDetection],
    ) -> BlanketResult<ImagePrimitive> {
        Err(BlanketError::Unsupported(
            "stable diffusion conditioned facefusion image anonymization".into(),
        ))
    }

    fn anonymize_video(
        &self,
        video: &mut VideoPrimitive,
        output: &Path,
        job: &mut VideoJob<'_>,
    ) -> BlanketResult<VideoPrimitive> {
        let seed_dir = tempfile::tempdir()
            .map_err(|e| BlanketError::io(std::env::temp_dir(), e))?;
        let reference = seed_dir.path().join(REFERENCE_FILE_NAME);

        if let Err(attempts) = self.find_seed(video, &reference, job)? {
            return Err(BlanketError::NoAcceptableReference { attempts });
        }
        self.synthesizer.synthesize(&reference, video.path(), output)
    }
}
