use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::detection::domain::detection_stage::Requirements;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::video::domain::image_primitive::ImagePrimitive;

use super::gaussian;
use super::roi::{extract_roi, write_roi_back, RoiRect};

/// Default kernel size for Gaussian blur.
const DEFAULT_KERNEL_SIZE: usize = 31;

/// Blurs each face box independently; pixels outside the box do not bleed in.
pub struct GaussianBlurAnonymizer {
    settings: AnonymizerSettings,
    kernel: Vec<f32>,
}

impl GaussianBlurAnonymizer {
    pub fn new(settings: AnonymizerSettings) -> BlanketResult<Self> {
        let kernel_size: usize = settings.extra_or("kernel_size", DEFAULT_KERNEL_SIZE)?;
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(BlanketError::Configuration(format!(
                "kernel_size must be a positive odd number, got {kernel_size}"
            )));
        }
        let sigma: f64 = settings.extra_or("sigma", 0.0)?;
        Ok(Self {
            kernel: gaussian::gaussian_kernel_1d(kernel_size, sigma),
            settings,
        })
    }
}

impl Anonymizer for GaussianBlurAnonymizer {
    fn method(&self) -> AnonymizationMethod {
        AnonymizationMethod::GaussianBlur
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
        let mut frame = image.image().clone();
        let (fw, fh) = (frame.width(), frame.height());
        let channels = frame.channels() as usize;
        let data = frame.data_mut();
        let mut roi = Vec::new();

        for face in faces {
            let rect = RoiRect::from_face(face, fw, fh);
            if rect.is_empty() {
                continue;
            }
            extract_roi(data, fw as usize, channels, rect, &mut roi);
            gaussian::separable_gaussian_blur(&mut roi, rect.w, rect.h, channels, &self.kernel);
            write_roi_back(data, &roi, fw as usize, channels, rect);
        }
        Ok(image.with_image(frame))
    }
}
