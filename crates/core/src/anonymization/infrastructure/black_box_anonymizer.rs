use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::detection::domain::detection_stage::Requirements;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::BlanketResult;
use crate::video::domain::image_primitive::ImagePrimitive;

use super::roi::{fill_roi, RoiRect};

const DEFAULT_FILL_COLOR: [u8; 3] = [0, 0, 0];

/// Paints an opaque rectangle over every face box, edges included.
pub struct BlackBoxAnonymizer {
    settings: AnonymizerSettings,
    fill_color: [u8; 3],
}

impl BlackBoxAnonymizer {
    pub fn new(settings: AnonymizerSettings) -> BlanketResult<Self> {
        let fill_color = settings.extra_or("fill_color", DEFAULT_FILL_COLOR)?;
        Ok(Self {
            settings,
            fill_color,
        })
    }
}

impl Anonymizer for BlackBoxAnonymizer {
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
        let mut frame = image.image().clone();
        let (fw, fh) = (frame.width(), frame.height());
        let channels = frame.channels() as usize;
        let data = frame.data_mut();

        for face in faces {
            let rect = RoiRect::from_face_inclusive(face, fw, fh);
            if !rect.is_empty() {
                fill_roi(data, fw as usize, channels, rect, &self.fill_color);
            }
        }
        Ok(image.with_image(frame))
    }
}
