use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::anonymization::domain::padding::PaddingMethod;
use crate::detection::domain::detection_stage::Requirements;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::video::domain::image_primitive::ImagePrimitive;

use super::sdwebui_client::{InpaintRequest, InpaintingClient, SdWebUiClient, SdWebUiConfig};

/// Mask-guided inpainting of each face through an external diffusion service.
///
/// Faces are processed one after another; each request starts from the
/// previous face's result.
pub struct StableDiffusionAnonymizer {
    settings: AnonymizerSettings,
    padding: PaddingMethod,
    client: Box<dyn InpaintingClient>,
}

impl StableDiffusionAnonymizer {
    pub fn new(settings: AnonymizerSettings) -> BlanketResult<Self> {
        let client = SdWebUiClient::new(SdWebUiConfig::from_settings(&settings)?)?;
        Self::with_client(settings, Box::new(client))
    }

    pub fn with_client(
        settings: AnonymizerSettings,
        client: Box<dyn InpaintingClient>,
    ) -> BlanketResult<Self> {
        Ok(Self {
            padding: PaddingMethod::from_settings(&settings)?,
            settings,
            client,
        })
    }

    pub fn padding(&self) -> PaddingMethod {
        self.padding
    }
}

impl Anonymizer for StableDiffusionAnonymizer {
    fn method(&self) -> AnonymizationMethod {
        AnonymizationMethod::StableDiffusion
    }

    fn settings(&self) -> &AnonymizerSettings {
        &self.settings
    }

    fn intrinsic_requirements(&self) -> Requirements {
        Requirements::FACES_AND_LANDMARKS
    }

    fn anonymize_image(
        &self,
        image: &ImagePrimitive,
        faces: &[FaceDetection],
    ) -> BlanketResult<ImagePrimitive> {
        let mut current = image.image().clone();
        let (w, h) = (current.width(), current.height());

        for face in faces {
            let mask = face.create_mask(w, h)?;
            let padding = self.padding.padding_for(face);
            log::debug!("Inpainting {face} with padding {padding}");

            let result = self.client.inpaint(&InpaintRequest {
                image: &current,
                mask: &mask,
                padding,
            })?;
            if (result.width(), result.height()) != (w, h) {
                return Err(BlanketError::external(
                    format!(
                        "inpainting returned {}x{} for a {w}x{h} image",
                        result.width(),
                        result.height()
                    ),
                    false,
                ));
            }
            current = result.with_index(current.index());
        }
        Ok(image.with_image(current))
    }
}
