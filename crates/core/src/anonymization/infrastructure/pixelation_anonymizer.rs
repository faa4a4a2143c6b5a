use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};

use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::detection::domain::detection_stage::Requirements;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::video::domain::image_primitive::ImagePrimitive;

use super::roi::{extract_roi, write_roi_back, RoiRect};

const DEFAULT_PIXEL_SIZE: usize = 16;

/// Replaces each face box with a coarse mosaic of `pixel_size` blocks.
pub struct PixelationAnonymizer {
    settings: AnonymizerSettings,
    pixel_size: usize,
}

impl PixelationAnonymizer {
    pub fn new(settings: AnonymizerSettings) -> BlanketResult<Self> {
        let pixel_size: usize = settings.extra_or("pixel_size", DEFAULT_PIXEL_SIZE)?;
        if pixel_size == 0 {
            return Err(BlanketError::Configuration(
                "pixel_size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            settings,
            pixel_size,
        })
    }

    /// Size of the intermediate mosaic for a `w x h` region.
    pub fn mosaic_size(&self, w: usize, h: usize) -> (usize, usize) {
        ((w / self.pixel_size).max(1), (h / self.pixel_size).max(1))
    }
}

impl Anonymizer for PixelationAnonymizer {
    fn method(&self) -> AnonymizationMethod {
        AnonymizationMethod::Pixelation
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
            let mosaic = self.mosaic_size(rect.w, rect.h);
            let region = std::mem::take(&mut roi);
            let pixelated = match channels {
                1 => mosaic_of::<Luma<u8>>(region, (rect.w, rect.h), mosaic),
                3 => mosaic_of::<Rgb<u8>>(region, (rect.w, rect.h), mosaic),
                4 => mosaic_of::<Rgba<u8>>(region, (rect.w, rect.h), mosaic),
                other => {
                    return Err(BlanketError::Unsupported(format!(
                        "pixelation of {other}-channel frames"
                    )))
                }
            }
            .ok_or_else(|| BlanketError::InvalidState("region buffer does not match its size".into()))?;
            write_roi_back(data, &pixelated, fw as usize, channels, rect);
        }
        Ok(image.with_image(frame))
    }
}

/// Downsamples `region` to `mosaic` with a triangle filter, then scales it
/// back up with nearest-neighbour sampling.
fn mosaic_of<P>(region: Vec<u8>, size: (usize, usize), mosaic: (usize, usize)) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let buffer = ImageBuffer::<P, Vec<u8>>::from_raw(size.0 as u32, size.1 as u32, region)?;
    let small = imageops::resize(&buffer, mosaic.0 as u32, mosaic.1 as u32, FilterType::Triangle);
    let blocks = imageops::resize(&small, size.0 as u32, size.1 as u32, FilterType::Nearest);
    Some(blocks.into_raw())
}
