use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::{BlanketError, BlanketResult};

use super::anonymizer_settings::AnonymizerSettings;

const DEFAULT_PADDING_METHOD: &str = "ratio";
const DEFAULT_PADDING_RATIO: f64 = 0.25;
const DEFAULT_PADDING_CONSTANT: u32 = 32;

/// Margin added around a face before an inpainting request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaddingMethod {
    /// Fraction of the longer box side.
    Ratio(f64),
    /// Fixed number of pixels.
    Constant(u32),
}

impl PaddingMethod {
    /// Reads `padding_method`, `padding_ratio` and `padding_constant` from the
    /// strategy's extra parameters.
    pub fn from_settings(settings: &AnonymizerSettings) -> BlanketResult<Self> {
        let method: String = settings.extra_or("padding_method", DEFAULT_PADDING_METHOD.to_string())?;
        let ratio = settings.extra_or("padding_ratio", DEFAULT_PADDING_RATIO)?;
        let constant = settings.extra_or("padding_constant", DEFAULT_PADDING_CONSTANT)?;
        Self::parse(&method, ratio, constant)
    }

    pub fn parse(method: &str, ratio: f64, constant: u32) -> BlanketResult<Self> {
        match method {
            "ratio" => Ok(PaddingMethod::Ratio(ratio)),
            "constant" => Ok(PaddingMethod::Constant(constant)),
            other => Err(BlanketError::Configuration(format!(
                "unknown padding method '{other}', expected 'ratio' or 'constant'"
            ))),
        }
    }

    pub fn padding_for(&self, face: &FaceDetection) -> u32 {
        match *self {
            PaddingMethod::Ratio(ratio) => {
                let side = face.width().max(face.height()).max(0) as f64;
                (ratio * side).round().max(0.0) as u32
            }
            PaddingMethod::Constant(constant) => constant,
        }
    }
}

impl Default for PaddingMethod {
    fn default() -> Self {
        PaddingMethod::Ratio(DEFAULT_PADDING_RATIO)
    }
}
