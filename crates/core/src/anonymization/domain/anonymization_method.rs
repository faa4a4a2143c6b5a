use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::error::BlanketError;

/// The fixed set of anonymization strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymizationMethod {
    BlackBox,
    GaussianBlur,
    Pixelation,
    StableDiffusion,
    Facefusion,
    StableDiffusionConditionedFacefusion,
}

impl AnonymizationMethod {
    pub const ALL: [AnonymizationMethod; 6] = [
        AnonymizationMethod::BlackBox,
        AnonymizationMethod::GaussianBlur,
        AnonymizationMethod::Pixelation,
        AnonymizationMethod::StableDiffusion,
        AnonymizationMethod::Facefusion,
        AnonymizationMethod::StableDiffusionConditionedFacefusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymizationMethod::BlackBox => "black_box",
            AnonymizationMethod::GaussianBlur => "gaussian_blur",
            AnonymizationMethod::Pixelation => "pixelation",
            AnonymizationMethod::StableDiffusion => "stable_diffusion",
            AnonymizationMethod::Facefusion => "facefusion",
            AnonymizationMethod::StableDiffusionConditionedFacefusion => {
                "stable_diffusion_conditioned_facefusion"
            }
        }
    }

    /// Name of the JSON parameters file inside the anonymizer parameters folder.
    pub fn parameters_file_name(&self) -> String {
        match self {
            AnonymizationMethod::StableDiffusion => "sdwebui_parameters.json".to_string(),
            AnonymizationMethod::StableDiffusionConditionedFacefusion => {
                "sdwebui_conditioned_facefusion_parameters.json".to_string()
            }
            other => format!("{}_parameters.json", other.as_str()),
        }
    }
}

impl fmt::Display for AnonymizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnonymizationMethod {
    type Err = BlanketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| {
                let available: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                BlanketError::Configuration(format!(
                    "unknown anonymization method '{s}', available: {}",
                    available.join(", ")
                ))
            })
    }
}
