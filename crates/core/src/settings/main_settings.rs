use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::detection::domain::face_detection::MatchingMethod;
use crate::shared::error::{BlanketError, BlanketResult};

/// Where media comes from and where anonymized copies go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub input_folder: Option<PathBuf>,
    pub output_folder: Option<PathBuf>,
    pub restrict_access_to_saved: bool,
    pub clockwise_rotation_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub anonymizer_name: AnonymizationMethod,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            anonymizer_name: AnonymizationMethod::BlackBox,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonymizationSettings {
    pub blacken_without_detections: bool,
}

/// Consumed by the external evaluation tooling; carried here so one file
/// configures both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub detection_matching_method: MatchingMethod,
    pub min_iou: f64,
    pub max_center_distance: f64,
    pub evaluate_incorrect_redetections: bool,
    pub max_evaluated_frames: Option<usize>,
    pub evaluation_skipped_frames: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            detection_matching_method: MatchingMethod::default(),
            min_iou: 0.8,
            max_center_distance: 200.0,
            evaluate_incorrect_redetections: true,
            max_evaluated_frames: None,
            evaluation_skipped_frames: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub console_log_level: String,
    pub log_anonymization_result: bool,
    pub log_frames_without_detections: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            console_log_level: "info".to_string(),
            log_anonymization_result: true,
            log_frames_without_detections: true,
        }
    }
}

/// Top-level configuration. Every section is optional and unknown keys are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainSettings {
    pub input_settings: InputSettings,
    pub module_settings: ModuleSettings,
    pub anonymization_settings: AnonymizationSettings,
    pub evaluation_settings: EvaluationSettings,
    pub logging_settings: LoggingSettings,
}

impl MainSettings {
    /// Reads settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> BlanketResult<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Settings file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(BlanketError::io(path, e)),
        };
        serde_json::from_str(&json).map_err(|e| {
            BlanketError::Configuration(format!("invalid settings file {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> BlanketResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BlanketError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BlanketError::InvalidState(format!("failed to serialize settings: {e}")))?;
        fs::write(path, json).map_err(|e| BlanketError::io(path, e))
    }
}
