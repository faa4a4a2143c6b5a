use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::shared::error::{BlanketError, BlanketResult};

/// Strategy-agnostic settings shared by every anonymizer.
///
/// Keys not declared here land in `extra_parameters` and are the only
/// channel for strategy-specific knobs (server address, payload, padding).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonymizerSettings {
    pub model_name: String,
    pub model_path: String,
    pub requires_face_detections: Option<bool>,
    pub requires_facial_landmarks_detections: Option<bool>,
    #[serde(flatten)]
    pub extra_parameters: serde_json::Map<String, serde_json::Value>,
}

impl AnonymizerSettings {
    /// Loads settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> BlanketResult<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "Anonymizer parameters file {} not found, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(BlanketError::io(path, e)),
        };
        Self::parse(&json).map_err(|e| {
            BlanketError::Configuration(format!("invalid parameters file {}: {e}", path.display()))
        })
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra_parameters.insert(key.to_string(), value);
        self
    }

    /// Typed view of an extra parameter. A present key of the wrong type is
    /// a configuration error.
    pub fn extra<T: DeserializeOwned>(&self, key: &str) -> BlanketResult<Option<T>> {
        match self.extra_parameters.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                BlanketError::Configuration(format!("invalid value for '{key}': {e}"))
            }),
        }
    }

    pub fn extra_or<T: DeserializeOwned>(&self, key: &str, default: T) -> BlanketResult<T> {
        Ok(self.extra(key)?.unwrap_or(default))
    }
}
