use crate::settings::main_settings::MainSettings;

/// Per-run switches shared by the image, video and batch use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    /// Replace frames without detections by black frames instead of
    /// passing them to the strategy.
    pub blacken_without_detections: bool,
    /// Restrict saved outputs to the owner (unix mode `0o700`).
    pub restrict_access_to_saved: bool,
}

impl PipelineOptions {
    pub fn from_settings(settings: &MainSettings) -> Self {
        Self {
            blacken_without_detections: settings.anonymization_settings.blacken_without_detections,
            restrict_access_to_saved: settings.input_settings.restrict_access_to_saved,
        }
    }
}
