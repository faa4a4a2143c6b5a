pub mod anonymization_method;
pub mod anonymizer;
pub mod anonymizer_settings;
pub mod clip_synthesizer;
pub mod padding;
