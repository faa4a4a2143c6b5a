pub mod json_detection_source;
