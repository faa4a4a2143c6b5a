pub mod detection_stage;
pub mod face_detection;
pub mod face_detector;
pub mod facial_landmarks;
