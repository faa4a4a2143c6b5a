use crate::shared::frame::Frame;

use super::face_detection::FaceDetection;
use super::facial_landmarks::FacialLandmarksDetection;

/// Domain interface for face detection on a canonical-orientation frame.
///
/// Implementations may be stateful (e.g., tracking across frames),
/// hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>>;
}

/// Domain interface for landmark inference on one detected face.
pub trait FacialLandmarksDetector: Send {
    fn detect_landmarks(
        &mut self,
        frame: &Frame,
        face: &FaceDetection,
    ) -> Result<FacialLandmarksDetection, Box<dyn std::error::Error>>;
}
