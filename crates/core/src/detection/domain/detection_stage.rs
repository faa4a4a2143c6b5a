use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::frame::Frame;

use super::face_detection::FaceDetection;
use super::face_detector::{FaceDetector, FacialLandmarksDetector};

/// Inputs a strategy needs before it can run on a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Requirements {
    pub face_detections: bool,
    pub facial_landmarks: bool,
}

impl Requirements {
    pub const NONE: Requirements = Requirements {
        face_detections: false,
        facial_landmarks: false,
    };
    pub const FACES: Requirements = Requirements {
        face_detections: true,
        facial_landmarks: false,
    };
    pub const FACES_AND_LANDMARKS: Requirements = Requirements {
        face_detections: true,
        facial_landmarks: true,
    };

    pub fn needs_faces(&self) -> bool {
        self.face_detections || self.facial_landmarks
    }

    /// Everything either side needs.
    pub fn union(self, other: Requirements) -> Requirements {
        Requirements {
            face_detections: self.face_detections || other.face_detections,
            facial_landmarks: self.facial_landmarks || other.facial_landmarks,
        }
    }
}

/// Runs the external detectors a strategy requires on a canonical frame.
///
/// Landmarks are only inferred for faces that arrive without them.
pub struct DetectionStage {
    face_detector: Option<Box<dyn FaceDetector>>,
    landmarks_detector: Option<Box<dyn FacialLandmarksDetector>>,
}

impl DetectionStage {
    pub fn new(
        face_detector: Option<Box<dyn FaceDetector>>,
        landmarks_detector: Option<Box<dyn FacialLandmarksDetector>>,
    ) -> Self {
        Self {
            face_detector,
            landmarks_detector,
        }
    }

    /// A stage without collaborators; only strategies requiring nothing can use it.
    pub fn empty() -> Self {
        Self::new(None, None)
    }

    pub fn prepare(
        &mut self,
        frame: &Frame,
        requirements: Requirements,
    ) -> BlanketResult<Vec<FaceDetection>> {
        if !requirements.needs_faces() {
            return Ok(Vec::new());
        }
        let detector = self.face_detector.as_mut().ok_or_else(|| {
            BlanketError::Precondition("face detections required but no face detector configured".into())
        })?;
        if requirements.facial_landmarks && self.landmarks_detector.is_none() {
            return Err(BlanketError::Precondition(
                "facial landmarks required but no landmarks detector configured".into(),
            ));
        }

        let mut faces = detector
            .detect(frame)
            .map_err(|e| BlanketError::Detector(e.to_string()))?;

        if requirements.facial_landmarks {
            if let Some(landmarks_detector) = self.landmarks_detector.as_mut() {
                for face in faces.iter_mut().filter(|f| !f.has_landmarks()) {
                    let landmarks = landmarks_detector
                        .detect_landmarks(frame, face)
                        .map_err(|e| BlanketError::Detector(e.to_string()))?;
                    face.attach_landmarks(landmarks);
                }
            }
        }
        Ok(faces)
    }
}

impl Default for DetectionStage {
    fn default() -> Self {
        Self::empty()
    }
}
