use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use nalgebra::Vector3;
use serde::Deserialize;

use crate::detection::domain::face_detection::FaceDetection;
use crate::detection::domain::face_detector::{FaceDetector, FacialLandmarksDetector};
use crate::detection::domain::facial_landmarks::FacialLandmarksDetection;
use crate::geometry::rotation::Rotation;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::frame::Frame;

#[derive(Deserialize)]
struct DetectionFile {
    frames: Vec<FrameRecord>,
}

#[derive(Deserialize)]
struct FrameRecord {
    frame_index: usize,
    #[serde(default)]
    faces: Vec<FaceRecord>,
}

#[derive(Deserialize)]
struct FaceRecord {
    /// `[left, top, right, bottom]` in canonical orientation.
    bbox: [f64; 4],
    confidence: Option<f64>,
    landmarks: Option<Vec<[f64; 2]>>,
    landmarks_confidence: Option<Vec<f64>>,
    /// Head orientation as a rotation vector.
    orientation: Option<[f64; 3]>,
}

impl FaceRecord {
    fn into_detection(self) -> FaceDetection {
        let detection = FaceDetection::new(self.bbox, self.confidence);
        let Some(points) = self.landmarks else {
            return detection;
        };
        let mut landmarks =
            FacialLandmarksDetection::new(points.into_iter().map(|[x, y]| (x, y)).collect());
        if let Some(confidence) = self.landmarks_confidence {
            landmarks = landmarks.with_confidence(confidence);
        }
        if let Some([x, y, z]) = self.orientation {
            landmarks = landmarks.with_orientation(Rotation::exp(Vector3::new(x, y, z)));
        }
        detection.with_landmarks(landmarks)
    }
}

/// Replays detections produced by an external detector, keyed by frame index.
///
/// Serves as both face and landmark detector: landmarks are looked up on
/// the recorded face that overlaps the queried face the most.
#[derive(Clone)]
pub struct JsonDetectionSource {
    frames: Arc<HashMap<usize, Vec<FaceDetection>>>,
}

impl JsonDetectionSource {
    pub fn new(frames: HashMap<usize, Vec<FaceDetection>>) -> Self {
        Self {
            frames: Arc::new(frames),
        }
    }

    pub fn from_path(path: &Path) -> BlanketResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BlanketError::io(path, e))?;
        Self::parse(&contents).map_err(|e| BlanketError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let file: DetectionFile = serde_json::from_str(json)?;
        let mut frames: HashMap<usize, Vec<FaceDetection>> = HashMap::new();
        for record in file.frames {
            frames
                .entry(record.frame_index)
                .or_default()
                .extend(record.faces.into_iter().map(FaceRecord::into_detection));
        }
        log::info!("Loaded precomputed detections for {} frames", frames.len());
        Ok(Self::new(frames))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FaceDetector for JsonDetectionSource {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        Ok(self.frames.get(&frame.index()).cloned().unwrap_or_default())
    }
}

impl FacialLandmarksDetector for JsonDetectionSource {
    fn detect_landmarks(
        &mut self,
        frame: &Frame,
        face: &FaceDetection,
    ) -> Result<FacialLandmarksDetection, Box<dyn std::error::Error>> {
        self.frames
            .get(&frame.index())
            .into_iter()
            .flatten()
            .filter_map(|recorded| {
                let iou = FaceDetection::intersection_over_union(recorded, face);
                recorded.landmarks().filter(|_| iou > 0.0).map(|l| (iou, l))
            })
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, landmarks)| landmarks.clone())
            .ok_or_else(|| {
                format!(
                    "no recorded landmarks for face {face} in frame {}",
                    frame.index()
                )
                .into()
            })
    }
}
