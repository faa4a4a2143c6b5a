use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::facial_landmarks::FacialLandmarksDetection;
use crate::shared::error::{BlanketError, BlanketResult};

/// How detections of consecutive frames are paired by the evaluation side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMethod {
    #[default]
    IntersectionOverUnion,
    Distance,
    Confidence,
}

/// An axis-aligned face box `[left, top, right, bottom]` in canonical
/// orientation, optionally carrying the face's landmarks.
///
/// Coordinates are rounded half-to-even on construction. Boxes with
/// `left > right` or `top > bottom` are accepted as given.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    left_top_right_bottom: [i32; 4],
    confidence: Option<f64>,
    landmarks: Option<FacialLandmarksDetection>,
}

impl FaceDetection {
    pub fn new(left_top_right_bottom: [f64; 4], confidence: Option<f64>) -> Self {
        Self {
            left_top_right_bottom: left_top_right_bottom.map(|v| v.round_ties_even() as i32),
            confidence,
            landmarks: None,
        }
    }

    pub fn from_left_top_width_height(ltwh: [f64; 4], confidence: Option<f64>) -> Self {
        let [left, top, width, height] = ltwh;
        Self::new([left, top, left + width, top + height], confidence)
    }

    pub fn with_landmarks(mut self, landmarks: FacialLandmarksDetection) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn attach_landmarks(&mut self, landmarks: FacialLandmarksDetection) {
        self.landmarks = Some(landmarks);
    }

    pub fn landmarks(&self) -> Option<&FacialLandmarksDetection> {
        self.landmarks.as_ref()
    }

    pub fn has_landmarks(&self) -> bool {
        self.landmarks.is_some()
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn left_top_right_bottom(&self) -> [i32; 4] {
        self.left_top_right_bottom
    }

    pub fn left_top_width_height(&self) -> [i32; 4] {
        [self.left(), self.top(), self.width(), self.height()]
    }

    pub fn left(&self) -> i32 {
        self.left_top_right_bottom[0]
    }

    pub fn top(&self) -> i32 {
        self.left_top_right_bottom[1]
    }

    pub fn right(&self) -> i32 {
        self.left_top_right_bottom[2]
    }

    pub fn bottom(&self) -> i32 {
        self.left_top_right_bottom[3]
    }

    pub fn width(&self) -> i32 {
        self.right() - self.left()
    }

    pub fn height(&self) -> i32 {
        self.bottom() - self.top()
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Integer center, rounded toward negative infinity.
    pub fn center(&self) -> (i32, i32) {
        (
            (self.left() + self.right()).div_euclid(2),
            (self.top() + self.bottom()).div_euclid(2),
        )
    }

    pub fn intersection_over_union(a: &FaceDetection, b: &FaceDetection) -> f64 {
        let iw = (a.right().min(b.right()) - a.left().max(b.left())).max(0) as i64;
        let ih = (a.bottom().min(b.bottom()) - a.top().max(b.top())).max(0) as i64;
        let intersection = iw * ih;
        let union = a.area() + b.area() - intersection;
        if union > 0 {
            intersection as f64 / union as f64
        } else {
            0.0
        }
    }

    pub fn center_distance(a: &FaceDetection, b: &FaceDetection) -> f64 {
        let (ax, ay) = a.center();
        let (bx, by) = b.center();
        ((ax - bx) as f64).hypot((ay - by) as f64)
    }

    /// Convex-hull mask of the attached landmarks for an image of the given size.
    pub fn create_mask(&self, width: u32, height: u32) -> BlanketResult<Arc<GrayImage>> {
        let landmarks = self.landmarks.as_ref().ok_or_else(|| {
            BlanketError::Precondition("cannot create mask without landmarks".into())
        })?;
        Ok(landmarks.convex_hull_binary_mask(width, height, false))
    }
}

impl std::fmt::Display for FaceDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FaceDetection(ltrb={:?}, confidence={:?})",
            self.left_top_right_bottom, self.confidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn ltrb(l: f64, t: f64, r: f64, b: f64) -> FaceDetection {
        FaceDetection::new([l, t, r, b], None)
    }

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn test_from_left_top_width_height() {
        let det = FaceDetection::from_left_top_width_height([10.0, 20.0, 30.0, 40.0], Some(0.9));
        assert_eq!(det.left(), 10);
        assert_eq!(det.top(), 20);
        assert_eq!(det.right(), 40);
        assert_eq!(det.bottom(), 60);
        assert_eq!(det.width(), 30);
        assert_eq!(det.height(), 40);
        assert_eq!(det.area(), 1200);
        assert_eq!(det.confidence(), Some(0.9));
        assert_eq!(det.left_top_width_height(), [10, 20, 30, 40]);
    }

    #[rstest]
    #[case::half_down(2.5, 2)]
    #[case::half_up(3.5, 4)]
    #[case::below_half(1.4, 1)]
    #[case::negative_half(-0.5, 0)]
    fn test_coordinates_round_half_to_even(#[case] value: f64, #[case] expected: i32) {
        assert_eq!(ltrb(value, 0.0, 10.0, 10.0).left(), expected);
    }

    #[test]
    fn test_center_floors() {
        assert_eq!(ltrb(0.0, 0.0, 5.0, 3.0).center(), (2, 1));
        assert_eq!(ltrb(-3.0, -3.0, 0.0, 0.0).center(), (-2, -2));
    }

    #[test]
    fn test_inverted_box_is_accepted() {
        let det = ltrb(10.0, 10.0, 0.0, 0.0);
        assert_eq!(det.width(), -10);
        assert_eq!(det.area(), 100);
    }

    // ── IoU ──────────────────────────────────────────────────────────

    #[test]
    fn test_iou_identical_is_one() {
        let a = ltrb(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(FaceDetection::intersection_over_union(&a, &a), 1.0);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = ltrb(0.0, 0.0, 10.0, 10.0);
        let b = ltrb(20.0, 20.0, 30.0, 30.0);
        assert_eq!(FaceDetection::intersection_over_union(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_touching_edges_is_zero() {
        let a = ltrb(0.0, 0.0, 10.0, 10.0);
        let b = ltrb(10.0, 0.0, 20.0, 10.0);
        assert_eq!(FaceDetection::intersection_over_union(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = ltrb(0.0, 0.0, 10.0, 10.0);
        let b = ltrb(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert_relative_eq!(FaceDetection::intersection_over_union(&a, &b), 1.0 / 3.0);
    }

    #[test]
    fn test_iou_zero_area_boxes_do_not_divide_by_zero() {
        let a = ltrb(5.0, 5.0, 5.0, 5.0);
        assert_eq!(FaceDetection::intersection_over_union(&a, &a), 0.0);
    }

    // ── Distance ─────────────────────────────────────────────────────

    #[test]
    fn test_center_distance() {
        let a = ltrb(0.0, 0.0, 10.0, 10.0);
        let b = ltrb(6.0, 8.0, 16.0, 18.0);
        assert_relative_eq!(FaceDetection::center_distance(&a, &b), 10.0);
        assert_relative_eq!(FaceDetection::center_distance(&a, &a), 0.0);
    }

    // ── Mask ─────────────────────────────────────────────────────────

    #[test]
    fn test_create_mask_without_landmarks_fails() {
        let err = ltrb(0.0, 0.0, 4.0, 4.0).create_mask(8, 8).unwrap_err();
        assert!(matches!(err, BlanketError::Precondition(_)));
    }

    #[test]
    fn test_create_mask_uses_landmarks() {
        let landmarks =
            FacialLandmarksDetection::new(vec![(1.0, 1.0), (6.0, 1.0), (6.0, 6.0), (1.0, 6.0)]);
        let det = ltrb(1.0, 1.0, 6.0, 6.0).with_landmarks(landmarks);
        let mask = det.create_mask(8, 8).unwrap();
        assert_eq!(mask.dimensions(), (8, 8));
        assert_eq!(mask.get_pixel(3, 3)[0], 255);
        assert_eq!(mask.get_pixel(7, 7)[0], 0);
    }

    #[test]
    fn test_attach_landmarks() {
        let mut det = ltrb(0.0, 0.0, 4.0, 4.0);
        assert!(!det.has_landmarks());
        det.attach_landmarks(FacialLandmarksDetection::new(vec![(1.0, 1.0)]));
        assert!(det.has_landmarks());
    }

    #[test]
    fn test_matching_method_deserializes_snake_case() {
        let method: MatchingMethod = serde_json::from_str("\"intersection_over_union\"").unwrap();
        assert_eq!(method, MatchingMethod::IntersectionOverUnion);
        let method: MatchingMethod = serde_json::from_str("\"distance\"").unwrap();
        assert_eq!(method, MatchingMethod::Distance);
    }
}
