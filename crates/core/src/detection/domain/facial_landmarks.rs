use std::sync::Arc;

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

use crate::geometry::rotation::Rotation;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::shape_cache::ShapeKeyedCell;

const MASK_ON: Luma<u8> = Luma([255]);

/// Pixel coordinates of facial landmarks in canonical orientation, with an
/// optional head orientation and per-landmark confidence.
///
/// The convex-hull mask is computed on first request and kept until it is
/// requested for a different image size.
#[derive(Clone, Debug)]
pub struct FacialLandmarksDetection {
    landmarks: Vec<(f64, f64)>,
    orientation: Option<Rotation>,
    confidence: Option<Vec<f64>>,
    mask: ShapeKeyedCell<(u32, u32), GrayImage>,
}

impl FacialLandmarksDetection {
    pub fn new(landmarks: Vec<(f64, f64)>) -> Self {
        Self {
            landmarks,
            orientation: None,
            confidence: None,
            mask: ShapeKeyedCell::new(),
        }
    }

    pub fn with_orientation(mut self, orientation: Rotation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_confidence(mut self, confidence: Vec<f64>) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn landmarks(&self) -> &[(f64, f64)] {
        &self.landmarks
    }

    pub fn orientation(&self) -> Option<&Rotation> {
        self.orientation.as_ref()
    }

    pub fn confidence(&self) -> Option<&[f64]> {
        self.confidence.as_deref()
    }

    pub fn get_specific_landmarks(&self, indices: &[usize]) -> BlanketResult<Vec<(f64, f64)>> {
        indices
            .iter()
            .map(|&i| {
                self.landmarks.get(i).copied().ok_or_else(|| {
                    BlanketError::Precondition(format!(
                        "landmark {i} requested but only {} present",
                        self.landmarks.len()
                    ))
                })
            })
            .collect()
    }

    /// Arithmetic mean of all landmarks, or of the selected ones.
    pub fn mean_point(&self, indices: Option<&[usize]>) -> BlanketResult<(f64, f64)> {
        let points = match indices {
            Some(indices) => self.get_specific_landmarks(indices)?,
            None => self.landmarks.clone(),
        };
        if points.is_empty() {
            return Err(BlanketError::Precondition(
                "cannot average an empty landmark set".into(),
            ));
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        Ok((sx / n, sy / n))
    }

    /// Binary mask (0 / 255) covering the convex hull of the landmarks.
    pub fn convex_hull_binary_mask(
        &self,
        width: u32,
        height: u32,
        force_recompute: bool,
    ) -> Arc<GrayImage> {
        let computed = self
            .mask
            .get_or_try_compute((width, height), force_recompute, || {
                Ok::<_, std::convert::Infallible>(self.render_hull(width, height))
            });
        match computed {
            Ok(mask) => mask,
            Err(never) => match never {},
        }
    }

    fn render_hull(&self, width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        let points: Vec<Point<i32>> = self
            .landmarks
            .iter()
            .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
            .collect();
        let hull = convex_hull(points.as_slice());

        match hull.as_slice() {
            [] => {}
            [p] => {
                if p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height {
                    mask.put_pixel(p.x as u32, p.y as u32, MASK_ON);
                }
            }
            [a, b] => draw_line_segment_mut(
                &mut mask,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                MASK_ON,
            ),
            polygon => draw_polygon_mut(&mut mask, polygon, MASK_ON),
        }
        mask
    }
}

impl PartialEq for FacialLandmarksDetection {
    fn eq(&self, other: &Self) -> bool {
        self.landmarks == other.landmarks
            && self.orientation == other.orientation
            && self.confidence == other.confidence
    }
}
