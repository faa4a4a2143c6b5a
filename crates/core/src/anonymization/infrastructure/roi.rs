use crate::detection::domain::face_detection::FaceDetection;

/// Region of interest within a frame, already clamped to the frame bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl RoiRect {
    /// Half-open box `[left, right) x [top, bottom)` clipped to the frame.
    /// Inverted boxes produce an empty region.
    pub fn from_face(face: &FaceDetection, frame_width: u32, frame_height: u32) -> Self {
        let (x0, x1) = clamp_span(face.left(), face.right(), frame_width);
        let (y0, y1) = clamp_span(face.top(), face.bottom(), frame_height);
        Self {
            x: x0,
            y: y0,
            w: x1.saturating_sub(x0),
            h: y1.saturating_sub(y0),
        }
    }

    /// Closed box including the right and bottom edges, corners in any order.
    pub fn from_face_inclusive(face: &FaceDetection, frame_width: u32, frame_height: u32) -> Self {
        let (l, r) = (face.left().min(face.right()), face.left().max(face.right()));
        let (t, b) = (face.top().min(face.bottom()), face.top().max(face.bottom()));
        let (x0, x1) = clamp_span(l, r.saturating_add(1), frame_width);
        let (y0, y1) = clamp_span(t, b.saturating_add(1), frame_height);
        Self {
            x: x0,
            y: y0,
            w: x1.saturating_sub(x0),
            h: y1.saturating_sub(y0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

fn clamp_span(start: i32, end: i32, limit: u32) -> (usize, usize) {
    let limit = limit as i64;
    let clamp = |v: i32| (v as i64).clamp(0, limit) as usize;
    (clamp(start), clamp(end))
}

/// Extract a rectangular ROI from frame data into a reusable buffer.
pub fn extract_roi(data: &[u8], frame_width: usize, channels: usize, rect: RoiRect, roi: &mut Vec<u8>) {
    let row_len = rect.w * channels;
    roi.resize(row_len * rect.h, 0);
    for row in 0..rect.h {
        let src_offset = ((rect.y + row) * frame_width + rect.x) * channels;
        roi[row * row_len..(row + 1) * row_len].copy_from_slice(&data[src_offset..src_offset + row_len]);
    }
}

/// Write a processed ROI buffer back into frame data.
pub fn write_roi_back(data: &mut [u8], roi: &[u8], frame_width: usize, channels: usize, rect: RoiRect) {
    let row_len = rect.w * channels;
    for row in 0..rect.h {
        let dst_offset = ((rect.y + row) * frame_width + rect.x) * channels;
        data[dst_offset..dst_offset + row_len].copy_from_slice(&roi[row * row_len..(row + 1) * row_len]);
    }
}

/// Set every pixel of the ROI to `color` (one value per channel).
pub fn fill_roi(data: &mut [u8], frame_width: usize, channels: usize, rect: RoiRect, color: &[u8]) {
    for row in 0..rect.h {
        let start = ((rect.y + row) * frame_width + rect.x) * channels;
        for pixel in data[start..start + rect.w * channels].chunks_exact_mut(channels) {
            for (dst, &src) in pixel.iter_mut().zip(color.iter().cycle()) {
                *dst = src;
            }
        }
    }
}
