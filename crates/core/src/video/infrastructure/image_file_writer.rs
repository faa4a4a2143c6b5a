use std::path::Path;

use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

/// Writes a single frame to an image file using the `image` crate.
///
/// The container format follows the path's extension.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        match frame.channels() {
            1 => image::GrayImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or("Failed to create image from frame data")?
                .save(path)?,
            3 => image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or("Failed to create image from frame data")?
                .save(path)?,
            n => return Err(format!("cannot save a {n}-channel frame").into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb.repeat((width * height) as usize);
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_write_creates_file_and_parent_folders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        ImageFileWriter::new()
            .write(&path, &make_frame(10, 8, [50, 100, 200]))
            .unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_roundtrip_preserves_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        ImageFileWriter::new()
            .write(&path, &make_frame(50, 40, [50, 100, 200]))
            .unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (50, 40));
        assert_eq!(img.get_pixel(0, 0).0, [50, 100, 200]);
    }

    #[test]
    fn test_write_gray_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let frame = Frame::new(vec![255; 16], 4, 4, 1, 0);
        ImageFileWriter::new().write(&path, &frame).unwrap();
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.get_pixel(3, 3).0, [255]);
    }

    #[test]
    fn test_unsupported_channel_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::new(vec![0; 8], 2, 2, 2, 0);
        assert!(ImageFileWriter::new()
            .write(&dir.path().join("x.png"), &frame)
            .is_err());
    }
}
