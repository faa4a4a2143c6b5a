use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single RGB frame to an image file.
pub trait ImageWriter: Send + Sync {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
