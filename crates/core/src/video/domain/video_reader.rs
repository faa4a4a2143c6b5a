use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Reads frames from a video source by index.
///
/// Implementations handle I/O details (codec, container format, seeking)
/// while primitives work with the abstract `Frame` and `VideoMetadata`
/// types. Frames are returned in the file's stored orientation.
pub trait VideoReader: Send {
    /// Opens a video file and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Decodes the frame at `index` in decode order.
    fn read_frame(&mut self, index: usize) -> Result<Frame, Box<dyn std::error::Error>>;

    /// Releases any resources held by the reader. Safe to call repeatedly.
    fn close(&mut self);
}
