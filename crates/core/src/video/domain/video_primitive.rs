use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::image_primitive::ImagePrimitive;
use crate::video::domain::video_reader::VideoReader;
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;

/// A video file whose frames are served in canonical orientation.
///
/// The decoder is opened on first access and stays open until
/// [`VideoPrimitive::release`], the end of an [`OpenVideo`] scope, or drop.
/// Metadata is cached on first query and survives a release.
pub struct VideoPrimitive {
    path: PathBuf,
    clockwise_rotation_index: i32,
    current_frame_index: usize,
    reader: Box<dyn VideoReader>,
    is_open: bool,
    metadata: Option<VideoMetadata>,
}

impl VideoPrimitive {
    pub fn new(path: impl Into<PathBuf>, clockwise_rotation_index: i32) -> Self {
        Self::with_reader(path, clockwise_rotation_index, Box::new(FfmpegReader::new()))
    }

    pub fn with_reader(
        path: impl Into<PathBuf>,
        clockwise_rotation_index: i32,
        reader: Box<dyn VideoReader>,
    ) -> Self {
        Self {
            path: path.into(),
            clockwise_rotation_index,
            current_frame_index: 0,
            reader,
            is_open: false,
            metadata: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clockwise_rotation_index(&self) -> i32 {
        self.clockwise_rotation_index
    }

    pub fn current_frame_index(&self) -> usize {
        self.current_frame_index
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Metadata of the stored (not rotated) stream.
    pub fn metadata(&mut self) -> BlanketResult<&VideoMetadata> {
        if self.metadata.is_none() {
            self.ensure_open()?;
        }
        self.metadata
            .as_ref()
            .ok_or_else(|| BlanketError::InvalidState("video metadata unavailable".into()))
    }

    pub fn total_frames(&mut self) -> BlanketResult<usize> {
        Ok(self.metadata()?.total_frames)
    }

    pub fn fps(&mut self) -> BlanketResult<f64> {
        Ok(self.metadata()?.fps)
    }

    pub fn width(&mut self) -> BlanketResult<u32> {
        Ok(self.metadata()?.width)
    }

    pub fn height(&mut self) -> BlanketResult<u32> {
        Ok(self.metadata()?.height)
    }

    /// Decodes frame `index` in stored orientation.
    pub fn load_frame_as_array(&mut self, index: i64) -> BlanketResult<Frame> {
        self.ensure_open()?;
        let total = self.total_frames()?;
        if index < 0 || index as usize >= total {
            return Err(BlanketError::FrameOutOfRange { index, total });
        }
        let index = index as usize;
        self.reader
            .read_frame(index)
            .map_err(|e| BlanketError::FrameDecode {
                index,
                reason: e.to_string(),
            })
    }

    /// Returns frame `index` (or the cursor's frame) in canonical orientation
    /// and moves the cursor just past it.
    pub fn get_frame_primitive(&mut self, index: Option<i64>) -> BlanketResult<ImagePrimitive> {
        let index = index.unwrap_or(self.current_frame_index as i64);
        let frame = self.load_frame_as_array(index)?;
        self.current_frame_index = index as usize + 1;
        ImagePrimitive::from_not_rotated_image(frame, self.clockwise_rotation_index, None)
    }

    /// Frame at the cursor, or `None` once the cursor has reached
    /// `total_frames`.
    pub fn next_frame(&mut self) -> Option<BlanketResult<ImagePrimitive>> {
        let total = match self.total_frames() {
            Ok(total) => total,
            Err(e) => return Some(Err(e)),
        };
        if self.current_frame_index >= total {
            return None;
        }
        Some(self.get_frame_primitive(None))
    }

    pub fn reset_current_frame_index(&mut self) {
        self.current_frame_index = 0;
    }

    /// Closes the decoder. The next frame access reopens it.
    pub fn release(&mut self) {
        if self.is_open {
            self.reader.close();
            self.is_open = false;
        }
    }

    /// Opens the decoder for the lifetime of the returned guard.
    pub fn open(&mut self) -> BlanketResult<OpenVideo<'_>> {
        self.ensure_open()?;
        Ok(OpenVideo { video: self })
    }

    /// Iterates all frames from the start. The cursor is reset first.
    pub fn frames(&mut self) -> Frames<'_> {
        self.reset_current_frame_index();
        Frames {
            video: self,
            done: false,
        }
    }

    fn ensure_open(&mut self) -> BlanketResult<()> {
        if self.is_open {
            return Ok(());
        }
        let metadata = self.reader.open(&self.path).map_err(|e| BlanketError::Decode {
            path: self.path.clone(),
            reason: format!("failed to open video: {e}"),
        })?;
        self.is_open = true;
        if self.metadata.is_none() {
            log::debug!(
                "Opened {} ({}x{}, {} frames at {:.2} fps)",
                self.path.display(),
                metadata.width,
                metadata.height,
                metadata.total_frames,
                metadata.fps
            );
            self.metadata = Some(metadata);
        }
        Ok(())
    }
}

impl Drop for VideoPrimitive {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for VideoPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoPrimitive")
            .field("path", &self.path)
            .field("clockwise_rotation_index", &self.clockwise_rotation_index)
            .field("current_frame_index", &self.current_frame_index)
            .field("is_open", &self.is_open)
            .finish()
    }
}

/// Scope guard holding the decoder open; releases it when dropped.
pub struct OpenVideo<'a> {
    video: &'a mut VideoPrimitive,
}

impl Deref for OpenVideo<'_> {
    type Target = VideoPrimitive;

    fn deref(&self) -> &VideoPrimitive {
        self.video
    }
}

impl DerefMut for OpenVideo<'_> {
    fn deref_mut(&mut self) -> &mut VideoPrimitive {
        self.video
    }
}

impl Drop for OpenVideo<'_> {
    fn drop(&mut self) {
        self.video.release();
    }
}

/// Forward-only pass over a video's frames, ending at `total_frames` or
/// after the first error.
pub struct Frames<'a> {
    video: &'a mut VideoPrimitive,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = BlanketResult<ImagePrimitive>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.video.next_frame();
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    #[derive(Default)]
    struct ReaderLog {
        opens: usize,
        closes: usize,
        reads: Vec<usize>,
    }

    struct StubReader {
        total_frames: usize,
        failing_frame: Option<usize>,
        fail_open: bool,
        log: Arc<Mutex<ReaderLog>>,
    }

    impl StubReader {
        fn new(total_frames: usize) -> (Self, Arc<Mutex<ReaderLog>>) {
            let log = Arc::new(Mutex::new(ReaderLog::default()));
            (
                Self {
                    total_frames,
                    failing_frame: None,
                    fail_open: false,
                    log: log.clone(),
                },
                log,
            )
        }
    }

    impl VideoReader for StubReader {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("cannot open".into());
            }
            self.log.lock().unwrap().opens += 1;
            Ok(VideoMetadata {
                width: 4,
                height: 2,
                fps: 25.0,
                total_frames: self.total_frames,
                codec: "stub".into(),
                source_path: Some(path.to_path_buf()),
            })
        }

        fn read_frame(&mut self, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
            self.log.lock().unwrap().reads.push(index);
            if self.failing_frame == Some(index) {
                return Err("corrupt packet".into());
            }
            let mut frame = Frame::black(4, 2, 3, index);
            frame.data_mut()[0] = index as u8;
            Ok(frame)
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closes += 1;
        }
    }

    fn video(total: usize, k: i32) -> (VideoPrimitive, Arc<Mutex<ReaderLog>>) {
        let (reader, log) = StubReader::new(total);
        (VideoPrimitive::with_reader("clip.mp4", k, Box::new(reader)), log)
    }

    // --- Tests ---

    #[test]
    fn test_opens_lazily_and_caches_metadata() {
        let (mut video, log) = video(5, 0);
        assert!(!video.is_open());
        assert_eq!(log.lock().unwrap().opens, 0);

        assert_eq!(video.total_frames().unwrap(), 5);
        assert_eq!(video.fps().unwrap(), 25.0);
        assert_eq!((video.width().unwrap(), video.height().unwrap()), (4, 2));
        assert_eq!(log.lock().unwrap().opens, 1);
    }

    #[test]
    fn test_metadata_survives_release() {
        let (mut video, log) = video(5, 0);
        video.total_frames().unwrap();
        video.release();
        assert!(!video.is_open());
        assert_eq!(video.total_frames().unwrap(), 5);
        assert_eq!(log.lock().unwrap().opens, 1);
    }

    #[test]
    fn test_index_equal_to_total_is_out_of_range() {
        let (mut video, _) = video(5, 0);
        let err = video.get_frame_primitive(Some(5)).unwrap_err();
        assert!(matches!(err, BlanketError::FrameOutOfRange { index: 5, total: 5 }));
    }

    #[test]
    fn test_negative_index_is_out_of_range() {
        let (mut video, _) = video(5, 0);
        let err = video.load_frame_as_array(-1).unwrap_err();
        assert!(matches!(err, BlanketError::FrameOutOfRange { index: -1, .. }));
    }

    #[test]
    fn test_last_frame_advances_cursor_and_ends_iteration() {
        let (mut video, _) = video(5, 0);
        let frame = video.get_frame_primitive(Some(4)).unwrap();
        assert_eq!(frame.image().index(), 4);
        assert_eq!(video.current_frame_index(), 5);
        assert!(video.next_frame().is_none());
        assert!(video.next_frame().is_none());
    }

    #[test]
    fn test_next_frame_continues_from_cursor() {
        let (mut video, _) = video(5, 0);
        video.get_frame_primitive(Some(2)).unwrap();
        let next = video.next_frame().unwrap().unwrap();
        assert_eq!(next.image().index(), 3);
        assert_eq!(video.current_frame_index(), 4);
    }

    #[test]
    fn test_decode_failure_is_distinct_from_range_error() {
        let (mut reader, _) = StubReader::new(5);
        reader.failing_frame = Some(2);
        let mut video = VideoPrimitive::with_reader("clip.mp4", 0, Box::new(reader));
        let err = video.load_frame_as_array(2).unwrap_err();
        assert!(matches!(err, BlanketError::FrameDecode { index: 2, .. }));
    }

    #[test]
    fn test_open_failure_is_decode_error() {
        let (mut reader, _) = StubReader::new(5);
        reader.fail_open = true;
        let mut video = VideoPrimitive::with_reader("clip.mp4", 0, Box::new(reader));
        assert!(matches!(video.total_frames(), Err(BlanketError::Decode { .. })));
    }

    #[test]
    fn test_frames_are_rotated_into_canonical_orientation() {
        let (mut video, _) = video(1, 1);
        let frame = video.get_frame_primitive(Some(0)).unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 4));
        assert_eq!(frame.clockwise_rotation_index(), 1);
    }

    // ── Iteration ────────────────────────────────────────────────────

    #[test]
    fn test_frames_yields_every_frame_in_order() {
        let (mut video, _) = video(3, 0);
        let indices: Vec<usize> = video
            .frames()
            .map(|f| f.unwrap().image().index())
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(video.current_frame_index(), 3);
    }

    #[test]
    fn test_frames_restarts_from_zero() {
        let (mut video, _) = video(3, 0);
        video.get_frame_primitive(Some(2)).unwrap();
        assert_eq!(video.frames().count(), 3);
        assert_eq!(video.frames().count(), 3);
    }

    #[test]
    fn test_frames_stops_after_first_error() {
        let (mut reader, log) = StubReader::new(5);
        reader.failing_frame = Some(1);
        let mut video = VideoPrimitive::with_reader("clip.mp4", 0, Box::new(reader));
        let results: Vec<_> = video.frames().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(log.lock().unwrap().reads, vec![0, 1]);
    }

    // ── Scoped acquisition ───────────────────────────────────────────

    #[test]
    fn test_open_guard_releases_on_scope_exit() {
        let (mut video, log) = video(3, 0);
        {
            let mut opened = video.open().unwrap();
            assert!(opened.is_open());
            opened.get_frame_primitive(Some(0)).unwrap();
        }
        assert!(!video.is_open());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_open_guard_releases_on_early_break() {
        let (mut video, log) = video(5, 0);
        {
            let mut opened = video.open().unwrap();
            for frame in opened.frames() {
                if frame.unwrap().image().index() == 1 {
                    break;
                }
            }
        }
        assert!(!video.is_open());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_drop_releases_decoder() {
        let (mut video, log) = video(2, 0);
        video.total_frames().unwrap();
        drop(video);
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_release_without_open_does_not_close() {
        let (mut video, log) = video(2, 0);
        video.release();
        assert_eq!(log.lock().unwrap().closes, 0);
    }

    #[test]
    fn test_reads_real_video_file() {
        use crate::video::infrastructure::ffmpeg_reader::create_test_video;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, 4, 64, 48, 25);

        let mut video = VideoPrimitive::new(&path, 1);
        assert_eq!(video.total_frames().unwrap(), 4);
        let frames: Vec<_> = video.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 4);
        assert_eq!((frames[0].width(), frames[0].height()), (48, 64));
        assert!(video.load_frame_as_array(4).is_err());
    }
}
