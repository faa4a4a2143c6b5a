use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Metadata as seen after `quarter_turns` clockwise rotations of every frame.
    pub fn rotated(&self, quarter_turns: i32) -> VideoMetadata {
        let mut rotated = self.clone();
        if quarter_turns.rem_euclid(2) == 1 {
            rotated.width = self.height;
            rotated.height = self.width;
        }
        rotated
    }
}
