use std::path::Path;

use crate::shared::error::BlanketResult;
use crate::video::domain::video_primitive::VideoPrimitive;

/// Produces a whole anonymized clip from a target video and one reference face image.
///
/// Implementations are long-running and blocking.
pub trait ClipSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        reference_image: &Path,
        target_video: &Path,
        output: &Path,
    ) -> BlanketResult<VideoPrimitive>;
}
