use std::path::{Path, PathBuf};

use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::infrastructure::image_file_writer::ImageFileWriter;

/// One image held in canonical orientation.
///
/// `clockwise_rotation_index` counts the clockwise quarter turns applied to
/// the original buffer to obtain the stored one; rotating by its negation
/// restores the original orientation exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct ImagePrimitive {
    image: Frame,
    clockwise_rotation_index: i32,
    path: Option<PathBuf>,
}

impl ImagePrimitive {
    /// Wraps a buffer that is already in canonical orientation.
    pub fn new(image: Frame, clockwise_rotation_index: i32, path: Option<PathBuf>) -> Self {
        Self {
            image,
            clockwise_rotation_index,
            path,
        }
    }

    pub fn from_not_rotated_image(
        image: Frame,
        clockwise_rotation_index: i32,
        path: Option<PathBuf>,
    ) -> BlanketResult<Self> {
        let image = if clockwise_rotation_index != 0 {
            Self::rotate_image(&image, clockwise_rotation_index)?
        } else {
            image
        };
        Ok(Self::new(image, clockwise_rotation_index, path))
    }

    /// Decodes an image file as RGB and rotates it into canonical orientation.
    pub fn from_path(path: &Path, clockwise_rotation_index: i32) -> BlanketResult<Self> {
        let decoded = image::open(path)
            .map_err(|e| match e {
                image::ImageError::IoError(source) => BlanketError::io(path, source),
                other => BlanketError::Decode {
                    path: path.to_path_buf(),
                    reason: other.to_string(),
                },
            })?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        let frame = Frame::new(decoded.into_raw(), width, height, 3, 0);
        Self::from_not_rotated_image(frame, clockwise_rotation_index, Some(path.to_path_buf()))
    }

    /// Rotates by `clockwise_rotation_index` quarter turns; negative values
    /// turn counter-clockwise.
    pub fn rotate_image(image: &Frame, clockwise_rotation_index: i32) -> BlanketResult<Frame> {
        if image.is_empty() {
            return Err(BlanketError::InvalidState("cannot rotate an empty image".into()));
        }
        Ok(image.rotated_clockwise(clockwise_rotation_index))
    }

    /// The same pixels in original orientation, with the rotation index reset.
    pub fn to_not_rotated_image(&self) -> BlanketResult<ImagePrimitive> {
        let image = if self.clockwise_rotation_index != 0 {
            Self::rotate_image(&self.image, -self.clockwise_rotation_index)?
        } else {
            self.image.clone()
        };
        Ok(Self::new(image, 0, None))
    }

    /// A new primitive with the same orientation and path around `image`.
    pub fn with_image(&self, image: Frame) -> ImagePrimitive {
        Self::new(image, self.clockwise_rotation_index, self.path.clone())
    }

    pub fn image(&self) -> &Frame {
        &self.image
    }

    pub fn into_image(self) -> Frame {
        self.image
    }

    pub fn image_rgb(&self) -> &Frame {
        &self.image
    }

    pub fn image_bgr(&self) -> Frame {
        Self::convert_rgb_to_bgr(&self.image)
    }

    pub fn convert_bgr_to_rgb(image_bgr: &Frame) -> Frame {
        image_bgr.swap_red_blue()
    }

    pub fn convert_rgb_to_bgr(image_rgb: &Frame) -> Frame {
        image_rgb.swap_red_blue()
    }

    pub fn clockwise_rotation_index(&self) -> i32 {
        self.clockwise_rotation_index
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `(height, width, channels)` of the canonical buffer.
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.image.height(), self.image.width(), self.image.channels())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Writes the image, defaulting to its source path.
    ///
    /// With `rotate_back` the buffer is first returned to original
    /// orientation. With `restricted` the file mode becomes `0o700` (unix).
    pub fn save_image(
        &self,
        path: Option<&Path>,
        rotate_back: bool,
        restricted: bool,
    ) -> BlanketResult<()> {
        self.save_image_with(&ImageFileWriter::new(), path, rotate_back, restricted)
    }

    pub fn save_image_with(
        &self,
        writer: &dyn ImageWriter,
        path: Option<&Path>,
        rotate_back: bool,
        restricted: bool,
    ) -> BlanketResult<()> {
        let target = path.or(self.path.as_deref()).ok_or_else(|| {
            BlanketError::Precondition("no output path given and image has no source path".into())
        })?;

        let rotated;
        let image = if rotate_back && self.clockwise_rotation_index != 0 {
            rotated = Self::rotate_image(&self.image, -self.clockwise_rotation_index)?;
            &rotated
        } else {
            &self.image
        };

        writer
            .write(target, image)
            .map_err(|e| BlanketError::io(target, std::io::Error::other(e.to_string())))?;

        if restricted {
            restrict_permissions(target)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path) -> BlanketResult<()> {
    use std::os::unix::fs::PermissionsExt;

    use crate::shared::constants::RESTRICTED_FILE_MODE;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(RESTRICTED_FILE_MODE))
        .map_err(|e| BlanketError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(path: &Path) -> BlanketResult<()> {
    log::warn!(
        "Restricting access is only supported on unix; {} keeps default permissions",
        path.display()
    );
    Ok(())
}
