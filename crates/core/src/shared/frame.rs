use ndarray::{ArrayView3, Axis};

/// A single image or video frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// A frame filled with zeros, used for blackened output.
    pub fn black(width: u32, height: u32, channels: u8, index: usize) -> Self {
        let len = (width as usize) * (height as usize) * (channels as usize);
        Self::new(vec![0; len], width, height, channels, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// `(height, width, channels)` view of the pixels, or `None` when the
    /// buffer length does not match the dimensions.
    pub fn as_ndarray(&self) -> Option<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(self.shape(), &self.data).ok()
    }

    /// Returns a copy rotated by `quarter_turns` clockwise quarter turns.
    ///
    /// Negative counts rotate counter-clockwise; only `quarter_turns mod 4`
    /// matters. Pixel values are moved, never resampled.
    pub fn rotated_clockwise(&self, quarter_turns: i32) -> Frame {
        let Some(view) = self.as_ndarray() else {
            return self.clone();
        };
        let rotated = match quarter_turns.rem_euclid(4) {
            0 => return self.clone(),
            1 => {
                let mut v = view.permuted_axes([1, 0, 2]);
                v.invert_axis(Axis(1));
                v
            }
            2 => {
                let mut v = view;
                v.invert_axis(Axis(0));
                v.invert_axis(Axis(1));
                v
            }
            _ => {
                let mut v = view.permuted_axes([1, 0, 2]);
                v.invert_axis(Axis(0));
                v
            }
        };
        let (height, width, _) = rotated.dim();
        let data: Vec<u8> = rotated.iter().copied().collect();
        Frame::new(data, width as u32, height as u32, self.channels, self.index)
    }

    /// Swaps the first and third channel (RGB <-> BGR).
    pub fn swap_red_blue(&self) -> Frame {
        let mut swapped = self.clone();
        if self.channels >= 3 {
            for pixel in swapped.data.chunks_exact_mut(self.channels as usize) {
                pixel.swap(0, 2);
            }
        }
        swapped
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
