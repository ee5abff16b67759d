use std::fmt;

/// Height and width of a raster, in that order.
pub type Shape = [usize; 2];

/// Native resolution of the strip images.
pub const SOURCE_SHAPE: Shape = [256, 1600];

/// Resolution used for model input and output.
pub const RESIZE_SHAPE: Shape = [128, 800];

/// A binary mask stored row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    height: usize,
    width: usize,
    data: Vec<bool>,
}

impl Mask {
    pub fn zeros([height, width]: Shape) -> Self {
        Self {
            height,
            width,
            data: vec![false; height * width],
        }
    }

    pub fn from_fn<F>([height, width]: Shape, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        let mut data = Vec::with_capacity(height * width);
        for row in 0..height {
            for col in 0..width {
                data.push(f(row, col));
            }
        }

        Self {
            height,
            width,
            data,
        }
    }

    /// Builds a mask from a row-major buffer. Returns `None` when the length does not match.
    pub fn from_vec([height, width]: Shape, data: Vec<bool>) -> Option<Self> {
        (data.len() == height * width).then_some(Self {
            height,
            width,
            data,
        })
    }

    pub fn shape(&self) -> Shape {
        [self.height, self.width]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns `false` for coordinates outside the mask.
    pub fn get(&self, row: usize, col: usize) -> bool {
        row < self.height && col < self.width && self.data[row * self.width + col]
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Iterates over the `(row, col)` coordinates of set pixels.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(|(i, _)| (i / self.width, i % self.width))
    }

    /// Enlarges by pixel replication, the inverse of stride subsampling.
    pub fn upsample(&self, [height, width]: Shape) -> Self {
        let sy = (height / self.height.max(1)).max(1);
        let sx = (width / self.width.max(1)).max(1);
        Self::from_fn([height, width], |row, col| self.get(row / sy, col / sx))
    }

    pub(crate) fn zip_with<F>(&self, other: &Mask, f: F) -> Mask
    where
        F: Fn(bool, bool) -> bool,
    {
        debug_assert_eq!(self.shape(), other.shape());
        Mask {
            height: self.height,
            width: self.width,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mask {}x{} ({} set)", self.height, self.width, self.count())?;
        if self.height * self.width <= 400 {
            for row in 0..self.height {
                for col in 0..self.width {
                    f.write_str(if self.get(row, col) { "#" } else { "." })?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
