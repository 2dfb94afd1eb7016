// image.rs — Host-side image buffers.
//
// Two levels:
//   Image<T>  — one row-major plane, generic over the pixel type.
//   CpuImage  — a decoded picture: one Image<u8> plane per channel plus the
//               channel layout. This is what the loader produces, what the
//               CPU blur consumes, and what the writer encodes.
//
// Planes are stored separately (planar, not interleaved) because every
// consumer works one channel at a time: the separable blur, the GPU upload
// (one R32Float texture per channel) and the thread-parallel accelerator.
// Rows are tightly packed: the element for (x, y) lives at y * width + x.

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Convert this pixel value to f32 (raw, not normalised).
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value (with appropriate clamping/rounding).
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        // Raw cast: u8 200 → 200.0. The blur accumulates in this range.
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        // `as u8` truncates, so clamp and round first.
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A single-channel 2D plane with runtime dimensions.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialised plane.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Wrap an existing row-major pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// True when the plane holds no pixels (either dimension is zero).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// Set the pixel at (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        let idx = y * self.width + x;
        self.data[idx] = value;
    }

    /// Borrow a single row as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    /// Row-major pixel data.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CpuImage
// ---------------------------------------------------------------------------

/// Channel arrangement of a `CpuImage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Gray,
    /// Planes are stored in R, G, B order.
    Rgb,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgb => 3,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Gray => write!(f, "gray"),
            ChannelLayout::Rgb => write!(f, "rgb"),
        }
    }
}

/// A decoded 8-bit picture held in main memory, one plane per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuImage {
    planes: Vec<Image<u8>>,
    layout: ChannelLayout,
}

impl CpuImage {
    /// Assemble a picture from its planes.
    ///
    /// # Panics
    /// Panics if the plane count does not match the layout or the planes
    /// disagree on dimensions.
    pub fn from_planes(layout: ChannelLayout, planes: Vec<Image<u8>>) -> Self {
        assert_eq!(
            planes.len(),
            layout.channels(),
            "{layout} layout needs {} planes, got {}",
            layout.channels(),
            planes.len(),
        );
        let (w, h) = (planes[0].width(), planes[0].height());
        assert!(
            planes.iter().all(|p| p.width() == w && p.height() == h),
            "all planes must share the same dimensions",
        );
        CpuImage { planes, layout }
    }

    /// Single-channel convenience constructor.
    pub fn gray(plane: Image<u8>) -> Self {
        CpuImage { planes: vec![plane], layout: ChannelLayout::Gray }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn planes(&self) -> &[Image<u8>] {
        &self.planes
    }

    pub fn plane(&self, channel: usize) -> &Image<u8> {
        &self.planes[channel]
    }

    pub fn is_empty(&self) -> bool {
        self.planes[0].is_empty()
    }

    /// Mean squared per-sample difference against `other`.
    ///
    /// Used to compare how much two blurs moved the same source: equal
    /// kernels give near-equal energy.
    ///
    /// # Panics
    /// Panics if the two images differ in size or layout.
    pub fn difference_energy(&self, other: &CpuImage) -> f64 {
        assert_eq!(self.layout, other.layout, "layout mismatch");
        assert_eq!(
            (self.width(), self.height()),
            (other.width(), other.height()),
            "dimension mismatch",
        );
        let samples = self.planes.len() * self.width() * self.height();
        if samples == 0 {
            return 0.0;
        }
        let total: f64 = self
            .planes
            .iter()
            .zip(&other.planes)
            .flat_map(|(a, b)| a.as_slice().iter().zip(b.as_slice()))
            .map(|(&a, &b)| {
                let d = a as f64 - b as f64;
                d * d
            })
            .sum();
        total / samples as f64
    }
}
