// convolution.rs — Separable Gaussian blur on host planes.
//
// A 2D Gaussian with kernel g factors into g * g^T, so each plane is blurred
// with two 1D passes (rows, then columns), O(2k) per pixel instead of O(k²).
// Accumulation is f32; the column pass rounds and clamps straight back to u8.
//
// The same kernel, border mapping and summation order are used by the GPU
// shader (shaders/gaussian_blur.wgsl), so the three paths agree:
//   gaussian_blur      — serial, the CPU path
//   gaussian_blur_par  — rows fanned out over rayon, bit-identical to serial
//   gpu::blur          — compute shader, equal up to f32 summation noise
//
// KERNEL DERIVATION uses the usual OpenCV getGaussianKernel conventions:
//   sigma <= 0          → sigma = 0.3 * ((ksize - 1) * 0.5 - 1) + 0.8
//   sigma <= 0, k <= 7  → fixed binomial-like tables
//   ksize == 0          → ksize = round(6 * sigma + 1) | 1
//   even ksize          → ksize | 1

use rayon::prelude::*;
use serde::Deserialize;
use tracing::warn;

use crate::image::{ChannelLayout, CpuImage, Image, Pixel};

/// Largest kernel served by the fixed small-kernel tables.
const SMALL_KERNEL_MAX: usize = 7;

const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

// ---------------------------------------------------------------------------
// Border handling
// ---------------------------------------------------------------------------

/// How the kernel samples outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BorderMode {
    /// `gfedcb|abcdefgh|gfedcba` — mirror without repeating the edge pixel.
    #[default]
    Reflect101,
    /// `fedcba|abcdefgh|hgfedcb` — mirror including the edge pixel.
    Reflect,
    /// `aaaaaa|abcdefgh|hhhhhhh` — clamp to the nearest edge pixel.
    Replicate,
}

impl BorderMode {
    /// Numeric code shared with the WGSL shader.
    pub fn shader_code(self) -> u32 {
        match self {
            BorderMode::Reflect101 => 0,
            BorderMode::Reflect => 1,
            BorderMode::Replicate => 2,
        }
    }
}

impl std::fmt::Display for BorderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BorderMode::Reflect101 => write!(f, "reflect101"),
            BorderMode::Reflect => write!(f, "reflect"),
            BorderMode::Replicate => write!(f, "replicate"),
        }
    }
}

/// Map a possibly out-of-range index onto `0..n`.
///
/// Works for any offset, including kernels several times wider than the
/// image, since the reflections are periodic.
///
/// # Panics
/// Panics if `n == 0`.
#[inline]
pub fn border_index(i: isize, n: usize, mode: BorderMode) -> usize {
    assert!(n > 0, "border_index on an empty axis");
    let n = n as isize;
    if (0..n).contains(&i) {
        return i as usize;
    }
    let j = match mode {
        BorderMode::Replicate => i.clamp(0, n - 1),
        BorderMode::Reflect => {
            let period = 2 * n;
            let j = i.rem_euclid(period);
            if j >= n { period - 1 - j } else { j }
        }
        BorderMode::Reflect101 => {
            if n == 1 {
                0
            } else {
                let period = 2 * (n - 1);
                let j = i.rem_euclid(period);
                if j >= n { period - j } else { j }
            }
        }
    };
    j as usize
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Largest kernel, in taps, that `GaussianParams` accepts.
pub const MAX_KERNEL_SIZE: usize = 8191;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum KernelError {
    #[error("kernel size and sigma are both zero; nothing to blur with")]
    Degenerate,
    #[error("sigma must be non-negative (got {0})")]
    NegativeSigma(f32),
    #[error("sigma must be finite (got {0})")]
    NonFiniteSigma(f32),
    #[error("kernel size {size} exceeds the maximum of {max} taps")]
    TooLarge { size: usize, max: usize },
}

/// Sigma used when the caller passes `sigma <= 0`.
pub fn auto_sigma(kernel_size: usize) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Kernel size used when the caller passes `kernel_size == 0`.
pub fn derive_kernel_size(sigma: f32) -> usize {
    ((sigma * 3.0 * 2.0 + 1.0).round() as usize) | 1
}

/// Build a normalised 1D Gaussian kernel of odd length `kernel_size`.
///
/// # Panics
/// Panics if `kernel_size` is zero or even.
///
/// # Examples
/// ```
/// let k = gauss_bench::convolution::gaussian_kernel_1d(91, 0.0);
/// assert_eq!(k.len(), 91);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
/// ```
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    assert!(
        kernel_size % 2 == 1,
        "kernel size must be odd (got {kernel_size})"
    );
    if sigma <= 0.0 && kernel_size <= SMALL_KERNEL_MAX {
        return SMALL_KERNELS[kernel_size / 2].to_vec();
    }
    let sigma = if sigma > 0.0 { sigma } else { auto_sigma(kernel_size) };
    let half = (kernel_size / 2) as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - half;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Resolved blur parameters: odd kernel size, sigma (0 = auto), border mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    pub kernel_size: usize,
    pub sigma: f32,
    pub border: BorderMode,
}

impl GaussianParams {
    /// Normalise a requested kernel size / sigma pair.
    pub fn new(kernel_size: usize, sigma: f32, border: BorderMode) -> Result<Self, KernelError> {
        if !sigma.is_finite() {
            return Err(KernelError::NonFiniteSigma(sigma));
        }
        if sigma < 0.0 {
            return Err(KernelError::NegativeSigma(sigma));
        }
        let kernel_size = match kernel_size {
            0 if sigma == 0.0 => return Err(KernelError::Degenerate),
            0 => derive_kernel_size(sigma),
            k if k % 2 == 0 => {
                warn!(requested = k, used = k | 1, "even kernel size bumped to odd");
                k | 1
            }
            k => k,
        };
        if kernel_size > MAX_KERNEL_SIZE {
            return Err(KernelError::TooLarge { size: kernel_size, max: MAX_KERNEL_SIZE });
        }
        Ok(GaussianParams { kernel_size, sigma, border })
    }

    /// Half-width of the kernel window.
    pub fn radius(&self) -> usize {
        self.kernel_size / 2
    }

    /// The sigma the kernel is actually built with.
    pub fn effective_sigma(&self) -> f32 {
        if self.sigma > 0.0 { self.sigma } else { auto_sigma(self.kernel_size) }
    }

    pub fn kernel(&self) -> Vec<f32> {
        gaussian_kernel_1d(self.kernel_size, self.sigma)
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Horizontal pass over one row.
///
/// Interior pixels read the source directly; only the `half` pixels at each
/// end go through `border_index`.
fn row_pass<T: Pixel>(src: &[T], dst: &mut [f32], kernel: &[f32], border: BorderMode) {
    let w = src.len();
    let half = kernel.len() / 2;

    let edge = |x: usize| -> f32 {
        kernel
            .iter()
            .enumerate()
            .map(|(k, &kv)| {
                let sx = border_index(x as isize + k as isize - half as isize, w, border);
                src[sx].to_f32() * kv
            })
            .sum()
    };

    if w > 2 * half {
        for x in 0..half {
            dst[x] = edge(x);
        }
        for x in half..(w - half) {
            dst[x] = src[x - half..=x + half]
                .iter()
                .zip(kernel)
                .map(|(&s, &kv)| s.to_f32() * kv)
                .sum();
        }
        for x in (w - half)..w {
            dst[x] = edge(x);
        }
    } else {
        for (x, d) in dst.iter_mut().enumerate() {
            *d = edge(x);
        }
    }
}

/// Vertical pass producing output row `y`, rounded back to u8.
///
/// Taps are accumulated one source row at a time so every read is a
/// contiguous row slice. `acc` is scratch space of length `width`.
fn col_pass_row(
    src: &Image<f32>,
    y: usize,
    acc: &mut [f32],
    out: &mut [u8],
    kernel: &[f32],
    border: BorderMode,
) {
    let h = src.height();
    let half = kernel.len() / 2;
    acc.fill(0.0);
    for (k, &kv) in kernel.iter().enumerate() {
        let sy = border_index(y as isize + k as isize - half as isize, h, border);
        for (a, &s) in acc.iter_mut().zip(src.row(sy)) {
            *a += s * kv;
        }
    }
    for (o, &a) in out.iter_mut().zip(acc.iter()) {
        *o = u8::from_f32(a);
    }
}

/// Blur one plane on the calling thread.
pub fn blur_plane(src: &Image<u8>, kernel: &[f32], border: BorderMode) -> Image<u8> {
    if src.is_empty() {
        return src.clone();
    }
    let w = src.width();
    let mut rows = Image::<f32>::new(w, src.height());
    src.as_slice()
        .chunks_exact(w)
        .zip(rows.as_mut_slice().chunks_exact_mut(w))
        .for_each(|(s, d)| row_pass(s, d, kernel, border));

    let mut dst = Image::<u8>::new(w, src.height());
    let mut acc = vec![0.0f32; w];
    dst.as_mut_slice()
        .chunks_exact_mut(w)
        .enumerate()
        .for_each(|(y, out)| col_pass_row(&rows, y, &mut acc, out, kernel, border));
    dst
}

/// Blur one plane with both passes split by row across the rayon pool.
///
/// Each output pixel is computed with exactly the same operations in the
/// same order as [`blur_plane`], so the results are bit-identical.
pub fn blur_plane_par(src: &Image<u8>, kernel: &[f32], border: BorderMode) -> Image<u8> {
    if src.is_empty() {
        return src.clone();
    }
    let w = src.width();
    let mut rows = Image::<f32>::new(w, src.height());
    src.as_slice()
        .par_chunks_exact(w)
        .zip(rows.as_mut_slice().par_chunks_exact_mut(w))
        .for_each(|(s, d)| row_pass(s, d, kernel, border));

    let mut dst = Image::<u8>::new(w, src.height());
    dst.as_mut_slice()
        .par_chunks_exact_mut(w)
        .enumerate()
        .for_each_init(
            || vec![0.0f32; w],
            |acc, (y, out)| col_pass_row(&rows, y, acc, out, kernel, border),
        );
    dst
}

/// Gaussian-blur every channel of `src` (serial CPU path).
pub fn gaussian_blur(src: &CpuImage, params: &GaussianParams) -> CpuImage {
    let kernel = params.kernel();
    blur_planes(src.layout(), src.planes(), |p| blur_plane(p, &kernel, params.border))
}

/// Gaussian-blur every channel of `src` using the rayon pool.
pub fn gaussian_blur_par(src: &CpuImage, params: &GaussianParams) -> CpuImage {
    let kernel = params.kernel();
    blur_planes(src.layout(), src.planes(), |p| blur_plane_par(p, &kernel, params.border))
}

fn blur_planes(
    layout: ChannelLayout,
    planes: &[Image<u8>],
    blur: impl Fn(&Image<u8>) -> Image<u8>,
) -> CpuImage {
    CpuImage::from_planes(layout, planes.iter().map(blur).collect())
}
