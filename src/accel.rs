// accel.rs — The accelerator side of the benchmark.
//
// An accelerator owns a device-side buffer type and three operations:
//
//   upload    host CpuImage  -> AcceleratorImage   (transfer, untimed)
//   blur      AcceleratorImage -> AcceleratorImage (timed)
//   download  AcceleratorImage -> host CpuImage    (transfer, untimed)
//
// Backends:
//   Gpu       wgpu compute kernels on the best adapter (gpu::GpuBlurPipeline)
//   Parallel  the CPU blur split by rows across the rayon pool
//
// `Auto` tries the GPU first and falls back to `Parallel` with a warning, so
// the harness still produces both outputs on machines without a usable
// adapter (CI containers, headless servers without drivers).

use std::fmt;

use serde::Deserialize;
use tracing::{info, warn};

use crate::convolution::{gaussian_blur_par, GaussianParams};
use crate::gpu::{GpuBlurPipeline, GpuDevice, GpuError, GpuImage};
use crate::image::CpuImage;

/// Which accelerator the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorKind {
    /// GPU if one can be initialised, otherwise the parallel CPU backend.
    #[default]
    Auto,
    /// GPU only; failing to acquire one is an error.
    Gpu,
    /// Multi-threaded CPU.
    Parallel,
}

#[derive(Debug, thiserror::Error)]
pub enum AccelError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("buffer was created by a different accelerator")]
    ForeignBuffer,
}

/// An acquired accelerator backend.
pub enum Accelerator {
    Gpu {
        device: GpuDevice,
        pipeline: GpuBlurPipeline,
    },
    Parallel,
}

/// Image data resident in accelerator memory.
pub enum AcceleratorImage {
    Gpu(GpuImage),
    Parallel(CpuImage),
}

impl AcceleratorImage {
    pub fn width(&self) -> usize {
        match self {
            AcceleratorImage::Gpu(img) => img.width as usize,
            AcceleratorImage::Parallel(img) => img.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            AcceleratorImage::Gpu(img) => img.height as usize,
            AcceleratorImage::Parallel(img) => img.height(),
        }
    }
}

impl Accelerator {
    /// Acquire the backend selected by `kind`.
    pub fn acquire(kind: AcceleratorKind) -> Result<Self, AccelError> {
        let acc = match kind {
            AcceleratorKind::Parallel => Accelerator::Parallel,
            AcceleratorKind::Gpu => Self::gpu()?,
            AcceleratorKind::Auto => Self::gpu().unwrap_or_else(|e| {
                warn!(error = %e, "GPU unavailable, falling back to the parallel CPU backend");
                Accelerator::Parallel
            }),
        };
        info!(backend = %acc, "accelerator acquired");
        Ok(acc)
    }

    fn gpu() -> Result<Self, AccelError> {
        let device = GpuDevice::new()?;
        let pipeline = GpuBlurPipeline::new(&device)?;
        Ok(Accelerator::Gpu { device, pipeline })
    }

    /// Short backend name for the console report.
    pub fn name(&self) -> String {
        match self {
            Accelerator::Gpu { device, .. } => format!("gpu: {}", device.adapter_info.name),
            Accelerator::Parallel => {
                format!("parallel: {} threads", rayon::current_num_threads())
            }
        }
    }

    /// Copy a host image into accelerator memory.
    pub fn upload(&self, src: &CpuImage) -> Result<AcceleratorImage, AccelError> {
        match self {
            Accelerator::Gpu { device, .. } => {
                Ok(AcceleratorImage::Gpu(GpuImage::upload(device, src)?))
            }
            Accelerator::Parallel => Ok(AcceleratorImage::Parallel(src.clone())),
        }
    }

    /// Blur into a new accelerator buffer. Returns once the result is
    /// complete on the device.
    pub fn blur(
        &self,
        src: &AcceleratorImage,
        params: &GaussianParams,
    ) -> Result<AcceleratorImage, AccelError> {
        match (self, src) {
            (Accelerator::Gpu { device, pipeline }, AcceleratorImage::Gpu(img)) => {
                Ok(AcceleratorImage::Gpu(pipeline.blur(device, img, params)?))
            }
            (Accelerator::Parallel, AcceleratorImage::Parallel(img)) => {
                Ok(AcceleratorImage::Parallel(gaussian_blur_par(img, params)))
            }
            _ => Err(AccelError::ForeignBuffer),
        }
    }

    /// Copy an accelerator buffer back to host memory.
    pub fn download(&self, img: &AcceleratorImage) -> Result<CpuImage, AccelError> {
        match (self, img) {
            (Accelerator::Gpu { device, .. }, AcceleratorImage::Gpu(img)) => {
                Ok(img.readback(device)?)
            }
            (Accelerator::Parallel, AcceleratorImage::Parallel(img)) => Ok(img.clone()),
            _ => Err(AccelError::ForeignBuffer),
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::Gpu { device, .. } => write!(f, "gpu ({})", device.adapter_info),
            Accelerator::Parallel => {
                write!(f, "parallel ({} rayon threads)", rayon::current_num_threads())
            }
        }
    }
}
