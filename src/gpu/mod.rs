// gpu/mod.rs — wgpu compute backend for the accelerator path.
//
// The CPU blur in `convolution` is the reference: the GPU kernels use the
// same 1D kernel, the same border rule and the same final rounding, and the
// ignored parity tests check them against it pixel-for-pixel (±1 for f32
// summation order).
//
//   host CpuImage ──upload──▶ GpuImage (R32Float planes)
//                 ──blur──▶  GpuImage
//                 ──readback──▶ host CpuImage
//
// Only `upload`, `blur` and `readback` cross the host/device boundary; the
// timed region is `blur`, which waits for the queue to drain.

pub mod blur;
pub mod device;
pub mod image;

pub use blur::GpuBlurPipeline;
pub use device::{list_adapters, AdapterInfo, GpuDevice, GpuError, WorkgroupSize};
pub use image::GpuImage;
