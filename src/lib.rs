// gauss-bench: times one large Gaussian blur on a host buffer and on an
// accelerator buffer (wgpu compute or a rayon thread pool), writing both
// results as JPEG.
//
// The serial CPU blur in `convolution` is the reference; every accelerator
// backend is checked against it.

pub mod image;
pub mod convert;
pub mod convolution;
pub mod gpu;

pub mod accel;
pub mod config;
pub mod error;
pub mod harness;
pub mod io;
pub mod report;
pub mod timing;

pub use accel::{Accelerator, AcceleratorKind};
pub use config::HarnessConfig;
pub use error::HarnessError;
pub use harness::{run, RunReport};
