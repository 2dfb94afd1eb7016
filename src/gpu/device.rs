// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and select the best hardware one.
//   - Provide `WorkgroupSize`, validated against the device limits and baked
//     into the compute shaders at pipeline creation.
//   - Turn wgpu's validation / out-of-memory errors into `GpuError` values
//     via error scopes instead of the default panic-on-uncaptured-error.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe (a software renderer that appears as a valid
// device). We enumerate explicitly and prefer real hardware, falling back to
// whatever exists as a last resort. The chosen adapter is logged.

use std::fmt;

use tracing::{debug, info, warn};

/// A workgroup size configuration for 2D compute dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// 16×8 = 128 invocations: 4 NVIDIA warps or 2 AMD wavefronts, with a
    /// 16-wide x dimension that follows row-major texel order.
    pub const DEFAULT: WorkgroupSize = WorkgroupSize { x: 16, y: 8 };

    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Substitute the `{{WG_X}}` / `{{WG_Y}}` placeholders in a WGSL template.
    ///
    /// naga does not accept `override` expressions inside `@workgroup_size`,
    /// so the dimensions are baked into the source text instead.
    pub fn specialise(&self, template: &str) -> String {
        template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }

    /// Number of workgroups needed to cover `img_w × img_h` pixels.
    ///
    /// Ceiling division; the shader must guard out-of-range invocations.
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        (img_w.div_ceil(self.x), img_h.div_ceil(self.y))
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging and `--list-adapters`.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(info: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: info.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )
    }
}

/// The core GPU context: device, queue and chosen adapter.
///
/// Expensive to create; hold one for the whole run.
///
/// # Field drop order
/// Rust drops struct fields in declaration order. `_instance` is declared
/// last so the `wgpu::Instance` outlives `device` and `queue`; some
/// translation layers (dzn on WSL2) crash if the instance goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

fn create_instance() -> wgpu::Instance {
    // dzn (D3D12→Vulkan on WSL2) reports itself as non-conformant and would
    // otherwise be hidden, leaving only llvmpipe.
    let flags = if cfg!(debug_assertions) {
        wgpu::InstanceFlags::VALIDATION
            | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
    } else {
        wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
    };

    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        flags,
        ..Default::default()
    })
}

/// Every adapter the primary backends expose, in enumeration order.
pub fn list_adapters() -> Vec<AdapterInfo> {
    create_instance()
        .enumerate_adapters(wgpu::Backends::PRIMARY)
        .into_iter()
        .map(|a| AdapterInfo::from(a.get_info()))
        .collect()
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best adapter found.
    ///
    /// # Errors
    /// Returns `Err` if no adapter exists or the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, GpuError> {
        let instance = create_instance();

        // Tiered selection:
        //   DiscreteGpu / IntegratedGpu / VirtualGpu / Other  <- take first
        //   Cpu (llvmpipe, software rasteriser)                <- last resort
        let all_adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &all_adapters {
            debug!(adapter = %AdapterInfo::from(a.get_info()), "found adapter");
        }

        let (hardware, software): (Vec<_>, Vec<_>) = all_adapters
            .into_iter()
            .partition(|a| a.get_info().device_type != wgpu::DeviceType::Cpu);
        let adapter = match hardware.into_iter().next() {
            Some(a) => a,
            None => {
                let a = software.into_iter().next().ok_or(GpuError::NoSuitableAdapter)?;
                warn!(adapter = %a.get_info().name, "only a software adapter is available");
                a
            }
        };

        let adapter_info = AdapterInfo::from(adapter.get_info());

        // wgpu 22: request_device returns (Device, Queue) directly; the tuple
        // type must be spelled out to help the type inferencer.
        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gauss-bench"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        info!(adapter = %adapter_info, "GPU device ready");

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            workgroup_size: WorkgroupSize::DEFAULT,
            _instance: instance,
        })
    }

    /// Override the default workgroup size, validating against device limits.
    ///
    /// Applies to pipelines built afterwards.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        let size = WorkgroupSize { x, y };
        check_workgroup(size, &self.device.limits())?;
        self.workgroup_size = size;
        Ok(())
    }

    /// Largest texture side the device accepts.
    pub fn max_texture_side(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    ///
    /// wgpu reports most misuse asynchronously through an uncaptured-error
    /// handler that panics by default. Inside the scopes the error is
    /// returned here instead.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match (validation, oom) {
            (Some(e), _) => Err(GpuError::Validation(e.to_string())),
            (None, Some(e)) => Err(GpuError::OutOfMemory(e.to_string())),
            (None, None) => Ok(value),
        }
    }

    /// Block until every submitted command buffer has finished executing.
    pub fn wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, workgroup: {} }}",
            self.adapter_info, self.workgroup_size
        )
    }
}

fn check_workgroup(size: WorkgroupSize, limits: &wgpu::Limits) -> Result<(), GpuError> {
    let max = limits.max_compute_invocations_per_workgroup;
    if size.total() > max
        || size.x > limits.max_compute_workgroup_size_x
        || size.y > limits.max_compute_workgroup_size_y
    {
        return Err(GpuError::WorkgroupTooLarge { total: size.total(), max });
    }
    Ok(())
}

// ============================================================
// Error type
// ============================================================

/// Errors from the GPU layer: device setup, transfers and dispatches.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no GPU adapter found")]
    NoSuitableAdapter,
    #[error("device request failed")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("workgroup size {total} exceeds device limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },
    #[error("image {width}x{height} exceeds the device texture limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("cannot upload an empty image")]
    EmptyImage,
    #[error("wgpu validation error: {0}")]
    Validation(String),
    #[error("GPU out of memory: {0}")]
    OutOfMemory(String),
    #[error("readback buffer map failed")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("readback map callback never fired")]
    MapCallbackLost,
}

// ============================================================
// Tests
// ============================================================
