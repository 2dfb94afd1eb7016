// gpu/blur.rs — Separable Gaussian blur as two compute passes.
//
// Mirrors `convolution::gaussian_blur`: the same normalised 1D kernel, the
// same border rule, a horizontal pass into an f32 scratch texture and a
// vertical pass into the output. Per plane:
//
//   src ──blur_rows──▶ scratch ──blur_cols──▶ dst
//
// All passes for all planes are recorded into one encoder and submitted
// together. `blur()` then waits for the queue to drain, so a caller timing
// it measures the GPU execution, not just command recording.
//
// The only CPU/GPU difference is f32 summation: the GPU may fuse
// multiply-adds, so a handful of pixels can round to a neighbouring u8.

use wgpu::util::DeviceExt;

use crate::convolution::GaussianParams;
use crate::gpu::device::{GpuDevice, GpuError, WorkgroupSize};
use crate::gpu::image::{GpuImage, GpuPlane};

/// Uniform block shared by both entry points. Matches `BlurParams` in
/// gaussian_blur.wgsl (4 × u32, 16 bytes, no padding).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurParams {
    pub width: u32,
    pub height: u32,
    pub radius: u32,
    pub border: u32,
}

impl BlurParams {
    pub fn new(width: u32, height: u32, params: &GaussianParams) -> Self {
        BlurParams {
            width,
            height,
            // GaussianParams caps the kernel at MAX_KERNEL_SIZE taps.
            radius: params.radius() as u32,
            border: params.border.shader_code(),
        }
    }
}

/// Compiled pipelines for the two blur passes.
///
/// Build once per device; reusable for any image size and kernel.
///
/// The workgroup size is baked into the shader at build time and kept here,
/// so later changes to the device's workgroup size do not affect dispatch.
pub struct GpuBlurPipeline {
    rows: wgpu::ComputePipeline,
    cols: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    workgroup_size: WorkgroupSize,
}

impl GpuBlurPipeline {
    pub fn new(gpu: &GpuDevice) -> Result<Self, GpuError> {
        gpu.scoped(|| Self::build(gpu))
    }

    /// Workgroup size the pipelines were compiled with.
    pub fn workgroup_size(&self) -> WorkgroupSize {
        self.workgroup_size
    }

    fn build(gpu: &GpuDevice) -> Self {
        let workgroup_size = gpu.workgroup_size;
        let shader_src = workgroup_size.specialise(include_str!("../shaders/gaussian_blur.wgsl"));
        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gaussian_blur.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuBlur BGL"),
            entries: &[
                // 0: input plane
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                // 1: output plane
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                // 2: BlurParams
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 3: kernel coefficients
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GpuBlur pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let make = |entry_point: &str| {
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&layout),
                module: &shader,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        GpuBlurPipeline {
            rows: make("blur_rows"),
            cols: make("blur_cols"),
            bgl,
            workgroup_size,
        }
    }

    /// Blur every plane of `src` into a freshly allocated image.
    ///
    /// Blocks until the GPU has finished.
    pub fn blur(
        &self,
        gpu: &GpuDevice,
        src: &GpuImage,
        params: &GaussianParams,
    ) -> Result<GpuImage, GpuError> {
        let out = gpu.scoped(|| self.encode(gpu, src, params))?;
        gpu.wait();
        Ok(out)
    }

    fn encode(&self, gpu: &GpuDevice, src: &GpuImage, params: &GaussianParams) -> GpuImage {
        let (w, h) = (src.width, src.height);
        let dst = GpuImage::allocate(gpu, w, h, src.layout);
        let scratch = GpuPlane::new(gpu, w, h, "GpuBlur::scratch");

        let uniform = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GpuBlur::params"),
            contents: bytemuck::bytes_of(&BlurParams::new(w, h, params)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let coeffs = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GpuBlur::coeffs"),
            contents: bytemuck::cast_slice(&params.kernel()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let bind = |input: &wgpu::TextureView, output: &wgpu::TextureView| {
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("GpuBlur bind group"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(input),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(output),
                    },
                    wgpu::BindGroupEntry { binding: 2, resource: uniform.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: coeffs.as_entire_binding() },
                ],
            })
        };

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuBlur"),
            });
        let (dx, dy) = self.workgroup_size.dispatch_size(w, h);

        for (s, d) in src.planes.iter().zip(&dst.planes) {
            let passes = [
                ("blur_rows", &self.rows, bind(&s.view, &scratch.view)),
                ("blur_cols", &self.cols, bind(&scratch.view, &d.view)),
            ];
            // Separate passes so the scratch write is visible to the next read.
            for (label, pipeline, bind_group) in &passes {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(*label),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(dx, dy, 1);
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        dst
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::run_gpu_test_in_subprocess;
    use crate::convolution::{gaussian_blur, BorderMode};
    use crate::image::{ChannelLayout, CpuImage, Image};

    #[test]
    fn test_blur_params_layout() {
        // Must match the WGSL struct: four tightly packed u32.
        assert_eq!(std::mem::size_of::<BlurParams>(), 16);
        let p = GaussianParams::new(91, 0.0, BorderMode::Replicate).unwrap();
        let bp = BlurParams::new(640, 480, &p);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&bp));
        assert_eq!(words, &[640, 480, 45, 2]);
    }

    #[test]
    fn test_blur_params_default_border() {
        let p = GaussianParams::new(5, 0.0, BorderMode::default()).unwrap();
        assert_eq!(BlurParams::new(1, 1, &p).border, 0);
        assert_eq!(BlurParams::new(1, 1, &p).radius, 2);
    }

    // ---- GPU parity tests (subprocess-isolated) ----------------------------

    fn noise_plane(w: usize, h: usize, seed: u32) -> Image<u8> {
        // xorshift: deterministic, no rand dependency needed
        let mut s = seed;
        let data = (0..w * h)
            .map(|_| {
                s ^= s << 13;
                s ^= s >> 17;
                s ^= s << 5;
                (s >> 24) as u8
            })
            .collect();
        Image::from_vec(w, h, data)
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_blur_matches_cpu() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let pipeline = GpuBlurPipeline::new(&gpu).unwrap();

        let planes = (1..=3).map(|seed| noise_plane(97, 61, seed)).collect();
        let src = CpuImage::from_planes(ChannelLayout::Rgb, planes);
        let gpu_src = GpuImage::upload(&gpu, &src).unwrap();

        for border in [BorderMode::Reflect101, BorderMode::Reflect, BorderMode::Replicate] {
            // Kernel wider than the image exercises repeated reflections.
            for k in [3, 15, 131] {
                let params = GaussianParams::new(k, 0.0, border).unwrap();
                let cpu = gaussian_blur(&src, &params);
                let out = pipeline.blur(&gpu, &gpu_src, &params).unwrap();
                let host = out.readback(&gpu).unwrap();
                for (c, g) in cpu.planes().iter().zip(host.planes()) {
                    for ((x, y, a), b) in c.pixels().zip(g.as_slice()) {
                        assert!(
                            a.abs_diff(*b) <= 1,
                            "k={k} {border} at ({x},{y}): cpu={a} gpu={b}"
                        );
                    }
                }
            }
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_blur_constant_image() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let pipeline = GpuBlurPipeline::new(&gpu).unwrap();
        let src = CpuImage::gray(Image::from_vec(33, 17, vec![200u8; 33 * 17]));
        let params = GaussianParams::new(91, 0.0, BorderMode::Reflect101).unwrap();
        let out = pipeline
            .blur(&gpu, &GpuImage::upload(&gpu, &src).unwrap(), &params)
            .unwrap()
            .readback(&gpu)
            .unwrap();
        assert_eq!(out, src);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_blur_keeps_build_workgroup_size() {
        let mut gpu = GpuDevice::new().expect("need a GPU");
        gpu.set_workgroup_size(8, 4).unwrap();
        let pipeline = GpuBlurPipeline::new(&gpu).unwrap();
        // A larger size after the build must not shrink the dispatch.
        gpu.set_workgroup_size(16, 16).unwrap();
        assert_eq!(pipeline.workgroup_size(), WorkgroupSize { x: 8, y: 4 });

        let src = CpuImage::gray(noise_plane(75, 43, 7));
        let params = GaussianParams::new(9, 0.0, BorderMode::Reflect101).unwrap();
        let cpu = gaussian_blur(&src, &params);
        let host = pipeline
            .blur(&gpu, &GpuImage::upload(&gpu, &src).unwrap(), &params)
            .unwrap()
            .readback(&gpu)
            .unwrap();
        for ((x, y, a), b) in cpu.plane(0).pixels().zip(host.plane(0).as_slice()) {
            assert!(a.abs_diff(*b) <= 1, "({x},{y}): cpu={a} gpu={b}");
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_blur_keeps_build_workgroup_size() {
        let out = run_gpu_test_in_subprocess(
            "gpu::blur::tests::inner_gpu_blur_keeps_build_workgroup_size",
        );
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_blur_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::blur::tests::inner_gpu_blur_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_blur_constant_image() {
        let out = run_gpu_test_in_subprocess("gpu::blur::tests::inner_gpu_blur_constant_image");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
