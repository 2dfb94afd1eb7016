// gpu/image.rs — Multi-plane GPU images, upload and readback.
//
// A `GpuImage` holds one `R32Float` texture per channel. The blur kernels
// accumulate in f32, and keeping the intermediate and final results in f32
// means rounding happens exactly once, on readback, with the same rule the
// CPU path uses (`Pixel::from_f32`: clamp then round).
//
// ROW ALIGNMENT
// ─────────────
// `copy_buffer_to_texture` / `copy_texture_to_buffer` require
// `bytes_per_row` to be a multiple of 256. Plane rows are `width * 4` bytes,
// so both directions go through a staging buffer whose rows are padded up
// to the alignment:
//
//   staging row y: [f32 × width | zero padding up to align_to(width*4, 256)]
//
// Upload returns as soon as the copy is submitted. Readback blocks on
// `map_async` + `poll(Wait)`.

use wgpu::util::DeviceExt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::{ChannelLayout, CpuImage, Image, Pixel};

/// Required `bytes_per_row` multiple for buffer↔texture copies.
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

const TEXEL_BYTES: u32 = std::mem::size_of::<f32>() as u32;

// ---------------------------------------------------------------------------
// GpuPlane
// ---------------------------------------------------------------------------

/// One channel resident on the GPU as an `R32Float` 2D texture.
pub struct GpuPlane {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl GpuPlane {
    /// Allocate an uninitialised plane usable both as a sampled input and as
    /// a storage output of the blur kernels.
    pub fn new(gpu: &GpuDevice, width: u32, height: u32, label: &str) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuPlane { texture, view }
    }
}

// ---------------------------------------------------------------------------
// GpuImage
// ---------------------------------------------------------------------------

/// A 1- or 3-plane image resident on the GPU.
///
/// Owns its textures; dropping it releases the GPU memory.
pub struct GpuImage {
    pub planes: Vec<GpuPlane>,
    pub layout: ChannelLayout,
    pub width: u32,
    pub height: u32,
}

impl GpuImage {
    /// Allocate uninitialised planes for a `width × height` image.
    pub fn allocate(gpu: &GpuDevice, width: u32, height: u32, layout: ChannelLayout) -> Self {
        let planes = (0..layout.channels())
            .map(|c| GpuPlane::new(gpu, width, height, &format!("GpuImage::plane{c}")))
            .collect();
        GpuImage { planes, layout, width, height }
    }

    /// Upload a host image, converting each sample to f32.
    ///
    /// # Errors
    /// `EmptyImage` for a zero-sized source, `TextureTooLarge` when a side
    /// exceeds the device limit, and `Validation` / `OutOfMemory` if wgpu
    /// rejects the allocation or copy.
    pub fn upload(gpu: &GpuDevice, src: &CpuImage) -> Result<Self, GpuError> {
        let (width, height) = check_extent(gpu, src.width(), src.height())?;

        gpu.scoped(|| {
            let img = GpuImage::allocate(gpu, width, height, src.layout());
            let bytes_per_row = align_to(width * TEXEL_BYTES, COPY_ALIGNMENT);

            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("GpuImage::upload"),
                });

            // Staging buffers must stay alive until the submit below.
            let staging: Vec<wgpu::Buffer> = src
                .planes()
                .iter()
                .map(|plane| {
                    gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("GpuImage::staging"),
                        contents: &pack_rows(plane, bytes_per_row),
                        usage: wgpu::BufferUsages::COPY_SRC,
                    })
                })
                .collect();

            for (buf, plane) in staging.iter().zip(&img.planes) {
                encoder.copy_buffer_to_texture(
                    wgpu::ImageCopyBuffer {
                        buffer: buf,
                        layout: wgpu::ImageDataLayout {
                            offset: 0,
                            bytes_per_row: Some(bytes_per_row),
                            rows_per_image: Some(height),
                        },
                    },
                    wgpu::ImageCopyTexture {
                        texture: &plane.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    extent(width, height),
                );
            }

            gpu.queue.submit(std::iter::once(encoder.finish()));
            img
        })
    }

    /// Copy every plane back to host memory and round to u8.
    ///
    /// Synchronous: blocks until the GPU has finished all prior work on
    /// these textures.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<CpuImage, GpuError> {
        let bytes_per_row = align_to(self.width * TEXEL_BYTES, COPY_ALIGNMENT);
        let size = bytes_per_row as u64 * self.height as u64;

        let buffers = gpu.scoped(|| {
            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("GpuImage::readback"),
                });
            let buffers: Vec<wgpu::Buffer> = self
                .planes
                .iter()
                .map(|plane| {
                    let buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("GpuImage::readback"),
                        size,
                        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    encoder.copy_texture_to_buffer(
                        wgpu::ImageCopyTexture {
                            texture: &plane.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::ImageCopyBuffer {
                            buffer: &buf,
                            layout: wgpu::ImageDataLayout {
                                offset: 0,
                                bytes_per_row: Some(bytes_per_row),
                                rows_per_image: Some(self.height),
                            },
                        },
                        extent(self.width, self.height),
                    );
                    buf
                })
                .collect();
            gpu.queue.submit(std::iter::once(encoder.finish()));
            buffers
        })?;

        let planes = buffers
            .iter()
            .map(|buf| read_plane(gpu, buf, self.width, self.height, bytes_per_row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CpuImage::from_planes(self.layout, planes))
    }
}

/// Map one readback buffer and strip the row padding.
fn read_plane(
    gpu: &GpuDevice,
    buf: &wgpu::Buffer,
    width: u32,
    height: u32,
    bytes_per_row: u32,
) -> Result<Image<u8>, GpuError> {
    let slice = buf.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver outlives the poll below; a failed send means it was
        // dropped and nobody is waiting.
        let _ = sender.send(result);
    });
    gpu.wait();
    receiver.recv().map_err(|_| GpuError::MapCallbackLost)??;

    let mapped = slice.get_mapped_range();
    let out = unpack_rows(&mapped, width, height, bytes_per_row);
    drop(mapped);
    buf.unmap();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d { width, height, depth_or_array_layers: 1 }
}

/// Validate a host extent against the device before allocating anything.
fn check_extent(gpu: &GpuDevice, width: usize, height: usize) -> Result<(u32, u32), GpuError> {
    if width == 0 || height == 0 {
        return Err(GpuError::EmptyImage);
    }
    let max = gpu.max_texture_side();
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w <= max && h <= max => Ok((w, h)),
        _ => Err(GpuError::TextureTooLarge {
            width: width.min(u32::MAX as usize) as u32,
            height: height.min(u32::MAX as usize) as u32,
            max,
        }),
    }
}

/// Convert a u8 plane to f32 rows padded to `bytes_per_row`.
fn pack_rows(plane: &Image<u8>, bytes_per_row: u32) -> Vec<u8> {
    let row_bytes = plane.width() * TEXEL_BYTES as usize;
    let mut staging = vec![0u8; bytes_per_row as usize * plane.height()];
    let mut row_f32 = vec![0f32; plane.width()];
    for y in 0..plane.height() {
        for (d, &s) in row_f32.iter_mut().zip(plane.row(y)) {
            *d = s.to_f32();
        }
        let dst = y * bytes_per_row as usize;
        staging[dst..dst + row_bytes].copy_from_slice(bytemuck::cast_slice(&row_f32));
    }
    staging
}

/// Inverse of `pack_rows`: drop padding and round each f32 back to u8.
fn unpack_rows(staging: &[u8], width: u32, height: u32, bytes_per_row: u32) -> Image<u8> {
    let (w, h) = (width as usize, height as usize);
    let row_bytes = w * TEXEL_BYTES as usize;
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let start = y * bytes_per_row as usize;
        out.extend(
            staging[start..start + row_bytes]
                .chunks_exact(TEXEL_BYTES as usize)
                .map(|b| u8::from_f32(bytemuck::pod_read_unaligned::<f32>(b))),
        );
    }
    Image::from_vec(w, h, out)
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::run_gpu_test_in_subprocess;

    // ---- align_to (pure, no GPU needed) ------------------------------------

    #[test]
    fn test_align_to_already_aligned() {
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(512, 256), 512);
        assert_eq!(align_to(768, 256), 768);
    }

    #[test]
    fn test_align_to_rounds_up() {
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(100, 256), 256);
        assert_eq!(align_to(255, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(641, 256), 768);
    }

    #[test]
    fn test_align_to_zero() {
        assert_eq!(align_to(0, 256), 0);
    }

    // ---- Staging layout (pure, no GPU) -------------------------------------

    #[test]
    fn test_pack_rows_pads_each_row() {
        let plane = Image::from_vec(2, 3, vec![1u8, 2, 3, 4, 5, 6]);
        let bpr = align_to(2 * TEXEL_BYTES, COPY_ALIGNMENT);
        assert_eq!(bpr, 256);
        let staging = pack_rows(&plane, bpr);
        assert_eq!(staging.len(), 3 * 256);

        let row1: Vec<f32> = bytemuck::pod_collect_to_vec(&staging[256..264]);
        assert_eq!(row1, vec![3.0, 4.0]);
        // Padding after the first row stays zero.
        assert!(staging[8..256].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unpack_rows_inverts_pack() {
        let pixels: Vec<u8> = (0..70u8).collect();
        let plane = Image::from_vec(70, 1, pixels);
        let bpr = align_to(70 * TEXEL_BYTES, COPY_ALIGNMENT);
        assert_eq!(bpr, 512);
        let staging = pack_rows(&plane, bpr);
        assert_eq!(unpack_rows(&staging, 70, 1, bpr), plane);
    }

    #[test]
    fn test_unpack_rows_rounds_and_clamps() {
        let values = [0.49f32, 0.5, 254.6, 300.0, -3.0, 127.5];
        let bpr = align_to(values.len() as u32 * TEXEL_BYTES, COPY_ALIGNMENT);
        let mut staging = vec![0u8; bpr as usize];
        staging[..values.len() * 4].copy_from_slice(bytemuck::cast_slice(&values));
        let plane = unpack_rows(&staging, values.len() as u32, 1, bpr);
        assert_eq!(plane.as_slice(), &[0, 1, 255, 255, 0, 128]);
    }

    // ---- GPU round-trip tests (subprocess-isolated) ------------------------
    //
    // Same subprocess isolation pattern as gpu::device: dzn crashes on exit.

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_upload_round_trip_rgb() {
        let planes = (0..3u8)
            .map(|c| Image::from_vec(4, 3, (0..12u8).map(|v| v * 10 + c).collect()))
            .collect();
        let src = CpuImage::from_planes(ChannelLayout::Rgb, planes);

        let gpu = GpuDevice::new().expect("need a GPU");
        let gpu_img = GpuImage::upload(&gpu, &src).unwrap();
        assert_eq!((gpu_img.width, gpu_img.height), (4, 3));
        assert_eq!(gpu_img.readback(&gpu).unwrap(), src);

        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_upload_large_gradient() {
        // 641×480 ramp: 2564-byte rows are padded to 2816.
        let pixels: Vec<u8> = (0..(641 * 480)).map(|i| (i % 256) as u8).collect();
        let src = CpuImage::gray(Image::from_vec(641, 480, pixels));

        let gpu = GpuDevice::new().expect("need a GPU");
        let readback = GpuImage::upload(&gpu, &src).unwrap().readback(&gpu).unwrap();
        assert_eq!(readback, src, "large gradient round-trip mismatch");

        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_upload_rejects_empty_and_oversized() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let empty = CpuImage::gray(Image::new(0, 0));
        assert!(matches!(GpuImage::upload(&gpu, &empty), Err(GpuError::EmptyImage)));

        let too_wide = gpu.max_texture_side() as usize + 1;
        let strip = CpuImage::gray(Image::new(too_wide, 1));
        assert!(matches!(
            GpuImage::upload(&gpu, &strip),
            Err(GpuError::TextureTooLarge { .. })
        ));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_upload_round_trip_rgb() {
        let out = run_gpu_test_in_subprocess("gpu::image::tests::inner_upload_round_trip_rgb");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_upload_large_gradient() {
        let out = run_gpu_test_in_subprocess("gpu::image::tests::inner_upload_large_gradient");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_upload_rejects_empty_and_oversized() {
        let out =
            run_gpu_test_in_subprocess("gpu::image::tests::inner_upload_rejects_empty_and_oversized");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
