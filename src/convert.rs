// convert.rs — Conversions between `image` crate buffers and CpuImage.
//
// The `image` crate stores pixels interleaved (RGBRGB...), CpuImage stores
// one plane per channel. These functions split and re-interleave; values
// are copied unchanged.

use image::{DynamicImage, GrayImage, RgbImage};

use crate::image::{ChannelLayout, CpuImage, Image};

/// Convert a decoded image into the requested layout.
///
/// Alpha is dropped and higher bit depths are reduced to 8 bits, which is
/// how the default colour load behaves for the harness input.
pub fn from_dynamic(img: DynamicImage, layout: ChannelLayout) -> CpuImage {
    match layout {
        ChannelLayout::Gray => from_gray(&img.into_luma8()),
        ChannelLayout::Rgb => from_rgb(&img.into_rgb8()),
    }
}

/// Wrap a single-channel buffer.
pub fn from_gray(img: &GrayImage) -> CpuImage {
    let (w, h) = img.dimensions();
    CpuImage::gray(Image::from_vec(w as usize, h as usize, img.as_raw().clone()))
}

/// Split an interleaved RGB buffer into three planes.
pub fn from_rgb(img: &RgbImage) -> CpuImage {
    let (w, h) = img.dimensions();
    let n = (w * h) as usize;
    let mut planes = [
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
    ];
    for px in img.as_raw().chunks_exact(3) {
        for (plane, &v) in planes.iter_mut().zip(px) {
            plane.push(v);
        }
    }
    let planes = planes
        .into_iter()
        .map(|p| Image::from_vec(w as usize, h as usize, p))
        .collect();
    CpuImage::from_planes(ChannelLayout::Rgb, planes)
}

/// Re-interleave a CpuImage for encoding.
pub fn to_dynamic(img: &CpuImage) -> DynamicImage {
    let (w, h) = (img.width() as u32, img.height() as u32);
    match img.layout() {
        ChannelLayout::Gray => {
            let buf = GrayImage::from_raw(w, h, img.plane(0).as_slice().to_vec())
                .expect("plane length is width * height");
            DynamicImage::ImageLuma8(buf)
        }
        ChannelLayout::Rgb => {
            let [r, g, b] = [img.plane(0), img.plane(1), img.plane(2)].map(Image::as_slice);
            let raw: Vec<u8> = r
                .iter()
                .zip(g)
                .zip(b)
                .flat_map(|((&r, &g), &b)| [r, g, b])
                .collect();
            let buf = RgbImage::from_raw(w, h, raw).expect("3 samples per pixel");
            DynamicImage::ImageRgb8(buf)
        }
    }
}
