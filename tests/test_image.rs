// tests/test_image.rs — Integration tests for Image<T>, CpuImage and conversions.
//
// These run with `cargo test --test test_image` and only see the public API.

use gauss_bench::convert;
use gauss_bench::image::{ChannelLayout, CpuImage, Image, Pixel};

// ===== Image construction & basic access =====

#[test]
fn image_new_zero_initialized() {
    let img: Image<u8> = Image::new(100, 50);
    assert_eq!(img.width(), 100);
    assert_eq!(img.height(), 50);
    assert_eq!(img.get(0, 0), 0);
    assert_eq!(img.get(99, 49), 0);
}

#[test]
fn image_set_get_consistency() {
    let mut img: Image<u8> = Image::new(10, 10);
    for y in 0..10 {
        for x in 0..10 {
            let val = if (x + y) % 2 == 0 { 255u8 } else { 0u8 };
            img.set(x, y, val);
        }
    }
    for y in 0..10 {
        for x in 0..10 {
            let expected = if (x + y) % 2 == 0 { 255u8 } else { 0u8 };
            assert_eq!(img.get(x, y), expected, "mismatch at ({x}, {y})");
        }
    }
}

#[test]
fn image_from_vec_is_row_major() {
    let img = Image::from_vec(3, 2, vec![1u8, 2, 3, 4, 5, 6]);
    assert_eq!(img.get(2, 0), 3);
    assert_eq!(img.get(0, 1), 4);
    assert_eq!(img.row(1), &[4, 5, 6]);
}

#[test]
#[should_panic(expected = "data length")]
fn image_from_vec_wrong_length_panics() {
    let _ = Image::from_vec(3, 3, vec![0u8; 8]);
}

// ===== Iterator =====

#[test]
fn pixels_iterator_visits_every_pixel_in_order() {
    let img = Image::from_vec(2, 2, vec![10u8, 11, 12, 13]);
    let seen: Vec<_> = img.pixels().collect();
    assert_eq!(seen, vec![(0, 0, 10), (1, 0, 11), (0, 1, 12), (1, 1, 13)]);
}

// ===== Pixel conversions =====

#[test]
fn u8_from_f32_rounds_and_clamps() {
    assert_eq!(u8::from_f32(-5.0), 0);
    assert_eq!(u8::from_f32(0.4), 0);
    assert_eq!(u8::from_f32(0.5), 1);
    assert_eq!(u8::from_f32(254.5), 255);
    assert_eq!(u8::from_f32(1e9), 255);
    assert_eq!(200u8.to_f32(), 200.0);
}

// ===== CpuImage =====

#[test]
fn cpu_image_rgb_needs_three_matching_planes() {
    let planes = vec![Image::new(4, 2), Image::new(4, 2), Image::new(4, 2)];
    let img = CpuImage::from_planes(ChannelLayout::Rgb, planes);
    assert_eq!((img.width(), img.height()), (4, 2));
    assert_eq!(img.layout().channels(), 3);
}

#[test]
#[should_panic(expected = "same dimensions")]
fn cpu_image_mismatched_planes_panic() {
    let planes = vec![Image::new(4, 2), Image::new(4, 2), Image::new(2, 4)];
    let _ = CpuImage::from_planes(ChannelLayout::Rgb, planes);
}

#[test]
fn difference_energy_of_identical_images_is_zero() {
    let img = CpuImage::gray(Image::from_vec(2, 2, vec![1u8, 2, 3, 4]));
    assert_eq!(img.difference_energy(&img.clone()), 0.0);

    let other = CpuImage::gray(Image::from_vec(2, 2, vec![1u8, 2, 3, 6]));
    // One pixel off by 2 over four pixels: 4 / 4.
    assert_eq!(img.difference_energy(&other), 1.0);
}

// ===== image crate conversions =====

#[test]
fn rgb_round_trip_through_image_crate() {
    let mut rgb = image::RgbImage::new(5, 3);
    for (x, y, px) in rgb.enumerate_pixels_mut() {
        *px = image::Rgb([x as u8 * 40, y as u8 * 80, 7]);
    }
    let planes = convert::from_rgb(&rgb);
    assert_eq!(planes.plane(0).get(4, 0), 160);
    assert_eq!(planes.plane(1).get(0, 2), 160);
    assert_eq!(convert::to_dynamic(&planes).as_rgb8(), Some(&rgb));
}

#[test]
fn grayscale_load_layout() {
    let rgb = image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]));
    let img = convert::from_dynamic(image::DynamicImage::ImageRgb8(rgb), ChannelLayout::Gray);
    assert_eq!(img.planes().len(), 1);
    assert!(img.plane(0).as_slice().iter().all(|&v| v == 0));
}
