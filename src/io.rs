// io.rs — Reading the input image and writing JPEG results.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

use crate::convert::{from_dynamic, to_dynamic};
use crate::error::HarnessError;
use crate::image::{ChannelLayout, CpuImage};

/// Decode `path` (format sniffed from the extension and magic bytes) into
/// the requested channel layout.
pub fn load_image(path: &Path, layout: ChannelLayout) -> Result<CpuImage, HarnessError> {
    let decoded = image::open(path).map_err(|source| HarnessError::LoadFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let img = from_dynamic(decoded, layout);
    debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        %layout,
        "decoded input"
    );
    Ok(img)
}

/// Encode `img` as baseline JPEG at `quality` (1..=100) and write it to
/// `path`, replacing any existing file.
pub fn write_jpeg(img: &CpuImage, path: &Path, quality: u8) -> Result<(), HarnessError> {
    let fail = |source| HarnessError::WriteFailure { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(|e| fail(image::ImageError::IoError(e)))?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
    to_dynamic(img).write_with_encoder(encoder).map_err(fail)?;
    debug!(path = %path.display(), quality, "wrote output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn ramp(w: usize, h: usize) -> CpuImage {
        let data = (0..w * h).map(|i| (i % 251) as u8).collect();
        CpuImage::gray(Image::from_vec(w, h, data))
    }

    #[test]
    fn test_missing_input_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.png");
        let err = load_image(&path, ChannelLayout::Rgb).unwrap_err();
        assert!(matches!(err, HarnessError::LoadFailure { path: ref p, .. } if p == &path));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_garbage_input_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(
            load_image(&path, ChannelLayout::Gray),
            Err(HarnessError::LoadFailure { .. })
        ));
    }

    #[test]
    fn test_jpeg_written_and_decodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        write_jpeg(&ramp(40, 30), &path, 95).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        let back = load_image(&path, ChannelLayout::Gray).unwrap();
        assert_eq!((back.width(), back.height()), (40, 30));
    }

    #[test]
    fn test_jpeg_output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let img = ramp(17, 9);
        write_jpeg(&img, &a, 90).unwrap();
        write_jpeg(&img, &b, 90).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn test_png_input_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.png");
        let mut rgb = image::RgbImage::new(3, 2);
        rgb.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        rgb.save(&path).unwrap();

        let img = load_image(&path, ChannelLayout::Rgb).unwrap();
        assert_eq!(img.layout(), ChannelLayout::Rgb);
        assert_eq!(img.plane(0).get(2, 1), 10);
        assert_eq!(img.plane(2).get(2, 1), 30);
    }

    #[test]
    fn test_unwritable_output_is_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.jpg");
        let err = write_jpeg(&ramp(4, 4), &path, 95).unwrap_err();
        assert!(matches!(err, HarnessError::WriteFailure { .. }));
        assert_eq!(err.exit_code(), 5);
    }
}
