//! Image decoding and conversion to a floating-point intensity buffer.
//!
//! The detector works on a single channel of `f32` samples in `[0, 1]`.
//! This module turns whatever the caller has (encoded bytes, a decoded
//! `DynamicImage`, or an 8-bit `GrayImage`) into that buffer. Color
//! sources are reduced with the `image` crate's standard luma weights.

use image::{DynamicImage, GrayImage};

use crate::types::{DetectorError, IntensityImage};

/// Decode raw image bytes and convert to an intensity buffer.
///
/// Supports whatever formats the `image` crate was built with (PNG,
/// JPEG, BMP, WebP).
///
/// # Errors
///
/// Returns [`DetectorError::EmptyInput`] if `bytes` is empty.
/// Returns [`DetectorError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_to_intensity(bytes: &[u8]) -> Result<IntensityImage, DetectorError> {
    if bytes.is_empty() {
        return Err(DetectorError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(to_intensity(&img))
}

/// Convert any decoded image to a single-channel intensity buffer.
#[must_use = "returns the intensity buffer"]
pub fn to_intensity(image: &DynamicImage) -> IntensityImage {
    image.to_luma32f()
}

/// Convert an 8-bit grayscale image to an intensity buffer (`v / 255`).
#[must_use = "returns the intensity buffer"]
pub fn gray_to_intensity(image: &GrayImage) -> IntensityImage {
    DynamicImage::ImageLuma8(image.clone()).to_luma32f()
}

/// Row-major indices of every non-zero entry in a mask or label buffer.
///
/// Used by visualization code to list the pixels of a component mask;
/// pass `image.as_raw()` for an `ImageBuffer`.
#[must_use]
pub fn index_from_nonzero<T: Copy + Default + PartialEq>(mask: &[T]) -> Vec<usize> {
    let zero = T::default();
    mask.iter()
        .enumerate()
        .filter_map(|(i, &v)| (v != zero).then_some(i))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Helper: encode an RGBA image as PNG bytes.
    fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode_to_intensity(&[]);
        assert!(matches!(result, Err(DetectorError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode_to_intensity(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(DetectorError::ImageDecode(_))));
    }

    #[test]
    fn white_png_decodes_to_ones() {
        let img = image::RgbaImage::from_fn(3, 2, |_, _| image::Rgba([255, 255, 255, 255]));
        let intensity = decode_to_intensity(&encode_png(&img)).unwrap();
        assert_eq!(intensity.dimensions(), (3, 2));
        for pixel in intensity.pixels() {
            assert!((pixel.0[0] - 1.0).abs() < 1e-6, "got {}", pixel.0[0]);
        }
    }

    #[test]
    fn luma_weights_green_over_red_over_blue() {
        let img = image::RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => image::Rgba([255, 0, 0, 255]),
            1 => image::Rgba([0, 255, 0, 255]),
            _ => image::Rgba([0, 0, 255, 255]),
        });
        let intensity = decode_to_intensity(&encode_png(&img)).unwrap();
        let r = intensity.get_pixel(0, 0).0[0];
        let g = intensity.get_pixel(1, 0).0[0];
        let b = intensity.get_pixel(2, 0).0[0];
        assert!(g > r && r > b, "expected G > R > B, got R={r} G={g} B={b}");
    }

    #[test]
    fn gray_conversion_scales_to_unit_range() {
        let gray = GrayImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 0 } else { 255 }]));
        let intensity = gray_to_intensity(&gray);
        assert!(intensity.get_pixel(0, 0).0[0].abs() < f32::EPSILON);
        assert!((intensity.get_pixel(1, 0).0[0] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn gray_conversion_matches_dynamic_image_path() {
        let gray = GrayImage::from_fn(3, 2, |x, y| {
            image::Luma([u8::try_from(x * 60 + y * 7).unwrap()])
        });
        let direct = gray_to_intensity(&gray);
        let dynamic = to_intensity(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(direct, dynamic);
        let mid = direct.get_pixel(2, 1).0[0];
        assert!((mid - 127.0 / 255.0).abs() < 1e-6, "got {mid}");
    }

    #[test]
    fn nonzero_indices_are_row_major() {
        let mut mask = GrayImage::new(4, 3);
        mask.put_pixel(1, 0, image::Luma([1]));
        mask.put_pixel(0, 2, image::Luma([255]));
        mask.put_pixel(3, 1, image::Luma([7]));
        assert_eq!(index_from_nonzero(mask.as_raw()), vec![1, 7, 8]);
    }

    #[test]
    fn nonzero_indices_of_float_labels() {
        let labels = [0.0_f32, 0.5, 0.0, -1.0];
        assert_eq!(index_from_nonzero(&labels), vec![1, 3]);
    }

    #[test]
    fn nonzero_indices_of_empty_mask() {
        let mask: [u8; 0] = [];
        assert!(index_from_nonzero(&mask).is_empty());
    }
}
