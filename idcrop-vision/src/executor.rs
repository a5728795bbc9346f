use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::CropError;
use crate::geometry::CropRectangle;

/// Encoded output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    /// Lossless; `quality` is ignored.
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// Integer crop region within the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Snap a resolved rectangle to whole pixels.
///
/// Edges round half-up independently, are clamped to the image and
/// each axis keeps at least one pixel.
pub fn pixel_region(rect: &CropRectangle, image_width: u32, image_height: u32) -> PixelRegion {
    let snap = |start: f64, end: f64, limit: u32| -> (u32, u32) {
        let limit = limit.max(1);
        let lo = (round_half_up(start).max(0.0) as u32).min(limit - 1);
        let hi = (round_half_up(end).max(0.0) as u32).clamp(lo + 1, limit);
        (lo, hi - lo)
    };
    let (x, width) = snap(rect.left, rect.right(), image_width);
    let (y, height) = snap(rect.top, rect.bottom(), image_height);
    PixelRegion {
        x,
        y,
        width,
        height,
    }
}

/// Flatten alpha by compositing onto a white background.
pub(crate) fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba: RgbaImage = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Cut `rect` out of `source` and scale it to exactly `output_width` x `output_height`.
pub fn extract_and_resize(
    source: &DynamicImage,
    rect: &CropRectangle,
    output_width: u32,
    output_height: u32,
) -> RgbImage {
    let region = pixel_region(rect, source.width(), source.height());
    log::debug!("extracting {:?} -> {}x{}", region, output_width, output_height);
    let cropped = source.crop_imm(region.x, region.y, region.width, region.height);
    let resized = cropped.resize_exact(output_width, output_height, FilterType::Lanczos3);
    flatten_alpha(&resized)
}

/// Encode an RGB image. `quality` is clamped into 1..=100 for JPEG.
pub fn encode(image: &RgbImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, CropError> {
    let mut buffer = Vec::new();
    let (w, h) = image.dimensions();
    let color = image::ExtendedColorType::Rgb8;

    let result = match format {
        OutputFormat::Jpeg => JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .write_image(image.as_raw(), w, h, color),
        OutputFormat::Png => PngEncoder::new(&mut buffer).write_image(image.as_raw(), w, h, color),
        OutputFormat::Webp => {
            WebPEncoder::new_lossless(&mut buffer).write_image(image.as_raw(), w, h, color)
        }
    };
    result.map_err(|e| CropError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

/// Encode and write to `path`. Parent directories must already exist.
pub fn save(
    image: &RgbImage,
    path: &Path,
    format: OutputFormat,
    quality: u8,
) -> Result<usize, CropError> {
    let bytes = encode(image, format, quality)?;
    std::fs::write(path, &bytes)
        .map_err(|e| CropError::EncodeError(format!("{}: {e}", path.display())))?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: f64, top: f64, width: f64, height: f64) -> CropRectangle {
        CropRectangle {
            left,
            top,
            width,
            height,
        }
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        }))
    }

    #[test]
    fn pixel_region_rounds_half_up() {
        let region = pixel_region(&rect(24.5, 0.49, 350.72, 438.4), 800, 1000);
        // left 24.5 -> 25, right 375.22 -> 375; top 0.49 -> 0, bottom 438.89 -> 439
        assert_eq!(
            region,
            PixelRegion {
                x: 25,
                y: 0,
                width: 350,
                height: 439
            }
        );
    }

    #[test]
    fn pixel_region_stays_inside() {
        let region = pixel_region(&rect(0.0, 0.0, 99.9999999, 120.0000001), 100, 120);
        assert_eq!(region.width, 100);
        assert_eq!(region.height, 120);

        let sliver = pixel_region(&rect(99.7, 10.0, 0.2, 0.2), 100, 120);
        assert_eq!(sliver.x, 99);
        assert_eq!(sliver.width, 1);
        assert_eq!(sliver.height, 1);
    }

    #[test]
    fn output_has_exact_dimensions() {
        let source = gradient(640, 480);
        let out = extract_and_resize(&source, &rect(100.3, 20.7, 240.0, 300.0), 360, 450);
        assert_eq!(out.dimensions(), (360, 450));

        let upscaled = extract_and_resize(&source, &rect(0.0, 0.0, 8.0, 10.0), 360, 450);
        assert_eq!(upscaled.dimensions(), (360, 450));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let rgba = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]));
        let flat = flatten_alpha(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn encodes_each_format() {
        let img = gradient(36, 45).to_rgb8();
        let jpeg = encode(&img, OutputFormat::Jpeg, 95).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        let png = encode(&img, OutputFormat::Png, 95).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let webp = encode(&img, OutputFormat::Webp, 95).unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
    }

    #[test]
    fn unwritable_path_is_encode_error() {
        let img = gradient(8, 10).to_rgb8();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.jpg");
        assert!(matches!(
            save(&img, &path, OutputFormat::Jpeg, 90),
            Err(CropError::EncodeError(_))
        ));
    }
}
