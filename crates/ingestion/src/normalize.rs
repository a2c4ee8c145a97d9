//! 帧归一化：任意格式/分辨率 → 规范 tile (RGB8)

use contracts::{ImageData, ImageFormat};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::{IngestionError, Result};

/// Convert any supported pixel layout to an `RgbImage`
pub fn to_rgb_image(frame: &ImageData) -> Result<RgbImage> {
    frame.check()?;

    let bpp = frame.format.bytes_per_pixel();
    let raw = match frame.format {
        ImageFormat::Rgb8 => frame.data.to_vec(),
        ImageFormat::Rgba8 => frame
            .data
            .chunks_exact(bpp)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        ImageFormat::Bgr8 | ImageFormat::Bgra8 => frame
            .data
            .chunks_exact(bpp)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
    };

    RgbImage::from_raw(frame.width, frame.height, raw).ok_or_else(|| IngestionError::Normalize {
        message: format!(
            "buffer does not fit {}x{} rgb8",
            frame.width, frame.height
        ),
    })
}

/// Normalize a decoded frame to the canonical tile size
///
/// Frames already at the target size in RGB8 pass through without copying.
pub fn normalize_to_tile(frame: &ImageData, width: u32, height: u32) -> Result<ImageData> {
    if frame.format == ImageFormat::Rgb8 && frame.width == width && frame.height == height {
        frame.check()?;
        return Ok(frame.clone());
    }

    let rgb = to_rgb_image(frame)?;
    let resized = if rgb.width() == width && rgb.height() == height {
        rgb
    } else {
        imageops::resize(&rgb, width, height, FilterType::Triangle)
    };

    Ok(ImageData::new(
        width,
        height,
        ImageFormat::Rgb8,
        resized.into_raw(),
    ))
}
