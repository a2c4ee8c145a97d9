//! Stream descriptors, health states and captured frames.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ContractError;

/// Stream identifier. Streams map 1:1 to cameras, so the same number is
/// used as the camera id once frames reach detection.
pub type StreamId = u32;

/// Camera identifier used by tracking and fusion
pub type CameraId = u32;

/// 摄像头流描述 (immutable at runtime except `enabled`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StreamDescriptor {
    /// 唯一标识符
    pub id: StreamId,

    /// Display name shown on placeholder tiles and in logs
    #[serde(default)]
    pub name: String,

    /// Source address, e.g. `rtsp://...` or `synthetic://lobby?fps=30`
    #[validate(length(min = 1, message = "address must not be empty"))]
    pub address: String,

    /// Disabled streams are neither opened nor laid out
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Initial artificial delay (ms)
    #[serde(default)]
    #[validate(range(max = 5000, message = "delay_ms must be within 0..=5000"))]
    pub delay_ms: u32,
}

fn default_enabled() -> bool {
    true
}

impl StreamDescriptor {
    pub fn new(id: StreamId, address: impl Into<String>) -> Self {
        Self {
            id,
            name: format!("Camera {id}"),
            address: address.into(),
            enabled: true,
            delay_ms: 0,
        }
    }

    /// Address scheme (`rtsp`, `synthetic`, ...), lower-cased
    pub fn scheme(&self) -> Option<String> {
        self.address
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
    }
}

/// Per-stream health state machine states
///
/// ```text
/// Initializing ──first read──▶ Ready ──read failure──▶ Error ──retry──▶ Reconnecting
///      │  ▲                                                                │
///      │  └──────────────────────────── reopened ───────────────────────────┘
///      └──deadline──▶ Timeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamHealthState {
    #[default]
    Initializing,
    Ready,
    Error,
    Timeout,
    Reconnecting,
}

impl StreamHealthState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Numeric code exported on the health gauge
    pub fn code(&self) -> f64 {
        match self {
            Self::Initializing => 0.0,
            Self::Ready => 1.0,
            Self::Error => 2.0,
            Self::Timeout => 3.0,
            Self::Reconnecting => 4.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for StreamHealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 图像数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// 图像宽度
    pub width: u32,

    /// 图像高度
    pub height: u32,

    /// 像素格式
    pub format: ImageFormat,

    /// 原始像素数据 (row-major, tightly packed)
    pub data: Bytes,
}

/// 图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }
}

impl ImageData {
    pub fn new(width: u32, height: u32, format: ImageFormat, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
        }
    }

    /// Solid RGB image
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(width, height, ImageFormat::Rgb8, data)
    }

    /// Expected buffer length for the declared geometry
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Check that the buffer matches width × height × bpp
    pub fn check(&self) -> Result<(), ContractError> {
        if self.width == 0 || self.height == 0 {
            return Err(ContractError::MalformedImage {
                width: self.width,
                height: self.height,
                message: "zero-sized image".into(),
            });
        }
        if self.data.len() != self.expected_len() {
            return Err(ContractError::MalformedImage {
                width: self.width,
                height: self.height,
                message: format!(
                    "buffer has {} bytes, expected {}",
                    self.data.len(),
                    self.expected_len()
                ),
            });
        }
        Ok(())
    }

    /// RGB value at (x, y); `None` outside the image or for short buffers
    pub fn pixel_rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let px = self.data.get(offset..offset + 3)?;
        Some(match self.format {
            ImageFormat::Rgb8 | ImageFormat::Rgba8 => [px[0], px[1], px[2]],
            ImageFormat::Bgr8 | ImageFormat::Bgra8 => [px[2], px[1], px[0]],
        })
    }
}

/// One decoded frame from a stream
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub stream_id: StreamId,

    /// Capture timestamp on the shared clock (seconds)
    pub timestamp: f64,

    /// Per-stream sequence number assigned by the source
    pub sequence: u64,

    pub image: ImageData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_from_toml_like_json() {
        let json = r#"{"id": 2, "address": "synthetic://yard"}"#;
        let desc: StreamDescriptor = serde_json::from_str(json).unwrap();
        assert!(desc.enabled);
        assert_eq!(desc.delay_ms, 0);
        assert_eq!(desc.scheme().as_deref(), Some("synthetic"));
    }

    #[test]
    fn test_descriptor_validation_rejects_large_delay() {
        let mut desc = StreamDescriptor::new(0, "synthetic://a");
        desc.delay_ms = 6000;
        assert!(desc.validate().is_err());
        desc.delay_ms = 5000;
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_image_check() {
        let img = ImageData::filled(4, 2, [1, 2, 3]);
        assert!(img.check().is_ok());

        let bad = ImageData::new(4, 2, ImageFormat::Rgb8, vec![0u8; 5]);
        assert!(matches!(
            bad.check(),
            Err(ContractError::MalformedImage { .. })
        ));
    }

    #[test]
    fn test_pixel_rgb_handles_bgr() {
        let img = ImageData::new(1, 1, ImageFormat::Bgra8, vec![10u8, 20, 30, 255]);
        assert_eq!(img.pixel_rgb(0, 0), Some([30, 20, 10]));
        assert_eq!(img.pixel_rgb(1, 0), None);
    }

    #[test]
    fn test_health_labels() {
        assert_eq!(StreamHealthState::default(), StreamHealthState::Initializing);
        assert_eq!(StreamHealthState::Reconnecting.to_string(), "reconnecting");
        assert!(StreamHealthState::Ready.is_ready());
    }
}
