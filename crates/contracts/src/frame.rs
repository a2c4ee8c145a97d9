//! CombinedFrame - Sync Engine output

use serde::{Deserialize, Serialize};

use crate::{ImageData, StreamHealthState, StreamId};

/// 90 kHz presentation clock used by video sinks
pub const PTS_CLOCK_RATE: u64 = 90_000;

/// Pixel rectangle of one tile inside the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where a tile's pixels came from this cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TileSource {
    /// Frame read during this cycle
    Fresh { captured_at: f64 },
    /// Last-known-good frame re-used
    Cached { captured_at: f64 },
    /// Frame looked up in the delay buffer
    Delayed { captured_at: f64 },
    /// Generated status tile
    Placeholder,
}

impl TileSource {
    /// Capture time of the displayed pixels, if any
    pub fn captured_at(&self) -> Option<f64> {
        match *self {
            Self::Fresh { captured_at }
            | Self::Cached { captured_at }
            | Self::Delayed { captured_at } => Some(captured_at),
            Self::Placeholder => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh { .. } => "fresh",
            Self::Cached { .. } => "cached",
            Self::Delayed { .. } => "delayed",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Per-tile metadata attached to a combined frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    pub stream_id: StreamId,
    /// Row-major grid slot
    pub slot: usize,
    pub rect: TileRect,
    pub health: StreamHealthState,
    pub source: TileSource,
    /// Human-readable status line (placeholders only)
    pub label: Option<String>,
}

/// Composite canvas delivered to the video sink and detection
#[derive(Debug, Clone)]
pub struct CombinedFrame {
    /// Monotonic frame counter (starts at 0)
    pub frame_id: u64,

    /// Presentation timestamp in seconds since the first produced frame
    pub pts: f64,

    /// Cycle time on the shared clock
    pub produced_at: f64,

    /// RGB8 canvas
    pub image: ImageData,

    /// One entry per laid-out stream, in slot order
    pub tiles: Vec<TileInfo>,
}

impl CombinedFrame {
    /// Presentation timestamp in 1/90000 s ticks
    pub fn pts_ticks(&self) -> u64 {
        (self.pts.max(0.0) * PTS_CLOCK_RATE as f64).round() as u64
    }

    pub fn tile(&self, stream_id: StreamId) -> Option<&TileInfo> {
        self.tiles.iter().find(|t| t.stream_id == stream_id)
    }

    /// Copy one tile's pixels out of the canvas
    pub fn crop_tile(&self, rect: TileRect) -> Option<ImageData> {
        let canvas_w = self.image.width as usize;
        if rect.x + rect.width > self.image.width || rect.y + rect.height > self.image.height {
            return None;
        }
        let bpp = self.image.format.bytes_per_pixel();
        let row_len = rect.width as usize * bpp;
        let mut out = Vec::with_capacity(row_len * rect.height as usize);
        for row in rect.y..rect.y + rect.height {
            let start = (row as usize * canvas_w + rect.x as usize) * bpp;
            out.extend_from_slice(self.image.data.get(start..start + row_len)?);
        }
        Some(ImageData::new(
            rect.width,
            rect.height,
            self.image.format,
            out,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageFormat;

    fn two_tone_canvas() -> CombinedFrame {
        // 4x2 canvas, left half red, right half blue
        let mut data = Vec::new();
        for _ in 0..2 {
            for x in 0..4 {
                if x < 2 {
                    data.extend_from_slice(&[255, 0, 0]);
                } else {
                    data.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        CombinedFrame {
            frame_id: 0,
            pts: 1.5,
            produced_at: 1.5,
            image: ImageData::new(4, 2, ImageFormat::Rgb8, data),
            tiles: Vec::new(),
        }
    }

    #[test]
    fn test_pts_ticks() {
        assert_eq!(two_tone_canvas().pts_ticks(), 135_000);
    }

    #[test]
    fn test_crop_tile() {
        let frame = two_tone_canvas();
        let right = frame
            .crop_tile(TileRect {
                x: 2,
                y: 0,
                width: 2,
                height: 2,
            })
            .unwrap();
        assert_eq!(right.pixel_rgb(0, 1), Some([0, 0, 255]));
        assert!(frame
            .crop_tile(TileRect {
                x: 3,
                y: 0,
                width: 2,
                height: 2
            })
            .is_none());
    }

    #[test]
    fn test_tile_source_captured_at() {
        assert_eq!(TileSource::Placeholder.captured_at(), None);
        assert_eq!(
            TileSource::Delayed { captured_at: 2.0 }.captured_at(),
            Some(2.0)
        );
    }
}
