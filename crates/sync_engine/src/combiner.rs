//! Frame combiner: grid layout, labelled status tiles, tile compositing

use ab_glyph::{FontRef, PxScale};
use contracts::{ImageData, ImageFormat, StreamHealthState, TileRect};
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Grid geometry for a given active-stream count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    pub columns: u32,
    pub rows: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl StreamLayout {
    /// 1 → 1×1, 2 → 2×1, 3–4 → 2×2, larger counts grow a near-square grid.
    /// With no streams the canvas keeps the two-tile size.
    pub fn for_count(count: usize, tile_width: u32, tile_height: u32) -> Self {
        let (columns, rows) = match count {
            0 | 2 => (2, 1),
            1 => (1, 1),
            3 | 4 => (2, 2),
            n => {
                let columns = (n as f64).sqrt().ceil() as u32;
                let rows = (n as u32).div_ceil(columns);
                (columns, rows)
            }
        };
        Self {
            columns,
            rows,
            tile_width,
            tile_height,
        }
    }

    pub fn slots(&self) -> usize {
        (self.columns * self.rows) as usize
    }

    pub fn canvas_width(&self) -> u32 {
        self.columns * self.tile_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.rows * self.tile_height
    }

    /// Pixel rectangle of a row-major slot
    pub fn tile_rect(&self, slot: usize) -> Option<TileRect> {
        if slot >= self.slots() {
            return None;
        }
        let slot = slot as u32;
        Some(TileRect {
            x: (slot % self.columns) * self.tile_width,
            y: (slot / self.columns) * self.tile_height,
            width: self.tile_width,
            height: self.tile_height,
        })
    }
}

/// Status tile variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderKind {
    Initializing,
    /// Ready but nothing decoded yet
    Preparing,
    Failed,
    Reconnecting,
}

impl PlaceholderKind {
    pub fn for_state(state: StreamHealthState) -> Self {
        match state {
            StreamHealthState::Initializing => Self::Initializing,
            StreamHealthState::Ready => Self::Preparing,
            StreamHealthState::Error | StreamHealthState::Timeout => Self::Failed,
            StreamHealthState::Reconnecting => Self::Reconnecting,
        }
    }

    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::Initializing => [40, 70, 160],
            Self::Preparing => [40, 140, 70],
            Self::Failed => [170, 40, 40],
            Self::Reconnecting => [210, 120, 30],
        }
    }
}

/// Status line shown for a stream without a usable frame
pub fn placeholder_label(name: &str, stream_id: u32, state: StreamHealthState) -> String {
    format!("{name} (stream {stream_id}): {}", status_text(state))
}

fn status_text(state: StreamHealthState) -> String {
    match PlaceholderKind::for_state(state) {
        PlaceholderKind::Preparing => "preparing".to_string(),
        _ => state.to_string(),
    }
}

/// 占位图上的文字
const LABEL_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");
const LABEL_COLOR: Rgb<u8> = Rgb([245, 245, 245]);
/// Tiles shorter than this stay plain
const MIN_LABEL_TILE_HEIGHT: u32 = 24;
const MIN_LABEL_PX: f32 = 8.0;
const MAX_LABEL_PX: f32 = 40.0;

#[derive(Debug)]
struct CachedPlaceholder {
    lines: Vec<String>,
    image: ImageData,
}

/// Composites per-stream tiles into one RGB8 canvas
#[derive(Debug)]
pub struct FrameCombiner {
    tile_width: u32,
    tile_height: u32,
    placeholders: HashMap<(u32, PlaceholderKind), CachedPlaceholder>,
}

impl FrameCombiner {
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width,
            tile_height,
            placeholders: HashMap::new(),
        }
    }

    pub fn layout(&self, count: usize) -> StreamLayout {
        StreamLayout::for_count(count, self.tile_width, self.tile_height)
    }

    /// Labelled status tile for one stream
    ///
    /// Rendered once per (stream, kind) and re-rendered only when the text
    /// changes; the returned image shares the cached buffer.
    pub fn placeholder(
        &mut self,
        stream_id: u32,
        name: &str,
        state: StreamHealthState,
    ) -> ImageData {
        let kind = PlaceholderKind::for_state(state);
        let mut lines = vec![format!("Stream {stream_id}")];
        if !name.is_empty() {
            lines.push(name.to_string());
        }
        lines.push(status_text(state));

        if let Some(cached) = self.placeholders.get(&(stream_id, kind)) {
            if cached.lines == lines {
                return cached.image.clone();
            }
        }

        trace!(stream_id, ?kind, "rendering placeholder tile");
        let image = render_placeholder(self.tile_width, self.tile_height, kind, &lines);
        self.placeholders.insert(
            (stream_id, kind),
            CachedPlaceholder {
                lines,
                image: image.clone(),
            },
        );
        image
    }

    /// Blit tiles into their slots; slots past `tiles.len()` stay black
    pub fn compose(&self, layout: &StreamLayout, tiles: &[&ImageData]) -> ImageData {
        let mut canvas = RgbImage::new(layout.canvas_width(), layout.canvas_height());

        for (slot, tile) in tiles.iter().enumerate() {
            let Some(rect) = layout.tile_rect(slot) else {
                trace!(slot, "more tiles than layout slots");
                break;
            };
            if tile.format != ImageFormat::Rgb8 {
                trace!(slot, format = ?tile.format, "skipping non-rgb tile");
                continue;
            }
            let Some(view) =
                ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(tile.width, tile.height, &tile.data[..])
            else {
                trace!(slot, "tile buffer does not match its geometry");
                continue;
            };
            image::imageops::replace(&mut canvas, &view, rect.x as i64, rect.y as i64);
        }

        ImageData::new(
            canvas.width(),
            canvas.height(),
            ImageFormat::Rgb8,
            canvas.into_raw(),
        )
    }
}

/// Solid tile in the kind's color with the lines centred on it
fn render_placeholder(
    width: u32,
    height: u32,
    kind: PlaceholderKind,
    lines: &[String],
) -> ImageData {
    let mut tile = RgbImage::from_pixel(width, height, Rgb(kind.color()));

    if height >= MIN_LABEL_TILE_HEIGHT && !lines.is_empty() {
        match FontRef::try_from_slice(LABEL_FONT) {
            Ok(font) => draw_label(&mut tile, &font, lines),
            Err(e) => warn!(error = %e, "label font unusable, placeholder left blank"),
        }
    }

    ImageData::new(width, height, ImageFormat::Rgb8, tile.into_raw())
}

fn draw_label(tile: &mut RgbImage, font: &FontRef<'_>, lines: &[String]) {
    let (width, height) = tile.dimensions();
    let margin = (height / 12).max(2);
    let usable_width = width.saturating_sub(2 * margin) as f32;
    let usable_height = height.saturating_sub(2 * margin) as f32;

    // 行高按高度分配，再按最长一行收缩到可用宽度
    let mut px = (usable_height / (lines.len() as f32 * 1.3)).min(MAX_LABEL_PX);
    for line in lines {
        let (line_width, _) = text_size(PxScale::from(px), font, line);
        if line_width as f32 > usable_width && line_width > 0 {
            px *= usable_width / line_width as f32;
        }
    }
    if px < MIN_LABEL_PX {
        return;
    }

    let scale = PxScale::from(px);
    let line_height = (px * 1.3).round() as i32;
    let block_height = line_height * lines.len() as i32;
    let mut y = (height as i32 - block_height) / 2;
    for line in lines {
        let (line_width, _) = text_size(scale, font, line);
        let x = (width as i32 - line_width as i32) / 2;
        draw_text_mut(tile, LABEL_COLOR, x.max(margin as i32), y, scale, font, line);
        y += line_height;
    }
}
