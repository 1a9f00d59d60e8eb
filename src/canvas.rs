use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbaImage};
use tiny_skia::{FillRule, Paint, Path as SkPath, PathBuilder, Pixmap, Rect, Transform};

use crate::color::Rgb;

/// Coverage mask for one glyph, row-major, one byte per pixel.
#[derive(Debug, Clone, Default)]
pub struct GlyphMask {
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

/// An opaque RGBA frame. Shapes with curves go through tiny-skia; text
/// coverage masks and axis-aligned blocks are blended directly.
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgb) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate a {width}x{height} canvas"))?;
        let mut canvas = Self { pixmap };
        canvas.clear(background);
        Ok(canvas)
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn clear(&mut self, color: Rgb) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, 255));
    }

    /// RGBA bytes. Every pixel is opaque, so premultiplied and straight
    /// alpha agree.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = ((y * self.width() + x) * 4) as usize;
        let data = self.pixmap.data();
        Some([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]])
    }

    /// Pixel-exact solid rectangle, clipped to the canvas.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb) {
        let width = self.width() as i32;
        let height = self.height() as i32;
        let x0 = x.clamp(0, width);
        let y0 = y.clamp(0, height);
        let x1 = x.saturating_add(w as i32).clamp(0, width);
        let y1 = y.saturating_add(h as i32).clamp(0, height);
        let rgba = color.rgba();
        let frame = self.pixmap.data_mut();
        for yy in y0..y1 {
            let row_start = (yy * width * 4) as usize;
            for xx in x0..x1 {
                let idx = row_start + (xx * 4) as usize;
                frame[idx..idx + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Anti-aliased rounded rectangle covering `[x0, x1] x [y0, y1]`.
    pub fn fill_rounded_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, radius: f32, color: Rgb) {
        if let Some(path) = rounded_rect_path(x0, y0, x1 - x0, y1 - y0, radius) {
            self.fill_path(&path, color);
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgb) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.fill_path(&path, color);
        }
    }

    /// Blends a coverage mask at `(x, y)` in `color`, clipped to the canvas.
    pub fn blend_mask(&mut self, x: i32, y: i32, mask: &GlyphMask, color: Rgb) {
        let frame_width = self.width() as i32;
        let frame_height = self.height() as i32;
        let frame = self.pixmap.data_mut();
        for row in 0..mask.height {
            let py = y + row as i32;
            if py < 0 || py >= frame_height {
                continue;
            }
            for col in 0..mask.width {
                let px = x + col as i32;
                if px < 0 || px >= frame_width {
                    continue;
                }
                let coverage = mask.coverage[row * mask.width + col];
                if coverage == 0 {
                    continue;
                }
                let idx = ((py * frame_width + px) * 4) as usize;
                blend_pixel(frame, idx, [color.r, color.g, color.b, coverage]);
            }
        }
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = RgbaImage::from_raw(self.width(), self.height(), self.pixels().to_vec())
            .ok_or_else(|| anyhow!("canvas buffer does not match its dimensions"))?;
        image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write frame {}", path.display()))
    }

    fn fill_path(&mut self, path: &SkPath, color: Rgb) {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, 255);
        paint.anti_alias = true;
        self.pixmap
            .fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<SkPath> {
    let rect = Rect::from_xywh(x, y, w, h)?;
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    if r == 0.0 {
        return Some(PathBuilder::from_rect(rect));
    }
    // Cubic approximation of a quarter circle.
    let k = r * 0.552_284_8;
    let (left, top, right, bottom) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let mut pb = PathBuilder::new();
    pb.move_to(left + r, top);
    pb.line_to(right - r, top);
    pb.cubic_to(right - r + k, top, right, top + r - k, right, top + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(left + r, bottom);
    pb.cubic_to(left + r - k, bottom, left, bottom - r + k, left, bottom - r);
    pb.line_to(left, top + r);
    pb.cubic_to(left, top + r - k, left + r - k, top, left + r, top);
    pb.close();
    pb.finish()
}

fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }
    let inv_alpha = 255_u16.saturating_sub(alpha);
    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}
