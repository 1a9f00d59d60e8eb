use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use tracing::{debug, warn};

use crate::canvas::{Canvas, GlyphMask};
use crate::color::Rgb;
use crate::font8x8;
use crate::schema::FontConfig;

pub const DEFAULT_MONO_CANDIDATES: [&str; 7] = [
    "/usr/local/share/fonts/JetBrainsMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/SFMono-Regular.otf",
    "/Library/Fonts/SF-Mono-Regular.otf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
];

pub const DEFAULT_WIDE_CANDIDATES: [&str; 6] = [
    "/System/Library/Fonts/ヒラギノ角ゴシック W8.ttc",
    "/System/Library/Fonts/Hiragino Sans GB.ttc",
    "/System/Library/Fonts/STHeiti Medium.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Small,
}

struct OutlineGlyph {
    mask: GlyphMask,
    xmin: i32,
    top: i32,
}

/// A parsed font file. Sizes are chosen per draw; rasterized glyphs are
/// cached by `(char, size)`.
struct OutlineFace {
    font: Font,
    label: String,
    cache: HashMap<(char, u32), OutlineGlyph>,
}

impl OutlineFace {
    fn load(path: &Path, scale: f32) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let settings = FontSettings {
            collection_index: 0,
            scale,
            ..FontSettings::default()
        };
        let font = Font::from_bytes(bytes, settings)
            .map_err(|error| anyhow!("failed to parse font {}: {error}", path.display()))?;
        Ok(Self {
            font,
            label: path.display().to_string(),
            cache: HashMap::new(),
        })
    }

    fn has_glyph(&self, ch: char) -> bool {
        ch == ' ' || self.font.lookup_glyph_index(ch) != 0
    }

    fn advance(&self, ch: char, size: u32) -> u32 {
        let metrics = self.font.metrics(ch, size as f32);
        metrics.advance_width.ceil().max(1.0) as u32
    }

    fn draw(&mut self, canvas: &mut Canvas, x: i32, y: i32, ch: char, size: u32, color: Rgb) {
        let font = &self.font;
        let glyph = self.cache.entry((ch, size)).or_insert_with(|| {
            let px = size as f32;
            let ascent = font
                .horizontal_line_metrics(px)
                .map_or(px * 0.8, |metrics| metrics.ascent);
            let (metrics, coverage) = font.rasterize(ch, px);
            OutlineGlyph {
                mask: GlyphMask {
                    width: metrics.width,
                    height: metrics.height,
                    coverage,
                },
                xmin: metrics.xmin,
                top: (ascent - metrics.height as f32 - metrics.ymin as f32).round() as i32,
            }
        });
        if glyph.mask.width == 0 || glyph.mask.height == 0 {
            return;
        }
        canvas.blend_mask(x + glyph.xmin, y + glyph.top, &glyph.mask, color);
    }
}

/// Built-in 8x8 glyphs stretched over a `cell_width x height` box.
#[derive(Debug, Clone, Copy)]
struct BitmapFace {
    cell_width: u32,
    height: u32,
}

impl BitmapFace {
    fn for_size(size: u32) -> Self {
        Self {
            cell_width: ((size as f32 * 0.6).ceil() as u32).max(8),
            height: size.max(8),
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        font8x8::glyph(ch).is_some()
    }

    fn draw(&self, canvas: &mut Canvas, x: i32, y: i32, ch: char, color: Rgb) {
        let Some(rows) = font8x8::glyph(ch) else {
            return;
        };
        let span = |extent: u32, i: u32| (extent * i / 8) as i32;
        for (row, bits) in rows.iter().enumerate() {
            let row = row as u32;
            let y0 = y + span(self.height, row);
            let y1 = y + span(self.height, row + 1);
            for col in 0..8_u32 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let x0 = x + span(self.cell_width, col);
                let x1 = x + span(self.cell_width, col + 1);
                canvas.fill_rect(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32, color);
            }
        }
    }
}

/// The faces a frame is drawn with. Each character goes to the primary
/// face when it has the glyph, then the wide face, then the bitmap font;
/// a character none of them covers draws nothing.
pub struct FontSet {
    mono: Option<OutlineFace>,
    wide: Option<OutlineFace>,
    regular_size: u32,
    small_size: u32,
    regular_bitmap: BitmapFace,
    small_bitmap: BitmapFace,
    cell_width: u32,
}

impl FontSet {
    /// Resolves faces from the configured candidates (or the platform
    /// defaults). Never fails; every fallback is logged.
    pub fn resolve(config: &FontConfig, regular_size: u32, small_size: u32) -> Self {
        if config.builtin_only {
            debug!("font discovery disabled, using built-in bitmap font");
            return Self::builtin(regular_size, small_size);
        }

        let mono_candidates = candidates(&config.mono, &DEFAULT_MONO_CANDIDATES);
        let wide_candidates = candidates(&config.wide, &DEFAULT_WIDE_CANDIDATES);

        let mono = first_usable(&mono_candidates, regular_size);
        if mono.is_none() {
            warn!(
                tried = mono_candidates.len(),
                "no monospace font found, falling back to the built-in bitmap font"
            );
        }
        let wide = first_usable(&wide_candidates, regular_size);
        if wide.is_none() {
            warn!(
                tried = wide_candidates.len(),
                "no wide (CJK) font found, wide glyphs use the primary face"
            );
        }

        let mut set = Self::builtin(regular_size, small_size);
        if let Some(face) = &mono {
            set.cell_width = face.advance('M', regular_size);
        }
        set.mono = mono;
        set.wide = wide;
        set
    }

    pub fn builtin(regular_size: u32, small_size: u32) -> Self {
        let regular_bitmap = BitmapFace::for_size(regular_size);
        Self {
            mono: None,
            wide: None,
            regular_size,
            small_size,
            regular_bitmap,
            small_bitmap: BitmapFace::for_size(small_size),
            cell_width: regular_bitmap.cell_width,
        }
    }

    /// Horizontal advance of one character in the regular face.
    pub fn cell_width(&self) -> u32 {
        self.cell_width
    }

    pub fn describe(&self) -> String {
        let label = |face: &Option<OutlineFace>| {
            face.as_ref()
                .map_or_else(|| "built-in 8x8".to_owned(), |face| face.label.clone())
        };
        format!("mono={} wide={}", label(&self.mono), label(&self.wide))
    }

    /// Draws `text` with its top at `y`; returns the x after the last
    /// character. Regular text advances by `cell_width` per character.
    pub fn draw_text(
        &mut self,
        canvas: &mut Canvas,
        x: i32,
        y: i32,
        text: &str,
        color: Rgb,
        face: Face,
    ) -> i32 {
        let (size, bitmap) = match face {
            Face::Regular => (self.regular_size, self.regular_bitmap),
            Face::Small => (self.small_size, self.small_bitmap),
        };
        let mut pen = x;
        for ch in text.chars() {
            let advance = match face {
                Face::Regular => self.cell_width,
                Face::Small => match &self.mono {
                    Some(mono) => mono.advance(ch, size),
                    None => bitmap.cell_width,
                },
            };
            if !ch.is_whitespace() {
                if let Some(mono) = self.mono.as_mut().filter(|mono| mono.has_glyph(ch)) {
                    mono.draw(canvas, pen, y, ch, size, color);
                } else if let Some(wide) = self.wide.as_mut().filter(|wide| wide.has_glyph(ch)) {
                    wide.draw(canvas, pen, y, ch, size, color);
                } else if bitmap.has_glyph(ch) {
                    bitmap.draw(canvas, pen, y, ch, color);
                }
            }
            pen += advance as i32;
        }
        pen
    }
}

fn candidates(configured: &[PathBuf], defaults: &[&str]) -> Vec<PathBuf> {
    if configured.is_empty() {
        defaults.iter().map(PathBuf::from).collect()
    } else {
        configured.to_vec()
    }
}

fn first_usable(candidates: &[PathBuf], size: u32) -> Option<OutlineFace> {
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match OutlineFace::load(path, size as f32) {
            Ok(face) => {
                debug!(font = %path.display(), "resolved font");
                return Some(face);
            }
            Err(error) => warn!("skipping font: {error:#}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgb = Rgb::new(0, 0, 0);
    const INK: Rgb = Rgb::new(255, 255, 255);

    fn ink_pixels(canvas: &Canvas) -> usize {
        canvas
            .pixels()
            .chunks_exact(4)
            .filter(|px| px[0] != 0)
            .count()
    }

    #[test]
    fn builtin_cell_width_follows_font_size() {
        let fonts = FontSet::builtin(64, 48);
        assert_eq!(fonts.cell_width(), 39);
        assert!(fonts.describe().contains("built-in"));
    }

    #[test]
    fn missing_candidates_fall_back_without_error() {
        let config = FontConfig {
            mono: vec![PathBuf::from("/nonexistent/mono.ttf")],
            wide: vec![PathBuf::from("/nonexistent/wide.ttc")],
            builtin_only: false,
        };
        let fonts = FontSet::resolve(&config, 32, 16);
        assert_eq!(fonts.cell_width(), FontSet::builtin(32, 16).cell_width());
    }

    #[test]
    fn unparseable_font_file_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bogus = temp.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").expect("write");
        let config = FontConfig {
            mono: vec![bogus],
            wide: Vec::new(),
            builtin_only: false,
        };
        let fonts = FontSet::resolve(&config, 32, 16);
        assert!(fonts.describe().starts_with("mono=built-in"));
    }

    #[test]
    fn draw_text_advances_one_cell_per_char_and_inks() {
        let mut fonts = FontSet::builtin(16, 8);
        let mut canvas = Canvas::new(200, 32, BG).expect("canvas");
        let end = fonts.draw_text(&mut canvas, 4, 4, "ls -la", INK, Face::Regular);
        assert_eq!(end, 4 + 6 * fonts.cell_width() as i32);
        assert!(ink_pixels(&canvas) > 0);
    }

    #[test]
    fn uncovered_characters_draw_nothing_but_still_advance() {
        let mut fonts = FontSet::builtin(16, 8);
        let mut canvas = Canvas::new(64, 32, BG).expect("canvas");
        let end = fonts.draw_text(&mut canvas, 0, 0, "木", INK, Face::Regular);
        assert_eq!(end, fonts.cell_width() as i32);
        assert_eq!(ink_pixels(&canvas), 0);
    }
}
