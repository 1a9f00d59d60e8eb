use anyhow::Result;

use crate::canvas::Canvas;
use crate::color::Rgb;
use crate::fonts::{Face, FontSet};
use crate::scene::{Line, Run, Scene, Theme};
use crate::schema::{Environment, HighlightTarget};

const DOT_RADIUS: f32 = 14.0;
const DOT_SPACING: f32 = 48.0;
const PERCENT_GAP: i32 = 32;
const MIN_VISIBLE_FILL: u32 = 10;

/// The in-progress input line drawn below the committed buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub runs: Vec<Run>,
    pub visible: bool,
}

/// Spinner status row plus progress bar, drawn below the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOverlay {
    pub glyph: String,
    pub glyph_color: Rgb,
    pub status: String,
    pub progress: f32,
    pub bar_color: Rgb,
}

impl ProgressOverlay {
    pub fn percent(&self) -> u32 {
        (self.progress.clamp(0.0, 1.0) * 100.0) as u32
    }
}

/// Everything one frame shows. The renderer turns it into pixels; sinks
/// that never rasterize inspect it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView<'a> {
    pub lines: &'a [Line],
    pub scroll: f32,
    pub cursor: Option<Cursor>,
    pub overlay: Option<ProgressOverlay>,
    pub highlight: Option<Rgb>,
}

/// Width of the filled part of a progress bar.
pub fn bar_fill_width(progress: f32, bar_width: u32) -> u32 {
    (bar_width as f32 * progress.clamp(0.0, 1.0)) as u32
}

pub struct Renderer {
    environment: Environment,
    theme: Theme,
    prompt_icon: String,
    prompt_run: String,
    highlight_target: HighlightTarget,
    fonts: FontSet,
}

impl Renderer {
    pub fn new(scene: &Scene) -> Self {
        let environment = scene.environment;
        let fonts = FontSet::resolve(
            &scene.fonts,
            environment.font_size,
            environment.small_font_size(),
        );
        Self::with_fonts(scene, fonts)
    }

    pub fn with_fonts(scene: &Scene, fonts: FontSet) -> Self {
        Self {
            environment: scene.environment,
            theme: scene.theme.clone(),
            prompt_icon: scene.prompt.icon.clone(),
            prompt_run: scene.prompt.run_text(),
            highlight_target: scene.highlight,
            fonts,
        }
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    pub fn cell_width(&self) -> u32 {
        self.fonts.cell_width()
    }

    pub fn render(&mut self, view: &FrameView<'_>) -> Result<Canvas> {
        let mut canvas = Canvas::new(
            self.environment.resolution.width,
            self.environment.resolution.height,
            self.theme.background,
        )?;
        self.render_into(view, &mut canvas);
        Ok(canvas)
    }

    /// Redraws `canvas` from scratch for `view`.
    pub fn render_into(&mut self, view: &FrameView<'_>, canvas: &mut Canvas) {
        let env = self.environment;
        let line_height = env.line_height as i32;
        let title_bar = env.title_bar_height as i32;
        let height = canvas.height() as i32;
        let cell = self.cell_width() as i32;

        canvas.clear(self.theme.background);

        let base_y = title_bar + env.pad_y as i32 - view.scroll.floor() as i32;
        let row_y = |row: usize| base_y + row as i32 * line_height;

        for (idx, line) in view.lines.iter().enumerate() {
            let y = row_y(idx);
            if y < title_bar - line_height || y > height {
                continue;
            }
            let signoff = self.is_signoff(line);
            let mut x = env.pad_x as i32;
            for run in line {
                let color = match view.highlight {
                    Some(highlight) if self.highlight_applies(signoff, run) => highlight,
                    _ => run.color,
                };
                x = self
                    .fonts
                    .draw_text(canvas, x, y, &run.text, color, Face::Regular);
            }
        }

        if let Some(cursor) = view.cursor.as_ref().filter(|cursor| cursor.visible) {
            let y = row_y(view.lines.len());
            if y >= title_bar && y <= height {
                let mut x = env.pad_x as i32;
                for run in &cursor.runs {
                    let color = match view.highlight {
                        Some(highlight) if self.highlight_applies(false, run) => highlight,
                        _ => run.color,
                    };
                    x = self
                        .fonts
                        .draw_text(canvas, x, y, &run.text, color, Face::Regular);
                }
                canvas.fill_rect(
                    x,
                    y + 8,
                    (cell - 7).max(1) as u32,
                    (line_height - 23).max(1) as u32,
                    self.theme.cursor,
                );
            }
        }

        if let Some(overlay) = &view.overlay {
            self.draw_overlay(canvas, overlay, row_y(view.lines.len()), row_y(view.lines.len() + 1));
        }

        self.draw_title_bar(canvas);
    }

    fn draw_overlay(&mut self, canvas: &mut Canvas, overlay: &ProgressOverlay, status_y: i32, bar_row_y: i32) {
        let env = self.environment;
        let title_bar = env.title_bar_height as i32;
        let height = canvas.height() as i32;
        let cell = self.cell_width() as i32;
        let x = env.pad_x as i32 + 2 * cell;

        if status_y >= title_bar && status_y <= height {
            let glyph = format!("{} ", overlay.glyph);
            self.fonts
                .draw_text(canvas, x, status_y, &glyph, overlay.glyph_color, Face::Regular);
            self.fonts.draw_text(
                canvas,
                x + 2 * cell,
                status_y,
                &overlay.status,
                self.theme.status,
                Face::Regular,
            );
        }

        if bar_row_y >= title_bar && bar_row_y <= height {
            let bar = env.bar;
            let bar_x = x as f32;
            let bar_y = (bar_row_y + (env.line_height as i32 - bar.height as i32) / 2) as f32;
            let radius = bar.radius as f32;
            canvas.fill_rounded_rect(
                bar_x,
                bar_y,
                bar_x + bar.width as f32,
                bar_y + bar.height as f32,
                radius,
                self.theme.bar_track,
            );
            let fill = bar_fill_width(overlay.progress, bar.width);
            if fill > MIN_VISIBLE_FILL {
                canvas.fill_rounded_rect(
                    bar_x,
                    bar_y,
                    bar_x + fill as f32,
                    bar_y + bar.height as f32,
                    radius,
                    overlay.bar_color,
                );
            }
            let percent = format!("{}%", overlay.percent());
            self.fonts.draw_text(
                canvas,
                x + bar.width as i32 + PERCENT_GAP,
                bar_row_y,
                &percent,
                self.theme.status,
                Face::Small,
            );
        }
    }

    fn draw_title_bar(&self, canvas: &mut Canvas) {
        let title_bar = self.environment.title_bar_height;
        canvas.fill_rect(0, 0, canvas.width(), title_bar, self.theme.title_bar);
        let dot_y = (title_bar / 2) as f32;
        for (i, color) in self.theme.dots.iter().enumerate() {
            let cx = DOT_SPACING + i as f32 * DOT_SPACING;
            canvas.fill_circle(cx, dot_y, DOT_RADIUS, *color);
        }
    }

    fn is_signoff(&self, line: &[Run]) -> bool {
        line.len() == 1 && line[0].text == self.prompt_icon
    }

    fn highlight_applies(&self, signoff: bool, run: &Run) -> bool {
        match self.highlight_target {
            HighlightTarget::Signoff => signoff,
            HighlightTarget::Prompts => signoff || run.text == self.prompt_run,
        }
    }
}
