use anyhow::Result;

use crate::audio::AudioCue;
use crate::canvas::Canvas;
use crate::color::{breath_color, Rgb};
use crate::renderer::{Cursor, FrameView, ProgressOverlay, Renderer};
use crate::scene::{Beat, Flash, Line, Run, Scene};
use crate::schema::{CueKind, SpinnerStyle};
use crate::scroll::{ScrollFollower, ScrollGeometry};

pub const BRAILLE_SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Extra rows a progress beat scrolls into view for its overlay.
const OVERLAY_ROWS: f32 = 3.0;

/// One emitted tick. `canvas` is present only when the sink asked for
/// pixels and a renderer is attached.
pub struct CapturedFrame<'a> {
    pub index: u32,
    pub view: &'a FrameView<'a>,
    pub canvas: Option<&'a Canvas>,
}

pub trait FrameSink {
    /// Whether frame `index` needs rasterizing.
    fn wants_pixels(&self, _index: u32) -> bool {
        true
    }

    fn accept(&mut self, frame: CapturedFrame<'_>) -> Result<()>;
}

/// Counts frames without keeping or rasterizing them.
#[derive(Debug, Default)]
pub struct DiscardFrames {
    pub seen: u32,
}

impl FrameSink for DiscardFrames {
    fn wants_pixels(&self, _index: u32) -> bool {
        false
    }

    fn accept(&mut self, _frame: CapturedFrame<'_>) -> Result<()> {
        self.seen += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineOutcome {
    pub frame_count: u32,
    pub cues: Vec<AudioCue>,
}

impl TimelineOutcome {
    pub fn cue_count(&self, kind: CueKind) -> usize {
        self.cues.iter().filter(|cue| cue.kind == kind).count()
    }
}

/// Parameters of a `type` beat.
#[derive(Debug, Clone, Copy)]
pub struct TypeOptions {
    pub prompt: bool,
    pub speed: u32,
    pub commit: bool,
    pub enter: bool,
}

/// A single scripted session: line buffer, scroll offset, tick counter and
/// cue list. Every beat pushes its frames into the sink as it goes.
pub struct Timeline<'a, S: FrameSink> {
    scene: &'a Scene,
    renderer: Option<Renderer>,
    canvas: Option<Canvas>,
    sink: S,
    lines: Vec<Line>,
    geometry: ScrollGeometry,
    scroll: ScrollFollower,
    frame_count: u32,
    cues: Vec<AudioCue>,
}

impl<'a, S: FrameSink> Timeline<'a, S> {
    pub fn new(scene: &'a Scene, renderer: Renderer, sink: S) -> Self {
        let mut timeline = Self::without_renderer(scene, sink);
        timeline.renderer = Some(renderer);
        timeline
    }

    /// A session that tracks frames and cues but never rasterizes.
    pub fn without_renderer(scene: &'a Scene, sink: S) -> Self {
        Self {
            scene,
            renderer: None,
            canvas: None,
            sink,
            lines: Vec::new(),
            geometry: ScrollGeometry::from_environment(&scene.environment),
            scroll: ScrollFollower::new(scene.environment.scroll_smoothing),
            frame_count: 0,
            cues: Vec::new(),
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn cues(&self) -> &[AudioCue] {
        &self.cues
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll.offset()
    }

    pub fn play(&mut self, beats: &[Beat]) -> Result<()> {
        for beat in beats {
            let before = self.frame_count;
            self.play_beat(beat)?;
            tracing::trace!(
                beat = beat.kind_name(),
                frames = self.frame_count - before,
                "beat played"
            );
        }
        Ok(())
    }

    pub fn play_beat(&mut self, beat: &Beat) -> Result<()> {
        match beat {
            Beat::Type {
                runs,
                prompt,
                speed,
                commit,
                enter,
            } => self.type_runs(
                runs,
                TypeOptions {
                    prompt: *prompt,
                    speed: *speed,
                    commit: *commit,
                    enter: *enter,
                },
            ),
            Beat::Pause {
                ticks,
                prompt,
                blink,
            } => self.pause(*ticks, *prompt, *blink),
            Beat::Output {
                lines,
                delay,
                flash,
            } => {
                self.reveal(lines, *delay)?;
                match flash {
                    Some(flash) => self.flash(flash),
                    None => Ok(()),
                }
            }
            Beat::Progress {
                status,
                ticks,
                from,
                to,
                highlight_prompts,
            } => self.progress(status, *ticks, *from, *to, *highlight_prompts),
            Beat::Blink {
                suffix,
                cycles,
                on,
                off,
            } => self.blink_suffix(suffix, *cycles, *on, *off),
            Beat::Breathe { ticks } => self.breathe(*ticks),
            Beat::Line { runs } => {
                self.push_line(runs.clone());
                Ok(())
            }
            Beat::Blank { count } => {
                for _ in 0..*count {
                    self.push_line(Vec::new());
                }
                Ok(())
            }
            Beat::Signoff => {
                self.push_line(vec![Run::new(
                    self.scene.prompt.icon.clone(),
                    self.scene.prompt.color,
                )]);
                Ok(())
            }
            Beat::Cue { sound } => {
                self.cue(*sound);
                Ok(())
            }
        }
    }

    /// Types the concatenated run text one character per step, then
    /// commits the runs as a line.
    pub fn type_runs(&mut self, runs: &[Run], options: TypeOptions) -> Result<()> {
        let Some(first) = runs.first() else {
            return Ok(());
        };
        let color = first.color;
        let text = runs.iter().map(|run| run.text.as_str()).collect::<String>();
        let speed = options.speed.max(1) as usize;
        let keystroke_every = self.scene.audio.keystroke_every as usize;
        let prefix = options.prompt.then(|| self.scene.prompt.run());

        let mut partial = String::with_capacity(text.len());
        for (i, ch) in text.chars().enumerate() {
            partial.push(ch);
            let target = self.geometry.target(self.lines.len() + 1);
            self.scroll.advance(target);
            if i % speed != 0 {
                continue;
            }
            if keystroke_every > 0 && i % keystroke_every == 0 {
                self.cue(CueKind::Keystroke);
            }
            let mut cursor_runs = Vec::with_capacity(2);
            cursor_runs.extend(prefix.clone());
            cursor_runs.push(Run::new(partial.clone(), color));
            self.emit(
                Some(Cursor {
                    runs: cursor_runs,
                    visible: true,
                }),
                None,
                None,
            )?;
        }

        if options.commit {
            let mut line = Vec::with_capacity(runs.len() + 1);
            line.extend(prefix);
            line.extend(runs.iter().cloned());
            self.push_line(line);
            if options.enter {
                self.cue(CueKind::Enter);
            }
        }
        Ok(())
    }

    /// Holds the frame with a cursor; it blinks every `blink_interval` ticks.
    pub fn pause(&mut self, ticks: u32, prompt: bool, blink: bool) -> Result<()> {
        let interval = self.scene.environment.blink_interval.max(1);
        for i in 0..ticks {
            self.follow_buffer(0.0);
            let visible = !blink || (i / interval) % 2 == 0;
            let runs = if prompt {
                vec![self.scene.prompt.run()]
            } else {
                Vec::new()
            };
            self.emit(Some(Cursor { runs, visible }), None, None)?;
        }
        Ok(())
    }

    /// Appends lines one at a time, holding `delay` frames after each.
    pub fn reveal(&mut self, lines: &[Line], delay: u32) -> Result<()> {
        for line in lines {
            self.push_line(line.clone());
            for _ in 0..delay {
                self.follow_buffer(0.0);
                self.emit(None, None, None)?;
            }
        }
        Ok(())
    }

    pub fn flash(&mut self, flash: &Flash) -> Result<()> {
        if flash.chime {
            self.cue(CueKind::Chime);
        }
        let span = flash.ticks.saturating_sub(1).max(1) as f32;
        for i in 0..flash.ticks {
            self.follow_buffer(0.0);
            let highlight = flash
                .colors
                .map(|(from, to)| from.lerp(to, i as f32 / span));
            self.emit(None, None, highlight)?;
        }
        Ok(())
    }

    pub fn progress(
        &mut self,
        status: &str,
        ticks: u32,
        from: f32,
        to: f32,
        highlight_prompts: bool,
    ) -> Result<()> {
        let span = ticks.saturating_sub(1).max(1) as f32;
        let line_height = self.geometry.line_height;
        for i in 0..ticks {
            let progress = from + (to - from) * (i as f32 / span);
            let cycle = &self.scene.theme.cycle;
            let cycle_color = cycle[i as usize % cycle.len()];
            let overlay = self.spinner_overlay(i, status, progress, cycle_color);
            self.follow_buffer(line_height * OVERLAY_ROWS);
            let highlight = highlight_prompts.then_some(cycle_color);
            self.emit(None, Some(overlay), highlight)?;
        }
        Ok(())
    }

    fn spinner_overlay(&self, tick: u32, status: &str, progress: f32, cycle_color: Rgb) -> ProgressOverlay {
        let prompt = &self.scene.prompt;
        let (glyph, color) = match prompt.spinner {
            SpinnerStyle::Icon => (prompt.icon.clone(), cycle_color),
            SpinnerStyle::Braille => (
                BRAILLE_SPINNER[tick as usize % BRAILLE_SPINNER.len()].to_owned(),
                prompt.color,
            ),
        };
        ProgressOverlay {
            glyph,
            glyph_color: color,
            status: status.to_owned(),
            progress,
            bar_color: color,
        }
    }

    /// Toggles `suffix` on the last line `cycles` times, then leaves it on.
    pub fn blink_suffix(&mut self, suffix: &Run, cycles: u32, on: u32, off: u32) -> Result<()> {
        if self.lines.is_empty() {
            self.push_line(Vec::new());
        }
        let last = self.lines.len() - 1;
        let base = self.lines[last].clone();
        let mut with_suffix = base.clone();
        with_suffix.push(suffix.clone());

        for _ in 0..cycles {
            self.lines[last] = with_suffix.clone();
            for _ in 0..on {
                self.follow_buffer(0.0);
                self.emit(None, None, None)?;
            }
            self.lines[last] = base.clone();
            for _ in 0..off {
                self.follow_buffer(0.0);
                self.emit(None, None, None)?;
            }
        }
        self.lines[last] = with_suffix;
        Ok(())
    }

    pub fn breathe(&mut self, ticks: u32) -> Result<()> {
        let breath = self.scene.breath;
        for i in 0..ticks {
            self.follow_buffer(0.0);
            let color = breath_color(breath.low, breath.high, i, breath.speed);
            self.emit(None, None, Some(color))?;
        }
        Ok(())
    }

    pub fn push_line(&mut self, line: Line) {
        self.lines.push(line);
    }

    /// Records `kind` at the index of the next frame.
    pub fn cue(&mut self, kind: CueKind) {
        self.cues.push(AudioCue {
            frame: self.frame_count,
            kind,
        });
    }

    pub fn finish(self) -> (S, TimelineOutcome) {
        (
            self.sink,
            TimelineOutcome {
                frame_count: self.frame_count,
                cues: self.cues,
            },
        )
    }

    fn follow_buffer(&mut self, extra: f32) {
        let target = self.geometry.target(self.lines.len()) + extra;
        self.scroll.advance(target);
    }

    fn emit(
        &mut self,
        cursor: Option<Cursor>,
        overlay: Option<ProgressOverlay>,
        highlight: Option<Rgb>,
    ) -> Result<()> {
        let index = self.frame_count;
        let view = FrameView {
            lines: &self.lines,
            scroll: self.scroll.offset(),
            cursor,
            overlay,
            highlight,
        };

        let canvas = match self.renderer.as_mut() {
            Some(renderer) if self.sink.wants_pixels(index) => {
                let env = &self.scene.environment;
                let canvas = match self.canvas.take() {
                    Some(canvas) => canvas,
                    None => Canvas::new(
                        env.resolution.width,
                        env.resolution.height,
                        self.scene.theme.background,
                    )?,
                };
                let canvas = self.canvas.insert(canvas);
                renderer.render_into(&view, canvas);
                Some(&*canvas)
            }
            _ => None,
        };

        self.sink.accept(CapturedFrame {
            index,
            view: &view,
            canvas,
        })?;
        self.frame_count += 1;
        Ok(())
    }
}

/// Plays a whole scene into `sink`. Without a renderer nothing is
/// rasterized.
pub fn play_scene<S: FrameSink>(
    scene: &Scene,
    renderer: Option<Renderer>,
    sink: S,
) -> Result<(S, TimelineOutcome)> {
    let mut timeline = match renderer {
        Some(renderer) => Timeline::new(scene, renderer, sink),
        None => Timeline::without_renderer(scene, sink),
    };
    timeline.play(&scene.beats)?;
    Ok(timeline.finish())
}
