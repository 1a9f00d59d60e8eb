use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;

use crate::color::{Palette, Rgb};
use crate::error_codes::{CodedError, SCENE_EMPTY, SCENE_INVALID, SCENE_PARSE};
use crate::schema::{
    AudioConfig, BeatFile, CueKind, EncodingConfig, Environment, FlashFile, FontConfig,
    HighlightTarget, RunFile, SceneFile, SpinnerStyle,
};

pub const DEFAULT_OUTPUT: &str = "teaser.mp4";

/// One colored span of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    pub text: String,
    pub color: Rgb,
}

impl Run {
    pub fn new(text: impl Into<String>, color: Rgb) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

pub type Line = Vec<Run>;

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub background: Rgb,
    pub title_bar: Rgb,
    pub cursor: Rgb,
    pub status: Rgb,
    pub bar_track: Rgb,
    pub dots: Vec<Rgb>,
    pub cycle: Vec<Rgb>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub icon: String,
    pub color: Rgb,
    pub spinner: SpinnerStyle,
}

impl Prompt {
    /// Text of the run that prefixes prompted lines.
    pub fn run_text(&self) -> String {
        format!("{} ", self.icon)
    }

    pub fn run(&self) -> Run {
        Run::new(self.run_text(), self.color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breath {
    pub low: Rgb,
    pub high: Rgb,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flash {
    pub ticks: u32,
    /// Highlight lerps `from -> to`; `None` holds the frame unchanged.
    pub colors: Option<(Rgb, Rgb)>,
    pub chime: bool,
}

/// A compiled beat: colors resolved and durations converted to ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Beat {
    Type {
        runs: Vec<Run>,
        prompt: bool,
        speed: u32,
        commit: bool,
        enter: bool,
    },
    Pause {
        ticks: u32,
        prompt: bool,
        blink: bool,
    },
    Output {
        lines: Vec<Line>,
        delay: u32,
        flash: Option<Flash>,
    },
    Progress {
        status: String,
        ticks: u32,
        from: f32,
        to: f32,
        highlight_prompts: bool,
    },
    Blink {
        suffix: Run,
        cycles: u32,
        on: u32,
        off: u32,
    },
    Breathe {
        ticks: u32,
    },
    Line {
        runs: Line,
    },
    Blank {
        count: u32,
    },
    Signoff,
    Cue {
        sound: CueKind,
    },
}

impl Beat {
    /// Number of frames this beat emits.
    pub fn ticks(&self) -> u32 {
        self.checked_ticks().unwrap_or(u32::MAX)
    }

    /// Like [`Beat::ticks`], but `None` when the count does not fit in a `u32`.
    pub fn checked_ticks(&self) -> Option<u32> {
        match self {
            Beat::Type { runs, speed, .. } => {
                let chars = runs.iter().map(|run| run.text.chars().count()).sum::<usize>();
                u32::try_from(chars.div_ceil((*speed).max(1) as usize)).ok()
            }
            Beat::Pause { ticks, .. } | Beat::Progress { ticks, .. } | Beat::Breathe { ticks } => {
                Some(*ticks)
            }
            Beat::Output {
                lines,
                delay,
                flash,
            } => u32::try_from(lines.len())
                .ok()?
                .checked_mul(*delay)?
                .checked_add(flash.as_ref().map_or(0, |flash| flash.ticks)),
            Beat::Blink { cycles, on, off, .. } => cycles.checked_mul(on.checked_add(*off)?),
            Beat::Line { .. } | Beat::Blank { .. } | Beat::Signoff | Beat::Cue { .. } => Some(0),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Beat::Type { .. } => "type",
            Beat::Pause { .. } => "pause",
            Beat::Output { .. } => "output",
            Beat::Progress { .. } => "progress",
            Beat::Blink { .. } => "blink",
            Beat::Breathe { .. } => "breathe",
            Beat::Line { .. } => "line",
            Beat::Blank { .. } => "blank",
            Beat::Signoff => "signoff",
            Beat::Cue { .. } => "cue",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub name: String,
    pub environment: Environment,
    pub theme: Theme,
    pub prompt: Prompt,
    pub highlight: HighlightTarget,
    pub breath: Breath,
    pub fonts: FontConfig,
    pub audio: AudioConfig,
    pub encoding: EncodingConfig,
    pub output: PathBuf,
    pub beats: Vec<Beat>,
}

impl Scene {
    pub fn total_ticks(&self) -> u32 {
        self.beats
            .iter()
            .fold(0_u32, |total, beat| total.saturating_add(beat.ticks()))
    }

    pub fn duration_seconds(&self) -> f64 {
        f64::from(self.total_ticks()) / f64::from(self.environment.fps)
    }
}

/// Scenes compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Bamboo toks, a temple bell, breathing signoff.
    Zen,
    /// Soft clicks, enter thuds and completion chimes.
    Soft,
    /// Crisp clicks with prompt highlighting.
    Crisp,
    /// Braille spinner, arrow prompt, silent.
    Classic,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Zen, Preset::Soft, Preset::Crisp, Preset::Classic];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Zen => "zen",
            Preset::Soft => "soft",
            Preset::Crisp => "crisp",
            Preset::Classic => "classic",
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            Preset::Zen => include_str!("../scenes/zen.yaml"),
            Preset::Soft => include_str!("../scenes/soft.yaml"),
            Preset::Crisp => include_str!("../scenes/crisp.yaml"),
            Preset::Classic => include_str!("../scenes/classic.yaml"),
        }
    }
}

pub fn load_preset(preset: Preset) -> Result<Scene> {
    parse_scene(preset.source(), &format!("preset '{}'", preset.name()), preset.name())
        .with_context(|| format!("bundled preset '{}' is invalid", preset.name()))
}

pub fn load_and_validate_scene(path: &Path) -> Result<Scene> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let fallback_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("scene");
    parse_scene(&contents, &path.display().to_string(), fallback_name)
}

/// Parses and compiles a scene document. `origin` names the source in
/// error messages.
pub fn parse_scene(contents: &str, origin: &str, fallback_name: &str) -> Result<Scene> {
    let file: SceneFile = serde_yaml::from_str(contents).map_err(|error| {
        let location = error.location();
        let at = location
            .as_ref()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        CodedError::new(
            SCENE_PARSE,
            format!("failed to parse yaml in {origin} at {at}: {error}"),
        )
        .with_details(json!({
            "origin": origin,
            "line": location.as_ref().map(|location| location.line()),
            "column": location.as_ref().map(|location| location.column()),
        }))
    })?;
    compile_scene(file, fallback_name)
}

pub fn compile_scene(file: SceneFile, fallback_name: &str) -> Result<Scene> {
    file.environment
        .validate()
        .map_err(|error| CodedError::new(SCENE_INVALID, format!("environment: {error}")))?;
    let environment = file.environment;

    if file.beats.is_empty() {
        return Err(CodedError::new(SCENE_EMPTY, "scene must define at least one beat").into());
    }

    let palette = Palette::with_overrides(&file.theme.palette)?;
    let resolve = |reference: &str, field: &str| {
        palette
            .resolve(reference)
            .with_context(|| format!("resolving {field}"))
    };

    if file.theme.cycle.is_empty() {
        return Err(invalid("theme.cycle must name at least one color"));
    }
    let theme = Theme {
        background: resolve(&file.theme.background, "theme.background")?,
        title_bar: resolve(&file.theme.title_bar, "theme.title_bar")?,
        cursor: resolve(&file.theme.cursor, "theme.cursor")?,
        status: resolve(&file.theme.status, "theme.status")?,
        bar_track: resolve(&file.theme.bar_track, "theme.bar_track")?,
        dots: file
            .theme
            .dots
            .iter()
            .map(|dot| resolve(dot, "theme.dots"))
            .collect::<Result<_>>()?,
        cycle: file
            .theme
            .cycle
            .iter()
            .map(|color| resolve(color, "theme.cycle"))
            .collect::<Result<_>>()?,
    };

    if file.prompt.icon.trim().is_empty() {
        return Err(invalid("prompt.icon cannot be empty"));
    }
    let prompt = Prompt {
        icon: file.prompt.icon.clone(),
        color: resolve(&file.prompt.color, "prompt.color")?,
        spinner: file.prompt.spinner,
    };

    if !file.breath.speed.is_finite() {
        return Err(invalid("breath.speed must be finite"));
    }
    let breath = Breath {
        low: resolve(&file.breath.low, "breath.low")?,
        high: resolve(&file.breath.high, "breath.high")?,
        speed: file.breath.speed,
    };

    if file.audio.sample_rate == 0 {
        return Err(invalid("audio.sample_rate must be > 0"));
    }

    let mut beats = Vec::with_capacity(file.beats.len());
    let mut total_ticks = 0_u32;
    for (index, beat) in file.beats.iter().enumerate() {
        let label = || format!("beat {} ({})", index + 1, beat.kind_name());
        let compiled = compile_beat(beat, &environment, &resolve).with_context(label)?;
        let ticks = compiled
            .checked_ticks()
            .ok_or_else(|| invalid(format!("{}: frame count overflows", label())))?;
        total_ticks = total_ticks.checked_add(ticks).ok_or_else(|| {
            invalid(format!(
                "{}: scene frame count overflows after {total_ticks} frames",
                label()
            ))
        })?;
        beats.push(compiled);
    }

    Ok(Scene {
        name: file.name.unwrap_or_else(|| fallback_name.to_owned()),
        environment,
        theme,
        prompt,
        highlight: file.highlight,
        breath,
        fonts: file.fonts,
        audio: file.audio,
        encoding: file.encoding,
        output: file.output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        beats,
    })
}

fn compile_beat(
    beat: &BeatFile,
    environment: &Environment,
    resolve: &dyn Fn(&str, &str) -> Result<Rgb>,
) -> Result<Beat> {
    let runs = |runs: &[RunFile]| -> Result<Line> {
        runs.iter()
            .map(|RunFile(text, color)| Ok(Run::new(text.clone(), resolve(color, "run color")?)))
            .collect()
    };

    let compiled = match beat {
        BeatFile::Type {
            runs: typed,
            prompt,
            speed,
            commit,
            enter,
        } => {
            if *speed == 0 {
                return Err(invalid("speed must be >= 1"));
            }
            Beat::Type {
                runs: runs(typed)?,
                prompt: *prompt,
                speed: *speed,
                commit: *commit,
                enter: *enter,
            }
        }
        BeatFile::Pause {
            duration,
            prompt,
            blink,
        } => {
            duration.validate("duration").map_err(|error| invalid(error.to_string()))?;
            Beat::Pause {
                ticks: environment.ticks(*duration),
                prompt: *prompt,
                blink: *blink,
            }
        }
        BeatFile::Output {
            lines,
            delay,
            flash,
        } => Beat::Output {
            lines: lines.iter().map(|line| runs(line)).collect::<Result<_>>()?,
            delay: *delay,
            flash: flash
                .as_ref()
                .map(|flash| compile_flash(flash, environment, resolve))
                .transpose()?,
        },
        BeatFile::Progress {
            status,
            duration,
            from,
            to,
            highlight_prompts,
        } => {
            duration.validate("duration").map_err(|error| invalid(error.to_string()))?;
            for (field, value) in [("from", *from), ("to", *to)] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(invalid(format!("{field} must be within [0, 1], got {value}")));
                }
            }
            Beat::Progress {
                status: status.clone(),
                ticks: environment.ticks(*duration),
                from: *from,
                to: *to,
                highlight_prompts: *highlight_prompts,
            }
        }
        BeatFile::Blink {
            suffix,
            cycles,
            on,
            off,
        } => Beat::Blink {
            suffix: Run::new(suffix.0.clone(), resolve(&suffix.1, "suffix color")?),
            cycles: *cycles,
            on: *on,
            off: *off,
        },
        BeatFile::Breathe { duration } => {
            duration.validate("duration").map_err(|error| invalid(error.to_string()))?;
            Beat::Breathe {
                ticks: environment.ticks(*duration),
            }
        }
        BeatFile::Line { runs: line } => Beat::Line { runs: runs(line)? },
        BeatFile::Blank { count } => Beat::Blank { count: *count },
        BeatFile::Signoff => Beat::Signoff,
        BeatFile::Cue { sound } => Beat::Cue { sound: *sound },
    };
    Ok(compiled)
}

fn compile_flash(
    flash: &FlashFile,
    environment: &Environment,
    resolve: &dyn Fn(&str, &str) -> Result<Rgb>,
) -> Result<Flash> {
    flash
        .duration
        .validate("flash.duration")
        .map_err(|error| invalid(error.to_string()))?;
    let colors = match (&flash.from, &flash.to) {
        (Some(from), Some(to)) => Some((resolve(from, "flash.from")?, resolve(to, "flash.to")?)),
        (None, None) => None,
        _ => return Err(invalid("flash needs both `from` and `to`, or neither")),
    };
    Ok(Flash {
        ticks: environment.ticks(flash.duration),
        colors,
        chime: flash.chime,
    })
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    CodedError::new(SCENE_INVALID, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{COMMENT, PRIMARY};
    use crate::error_codes::{find_coded_error, SCENE_UNKNOWN_COLOR};

    fn parse(yaml: &str) -> Result<Scene> {
        parse_scene(yaml, "test", "test")
    }

    fn code_of(result: Result<Scene>) -> &'static str {
        let error = result.expect_err("must fail");
        find_coded_error(&error).map(|coded| coded.code).unwrap_or("none")
    }

    #[test]
    fn every_preset_compiles() {
        for preset in Preset::ALL {
            let scene = load_preset(preset).expect("preset compiles");
            assert_eq!(scene.name, preset.name());
            assert!(scene.total_ticks() > 0, "{} is empty", preset.name());
        }
    }

    #[test]
    fn presets_keep_their_signature_settings() {
        let zen = load_preset(Preset::Zen).expect("zen");
        assert_eq!(zen.prompt.icon, "木");
        assert_eq!(zen.audio.keystroke_every, 0);
        let classic = load_preset(Preset::Classic).expect("classic");
        assert_eq!(classic.prompt.spinner, SpinnerStyle::Braille);
        assert!(!classic.audio.enabled);
        let crisp = load_preset(Preset::Crisp).expect("crisp");
        assert_eq!(crisp.highlight, HighlightTarget::Prompts);
    }

    #[test]
    fn compiles_runs_and_ticks() {
        let scene = parse(
            r##"
environment: { fps: 10 }
beats:
  - kind: type
    runs: [["# hello", comment]]
    speed: 2
  - kind: pause
    duration: 1.5
  - kind: output
    lines: [[["ok", "#00ff00"]], []]
    delay: 4
    flash: { duration: { frames: 6 }, from: white, to: primary }
  - kind: blink
    suffix: [" ;)", primary]
  - kind: blank
    count: 2
"##,
        )
        .expect("scene");
        assert_eq!(scene.output, PathBuf::from(DEFAULT_OUTPUT));
        match &scene.beats[0] {
            Beat::Type { runs, .. } => assert_eq!(runs[0], Run::new("# hello", COMMENT)),
            other => panic!("unexpected {other:?}"),
        }
        let ticks = scene.beats.iter().map(Beat::ticks).collect::<Vec<_>>();
        assert_eq!(ticks, vec![4, 15, 2 * 4 + 6, 27, 0]);
        assert_eq!(scene.total_ticks(), 4 + 15 + 14 + 27);
        match &scene.beats[3] {
            Beat::Blink { suffix, .. } => assert_eq!(suffix.color, PRIMARY),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_errors_report_location() {
        let error = parse("beats: [\n  - kind: type\n    runs: 7\n").expect_err("bad yaml");
        let coded = find_coded_error(&error).expect("coded");
        assert_eq!(coded.code, SCENE_PARSE);
        assert!(coded.message.contains("line"), "{}", coded.message);
        let details = coded.details.as_ref().expect("parse details");
        assert_eq!(details["origin"], "test");
        assert!(details["line"].as_u64().expect("line") >= 1);
        assert!(details["column"].is_u64());
    }

    #[test]
    fn empty_scene_is_rejected() {
        assert_eq!(code_of(parse("beats: []")), SCENE_EMPTY);
    }

    #[test]
    fn unknown_color_is_rejected() {
        let yaml = "beats:\n  - kind: line\n    runs: [[\"x\", mauve]]\n";
        assert_eq!(code_of(parse(yaml)), SCENE_UNKNOWN_COLOR);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_speed = "beats:\n  - kind: type\n    runs: [[\"x\", fg]]\n    speed: 0\n";
        assert_eq!(code_of(parse(zero_speed)), SCENE_INVALID);
        let bad_progress = "beats:\n  - kind: progress\n    status: s\n    duration: 1\n    to: 2.0\n";
        assert_eq!(code_of(parse(bad_progress)), SCENE_INVALID);
        let bad_env = "environment: { fps: 0 }\nbeats:\n  - kind: signoff\n";
        assert_eq!(code_of(parse(bad_env)), SCENE_INVALID);
        let half_flash = "beats:\n  - kind: output\n    lines: []\n    flash: { from: white }\n";
        assert_eq!(code_of(parse(half_flash)), SCENE_INVALID);
    }

    #[test]
    fn oversized_beats_are_rejected_instead_of_overflowing() {
        let long_blink =
            "beats:\n  - kind: blink\n    suffix: [\" ;)\", primary]\n    cycles: 1\n    on: 3000000000\n    off: 3000000000\n";
        let error = parse(long_blink).expect_err("blink overflows u32");
        let coded = find_coded_error(&error).expect("coded");
        assert_eq!(coded.code, SCENE_INVALID);
        assert!(coded.message.contains("beat 1 (blink)"), "{}", coded.message);

        let long_pauses = "beats:\n  - kind: pause\n    duration: { frames: 3000000000 }\n  - kind: pause\n    duration: { frames: 3000000000 }\n";
        let error = parse(long_pauses).expect_err("total overflows u32");
        let coded = find_coded_error(&error).expect("coded");
        assert_eq!(coded.code, SCENE_INVALID);
        assert!(coded.message.contains("beat 2 (pause)"), "{}", coded.message);
    }

    #[test]
    fn ticks_saturate_when_unchecked() {
        let blink = Beat::Blink {
            cycles: 2,
            on: u32::MAX,
            off: 1,
            suffix: Run::new(" ;)", PRIMARY),
        };
        assert_eq!(blink.checked_ticks(), None);
        assert_eq!(blink.ticks(), u32::MAX);
    }

    #[test]
    fn loads_scene_from_disk_with_file_stem_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("launch.yaml");
        fs::write(&path, "beats:\n  - kind: pause\n    duration: { frames: 3 }\n").expect("write");
        let scene = load_and_validate_scene(&path).expect("scene");
        assert_eq!(scene.name, "launch");
        assert_eq!(scene.total_ticks(), 3);
    }
}
