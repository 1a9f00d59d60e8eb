use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Raw scene document as written in YAML. Colors are still unresolved
/// references here; `scene::compile_scene` turns this into a `Scene`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub theme: ThemeFile,
    #[serde(default)]
    pub prompt: PromptFile,
    #[serde(default)]
    pub highlight: HighlightTarget,
    #[serde(default)]
    pub breath: BreathFile,
    #[serde(default)]
    pub fonts: FontConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub beats: Vec<BeatFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarGeometry {
    pub width: u32,
    pub height: u32,
    pub radius: u32,
}

impl Default for BarGeometry {
    fn default() -> Self {
        Self {
            width: 880,
            height: 36,
            radius: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Environment {
    pub resolution: Resolution,
    pub fps: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub title_bar_height: u32,
    pub line_height: u32,
    pub font_size: u32,
    pub scroll_smoothing: f32,
    pub blink_interval: u32,
    pub bar: BarGeometry,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            resolution: Resolution {
                width: 3840,
                height: 2160,
            },
            fps: 24,
            pad_x: 112,
            pad_y: 80,
            title_bar_height: 96,
            line_height: 92,
            font_size: 64,
            scroll_smoothing: 0.15,
            blink_interval: 12,
            bar: BarGeometry::default(),
        }
    }
}

impl Environment {
    pub fn validate(&self) -> Result<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            bail!(
                "resolution must be positive, got {}x{}",
                self.resolution.width,
                self.resolution.height
            );
        }

        if self.fps == 0 {
            bail!("fps must be > 0");
        }

        if self.line_height == 0 {
            bail!("line_height must be > 0");
        }

        if self.font_size < 17 {
            bail!(
                "font_size must be at least 17 so the small face stays positive, got {}",
                self.font_size
            );
        }

        if self.blink_interval == 0 {
            bail!("blink_interval must be > 0");
        }

        if !(self.scroll_smoothing > 0.0 && self.scroll_smoothing <= 1.0) {
            bail!(
                "scroll_smoothing must be in (0, 1], got {}",
                self.scroll_smoothing
            );
        }

        if self.title_bar_height >= self.resolution.height {
            bail!(
                "title_bar_height {} must be smaller than the frame height {}",
                self.title_bar_height,
                self.resolution.height
            );
        }

        Ok(())
    }

    pub fn ticks(&self, duration: Duration) -> u32 {
        match duration {
            Duration::Seconds(seconds) => {
                let frames = (seconds * self.fps as f32).ceil();
                frames.max(0.0) as u32
            }
            Duration::Frames { frames } => frames,
        }
    }

    pub fn small_font_size(&self) -> u32 {
        self.font_size.saturating_sub(16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Duration {
    Seconds(f32),
    Frames { frames: u32 },
}

impl Duration {
    pub fn validate(&self, field: &str) -> Result<()> {
        if let Duration::Seconds(seconds) = self {
            if !seconds.is_finite() || *seconds < 0.0 {
                bail!("{field} must be a non-negative number of seconds, got {seconds}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThemeFile {
    pub background: String,
    pub title_bar: String,
    pub cursor: String,
    pub status: String,
    pub bar_track: String,
    pub dots: Vec<String>,
    pub cycle: Vec<String>,
    pub palette: BTreeMap<String, String>,
}

impl Default for ThemeFile {
    fn default() -> Self {
        Self {
            background: "#0d0d0f".to_owned(),
            title_bar: "#1e1e22".to_owned(),
            cursor: "primary".to_owned(),
            status: "dim".to_owned(),
            bar_track: "#282830".to_owned(),
            dots: vec![
                "#ff5f56".to_owned(),
                "#ffbd2e".to_owned(),
                "#27c93f".to_owned(),
            ],
            cycle: vec![
                "primary".to_owned(),
                "green".to_owned(),
                "cyan".to_owned(),
                "yellow".to_owned(),
            ],
            palette: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinnerStyle {
    #[default]
    Icon,
    Braille,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptFile {
    pub icon: String,
    pub color: String,
    pub spinner: SpinnerStyle,
}

impl Default for PromptFile {
    fn default() -> Self {
        Self {
            icon: "木".to_owned(),
            color: "primary".to_owned(),
            spinner: SpinnerStyle::Icon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightTarget {
    /// Only a line holding nothing but the prompt icon.
    #[default]
    Signoff,
    /// Every prompt run, the signoff included.
    Prompts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreathFile {
    pub low: String,
    pub high: String,
    pub speed: f32,
}

impl Default for BreathFile {
    fn default() -> Self {
        Self {
            low: "#321419".to_owned(),
            high: "primary".to_owned(),
            speed: 0.18,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    /// Candidate files for the primary monospace face, tried in order.
    pub mono: Vec<PathBuf>,
    /// Candidate files for the wide (CJK) fallback face.
    pub wide: Vec<PathBuf>,
    /// Skip font discovery and draw with the built-in bitmap font.
    pub builtin_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickPreset {
    #[default]
    Soft,
    Crisp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    pub enabled: bool,
    pub sample_rate: u32,
    pub click: ClickPreset,
    /// Record a keystroke cue on every n-th typed character; 0 disables clicks.
    pub keystroke_every: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44_100,
            click: ClickPreset::Soft,
            keystroke_every: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub codec: String,
    pub pixel_format: String,
    pub crf: u8,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_owned(),
            pixel_format: "yuv420p".to_owned(),
            crf: 12,
            preset: "slow".to_owned(),
            audio_codec: "aac".to_owned(),
            audio_bitrate: "128k".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CueKind {
    Keystroke,
    Enter,
    Chime,
    Tok,
    Bell,
}

impl CueKind {
    pub const ALL: [CueKind; 5] = [
        CueKind::Keystroke,
        CueKind::Enter,
        CueKind::Chime,
        CueKind::Tok,
        CueKind::Bell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CueKind::Keystroke => "keystroke",
            CueKind::Enter => "enter",
            CueKind::Chime => "chime",
            CueKind::Tok => "tok",
            CueKind::Bell => "bell",
        }
    }
}

/// `["text", color]` in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunFile(pub String, pub String);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashFile {
    #[serde(default = "default_flash_duration")]
    pub duration: Duration,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default = "default_true")]
    pub chime: bool,
}

impl Default for FlashFile {
    fn default() -> Self {
        Self {
            duration: default_flash_duration(),
            from: None,
            to: None,
            chime: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum BeatFile {
    Type {
        runs: Vec<RunFile>,
        #[serde(default = "default_true")]
        prompt: bool,
        #[serde(default = "default_speed")]
        speed: u32,
        #[serde(default = "default_true")]
        commit: bool,
        #[serde(default)]
        enter: bool,
    },
    Pause {
        duration: Duration,
        #[serde(default)]
        prompt: bool,
        #[serde(default = "default_true")]
        blink: bool,
    },
    Output {
        lines: Vec<Vec<RunFile>>,
        #[serde(default = "default_delay")]
        delay: u32,
        #[serde(default)]
        flash: Option<FlashFile>,
    },
    Progress {
        status: String,
        duration: Duration,
        #[serde(default)]
        from: f32,
        #[serde(default = "default_progress_end")]
        to: f32,
        #[serde(default)]
        highlight_prompts: bool,
    },
    Blink {
        suffix: RunFile,
        #[serde(default = "default_blink_cycles")]
        cycles: u32,
        #[serde(default = "default_blink_on")]
        on: u32,
        #[serde(default = "default_blink_off")]
        off: u32,
    },
    Breathe {
        duration: Duration,
    },
    Line {
        #[serde(default)]
        runs: Vec<RunFile>,
    },
    Blank {
        #[serde(default = "default_blank_count")]
        count: u32,
    },
    /// A line holding only the prompt icon, the default highlight target.
    Signoff,
    Cue {
        sound: CueKind,
    },
}

impl BeatFile {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BeatFile::Type { .. } => "type",
            BeatFile::Pause { .. } => "pause",
            BeatFile::Output { .. } => "output",
            BeatFile::Progress { .. } => "progress",
            BeatFile::Blink { .. } => "blink",
            BeatFile::Breathe { .. } => "breathe",
            BeatFile::Line { .. } => "line",
            BeatFile::Blank { .. } => "blank",
            BeatFile::Signoff => "signoff",
            BeatFile::Cue { .. } => "cue",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_speed() -> u32 {
    1
}

fn default_delay() -> u32 {
    3
}

fn default_progress_end() -> f32 {
    1.0
}

fn default_blink_cycles() -> u32 {
    3
}

fn default_blink_on() -> u32 {
    5
}

fn default_blink_off() -> u32 {
    4
}

fn default_blank_count() -> u32 {
    1
}

fn default_flash_duration() -> Duration {
    Duration::Frames { frames: 6 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_zen_geometry() {
        let scene: SceneFile = serde_yaml::from_str("beats: []").expect("parse");
        assert_eq!(scene.environment.resolution.width, 3840);
        assert_eq!(scene.environment.line_height, 92);
        assert_eq!(scene.environment.bar, BarGeometry::default());
        assert_eq!(scene.prompt.icon, "木");
        assert_eq!(scene.highlight, HighlightTarget::Signoff);
    }

    #[test]
    fn durations_accept_seconds_and_frames() {
        let env = Environment::default();
        assert_eq!(env.ticks(Duration::Seconds(0.5)), 12);
        assert_eq!(env.ticks(Duration::Seconds(0.01)), 1);
        assert_eq!(env.ticks(Duration::Frames { frames: 8 }), 8);
        assert_eq!(env.ticks(Duration::Seconds(0.0)), 0);
    }

    #[test]
    fn beats_are_tagged_by_kind() {
        let yaml = r#"
- kind: type
  runs: [["ls -la", primary]]
  speed: 2
- kind: pause
  duration: { frames: 8 }
  blink: false
- kind: signoff
- kind: cue
  sound: tok
"#;
        let beats: Vec<BeatFile> = serde_yaml::from_str(yaml).expect("parse beats");
        assert_eq!(beats.len(), 4);
        match &beats[0] {
            BeatFile::Type {
                runs,
                prompt,
                speed,
                commit,
                enter,
            } => {
                assert_eq!(runs[0], RunFile("ls -la".to_owned(), "primary".to_owned()));
                assert!(*prompt);
                assert_eq!(*speed, 2);
                assert!(*commit);
                assert!(!*enter);
            }
            other => panic!("unexpected beat {other:?}"),
        }
        assert!(matches!(
            beats[1],
            BeatFile::Pause {
                duration: Duration::Frames { frames: 8 },
                prompt: false,
                blink: false
            }
        ));
        assert!(matches!(beats[2], BeatFile::Signoff));
        assert!(matches!(
            beats[3],
            BeatFile::Cue {
                sound: CueKind::Tok
            }
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "- kind: pause\n  duration: 1\n  wobble: true\n";
        let error = serde_yaml::from_str::<Vec<BeatFile>>(yaml).expect_err("must reject");
        assert!(error.to_string().contains("wobble"), "{error}");
    }

    #[test]
    fn environment_validation_rejects_zero_fps() {
        let env = Environment {
            fps: 0,
            ..Environment::default()
        };
        assert!(env.validate().is_err());
        assert!(Environment::default().validate().is_ok());
    }
}
