use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::audio;
use crate::encoding::{mux_args, sequence_encode_args, Encoder, FfmpegMode, PassOutcome};
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::schema::CueKind;
use crate::timeline::{play_scene, CapturedFrame, FrameSink, TimelineOutcome};

pub const FRAME_PATTERN: &str = "frame_%05d.png";
pub const AUDIO_FILE: &str = "audio.wav";
pub const SILENT_FILE: &str = "silent.mp4";

pub fn frame_file_name(index: u32) -> String {
    format!("frame_{index:05}.png")
}

/// Writes every frame as a numbered PNG and hashes the pixels as they go.
pub struct PngSequenceSink {
    dir: PathBuf,
    hasher: Sha256,
    written: u32,
    log_every: u32,
}

impl PngSequenceSink {
    pub fn new(dir: &Path, log_every: u32) -> Self {
        Self {
            dir: dir.to_path_buf(),
            hasher: Sha256::new(),
            written: 0,
            log_every: log_every.max(1),
        }
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    /// Hex SHA-256 of all frame pixels in order.
    pub fn finish_hash(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl FrameSink for PngSequenceSink {
    fn accept(&mut self, frame: CapturedFrame<'_>) -> Result<()> {
        let Some(canvas) = frame.canvas else {
            bail!("frame {} reached the PNG writer without pixels", frame.index);
        };
        canvas.save_png(&self.dir.join(frame_file_name(frame.index)))?;
        self.hasher.update(canvas.pixels());
        self.written += 1;
        if self.written % self.log_every == 0 {
            info!(frames = self.written, "rendered");
        }
        Ok(())
    }
}

/// Renders exactly one frame to a PNG file and skips rasterizing the rest.
pub struct SingleFrameSink {
    target: u32,
    output: PathBuf,
    found: bool,
}

impl SingleFrameSink {
    pub fn new(target: u32, output: &Path) -> Self {
        Self {
            target,
            output: output.to_path_buf(),
            found: false,
        }
    }

    pub fn found(&self) -> bool {
        self.found
    }
}

impl FrameSink for SingleFrameSink {
    fn wants_pixels(&self, index: u32) -> bool {
        index == self.target
    }

    fn accept(&mut self, frame: CapturedFrame<'_>) -> Result<()> {
        if let Some(canvas) = frame.canvas {
            canvas.save_png(&self.output)?;
            self.found = true;
        }
        Ok(())
    }
}

pub fn render_single_frame(scene: &Scene, index: u32, output: &Path) -> Result<u32> {
    let renderer = Renderer::new(scene);
    let (sink, outcome) = play_scene(scene, Some(renderer), SingleFrameSink::new(index, output))?;
    if !sink.found() {
        bail!(
            "frame {index} is out of range: scene '{}' has {} frames",
            scene.name,
            outcome.frame_count
        );
    }
    Ok(outcome.frame_count)
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output: PathBuf,
    pub audio: bool,
    pub keep_frames: Option<PathBuf>,
    pub ffmpeg_mode: FfmpegMode,
    pub ffmpeg_path: Option<PathBuf>,
    pub strict: bool,
    pub report: Option<PathBuf>,
}

impl ExportOptions {
    pub fn for_scene(scene: &Scene) -> Self {
        Self {
            output: scene.output.clone(),
            audio: scene.audio.enabled,
            keep_frames: None,
            ffmpeg_mode: FfmpegMode::Auto,
            ffmpeg_path: None,
            strict: false,
            report: None,
        }
    }
}

pub fn cue_counts(outcome: &TimelineOutcome) -> BTreeMap<CueKind, usize> {
    let mut counts = BTreeMap::new();
    for cue in &outcome.cues {
        *counts.entry(cue.kind).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderSummary {
    pub scene: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u32,
    pub duration_seconds: f64,
    pub cue_counts: BTreeMap<CueKind, usize>,
    pub audio_samples: Option<usize>,
    pub frames_sha256: String,
    pub passes: Vec<PassOutcome>,
    pub output: PathBuf,
    pub output_bytes: u64,
}

impl RenderSummary {
    pub fn succeeded(&self) -> bool {
        self.passes.iter().all(|pass| pass.success)
    }

    pub fn print(&self) {
        println!(
            "Generated {} frames at {}fps = {:.1}s",
            self.frame_count, self.fps, self.duration_seconds
        );
        if self.cue_counts.is_empty() {
            println!("Audio: none");
        } else {
            let cues = self
                .cue_counts
                .iter()
                .map(|(kind, count)| format!("{count} {}", kind.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            match self.audio_samples {
                Some(samples) => println!("Audio: {cues} ({samples} samples)"),
                None => println!("Audio: {cues} (not mixed)"),
            }
        }
        println!(
            "MP4: {} ({}KB) - {}x{}",
            self.output.display(),
            self.output_bytes / 1024,
            self.width,
            self.height
        );
    }
}

#[derive(Debug, Serialize)]
struct RenderReport<'a> {
    #[serde(flatten)]
    summary: &'a RenderSummary,
    rendered_at: String,
    termreel_version: &'static str,
}

/// Renders `scene` to frames, mixes audio, encodes with ffmpeg and cleans
/// up. Encoder failures are logged and reported in the summary; with
/// `strict` they become an error once cleanup is done.
pub fn render_scene(scene: &Scene, options: &ExportOptions) -> Result<RenderSummary> {
    let env = scene.environment;
    let encoder = Encoder::resolve(options.ffmpeg_mode, options.ffmpeg_path.as_deref())?;

    let frame_dir = tempfile::Builder::new()
        .prefix("termreel_frames_")
        .tempdir()
        .context("failed to create temporary frame directory")?;
    debug!(dir = %frame_dir.path().display(), "frame directory");

    let renderer = Renderer::new(scene);
    info!(
        scene = %scene.name,
        frames = scene.total_ticks(),
        fonts = %renderer.fonts().describe(),
        "rendering"
    );
    let sink = PngSequenceSink::new(frame_dir.path(), env.fps);
    let (sink, outcome) = play_scene(scene, Some(renderer), sink)?;
    let frames_sha256 = sink.finish_hash();

    let audio_path = frame_dir.path().join(AUDIO_FILE);
    let audio_samples = if options.audio && !outcome.cues.is_empty() {
        let mixed = audio::mix(
            &outcome.cues,
            outcome.frame_count,
            env.fps,
            scene.audio.sample_rate,
            scene.audio.click,
        );
        let samples = audio::quantize(&mixed);
        audio::write_wav(&audio_path, scene.audio.sample_rate, &samples)?;
        info!(samples = samples.len(), cues = outcome.cues.len(), "mixed audio");
        Some(samples.len())
    } else {
        None
    };

    let pattern = frame_dir.path().join(FRAME_PATTERN);
    let mut passes = Vec::with_capacity(2);
    if audio_samples.is_some() {
        let silent = frame_dir.path().join(SILENT_FILE);
        passes.push(encoder.run_pass(
            "video",
            &sequence_encode_args(&scene.encoding, env.fps, &pattern, &silent, false),
        ));
        passes.push(encoder.run_pass(
            "mux",
            &mux_args(&scene.encoding, &silent, &audio_path, &options.output),
        ));
    } else {
        passes.push(encoder.run_pass(
            "video",
            &sequence_encode_args(&scene.encoding, env.fps, &pattern, &options.output, true),
        ));
    }

    if let Some(keep) = &options.keep_frames {
        copy_frames(frame_dir.path(), keep)?;
    }
    let frame_dir_path = frame_dir.path().to_path_buf();
    if let Err(error) = frame_dir.close() {
        warn!(dir = %frame_dir_path.display(), "failed to remove frame directory: {error}");
    }

    let output_bytes = fs::metadata(&options.output).map_or(0, |meta| meta.len());
    let summary = RenderSummary {
        scene: scene.name.clone(),
        width: env.resolution.width,
        height: env.resolution.height,
        fps: env.fps,
        frame_count: outcome.frame_count,
        duration_seconds: scene.duration_seconds(),
        cue_counts: cue_counts(&outcome),
        audio_samples,
        frames_sha256,
        passes,
        output: options.output.clone(),
        output_bytes,
    };

    if let Some(report) = &options.report {
        write_report(report, &summary)?;
    }

    if options.strict && !summary.succeeded() {
        let failed = summary
            .passes
            .iter()
            .filter(|pass| !pass.success)
            .map(|pass| format!("{} ({})", pass.label, pass.stderr_tail))
            .collect::<Vec<_>>()
            .join("; ");
        bail!("encoding failed: {failed}");
    }
    Ok(summary)
}

pub fn write_report(path: &Path, summary: &RenderSummary) -> Result<()> {
    let report = RenderReport {
        summary,
        rendered_at: Local::now().to_rfc3339(),
        termreel_version: env!("CARGO_PKG_VERSION"),
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialize render report")?;
    fs::write(path, json).with_context(|| format!("failed to write report {}", path.display()))
}

fn copy_frames(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)
        .with_context(|| format!("failed to create frame directory {}", to.display()))?;
    let mut copied = 0_usize;
    for entry in fs::read_dir(from).with_context(|| format!("failed to list {}", from.display()))? {
        let entry = entry.with_context(|| format!("failed reading entries of {}", from.display()))?;
        if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
            continue;
        }
        let target = to.join(entry.file_name());
        fs::copy(entry.path(), &target)
            .with_context(|| format!("failed to copy {}", entry.path().display()))?;
        copied += 1;
    }
    info!(files = copied, dir = %to.display(), "kept frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::parse_scene;

    fn tiny_scene(extra: &str) -> Scene {
        let yaml = format!(
            r#"
environment:
  resolution: {{ width: 160, height: 120 }}
  font_size: 20
  line_height: 24
  title_bar_height: 20
  pad_x: 8
  pad_y: 8
fonts: {{ builtin_only: true }}
{extra}
beats:
  - kind: type
    runs: [["ls", fg]]
  - kind: cue
    sound: tok
  - kind: pause
    duration: {{ frames: 3 }}
"#
        );
        parse_scene(&yaml, "test", "tiny").expect("scene")
    }

    #[test]
    fn frame_names_are_zero_padded() {
        assert_eq!(frame_file_name(0), "frame_00000.png");
        assert_eq!(frame_file_name(1234), "frame_01234.png");
    }

    #[test]
    fn png_sink_writes_every_frame() {
        let scene = tiny_scene("");
        let temp = tempfile::tempdir().expect("tempdir");
        let sink = PngSequenceSink::new(temp.path(), 24);
        let (sink, outcome) =
            play_scene(&scene, Some(Renderer::new(&scene)), sink).expect("play");
        assert_eq!(outcome.frame_count, 5);
        assert_eq!(sink.written(), 5);
        for index in 0..5 {
            assert!(temp.path().join(frame_file_name(index)).is_file());
        }
        assert_eq!(sink.finish_hash().len(), 64);
    }

    #[test]
    fn single_frame_out_of_range_is_an_error() {
        let scene = tiny_scene("");
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("frame.png");
        assert_eq!(render_single_frame(&scene, 4, &path).expect("frame"), 5);
        assert!(path.is_file());
        let error = render_single_frame(&scene, 5, &temp.path().join("x.png")).expect_err("range");
        assert!(error.to_string().contains("out of range"));
    }

    #[test]
    fn missing_encoder_still_cleans_up_and_summarizes() {
        let scene = tiny_scene("");
        let temp = tempfile::tempdir().expect("tempdir");
        let mut options = ExportOptions::for_scene(&scene);
        options.output = temp.path().join("out.mp4");
        options.ffmpeg_path = Some(temp.path().join("no-ffmpeg-here"));
        options.report = Some(temp.path().join("report.json"));
        options.keep_frames = Some(temp.path().join("kept"));

        let summary = render_scene(&scene, &options).expect("render proceeds");
        assert_eq!(summary.frame_count, 5);
        assert_eq!(summary.output_bytes, 0);
        assert!(!summary.succeeded());
        let labels = summary.passes.iter().map(|pass| pass.label).collect::<Vec<_>>();
        assert_eq!(labels, vec!["video", "mux"]);
        assert!(summary.passes.iter().all(|pass| !pass.success));
        assert!((summary.duration_seconds - 5.0 / 24.0).abs() < 1e-9);
        assert_eq!(summary.cue_counts.get(&CueKind::Tok), Some(&1));
        assert_eq!(summary.audio_samples, Some(audio::buffer_len(5, 24, 44_100)));
        assert!(temp.path().join("kept").join(frame_file_name(4)).is_file());
        assert!(temp.path().join("kept").join(AUDIO_FILE).is_file());

        let report: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(temp.path().join("report.json")).expect("report"),
        )
        .expect("json");
        assert_eq!(report["frame_count"], 5);
        assert_eq!(report["cue_counts"]["tok"], 1);
        assert!(report["rendered_at"].is_string());

        options.strict = true;
        let error = render_scene(&scene, &options).expect_err("strict");
        assert!(error.to_string().contains("encoding failed"));
    }

    #[test]
    fn silent_scene_uses_single_pass() {
        let scene = tiny_scene("audio: { enabled: false }");
        let temp = tempfile::tempdir().expect("tempdir");
        let mut options = ExportOptions::for_scene(&scene);
        options.output = temp.path().join("out.mp4");
        options.ffmpeg_path = Some(temp.path().join("no-ffmpeg-here"));
        let summary = render_scene(&scene, &options).expect("render proceeds");
        assert_eq!(summary.audio_samples, None);
        assert_eq!(summary.passes.len(), 1);
        assert_eq!(summary.passes[0].label, "video");
    }
}
