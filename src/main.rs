use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use termreel::encoding::FfmpegMode;
use termreel::error_codes::envelope_for;
use termreel::export::{cue_counts, render_scene, render_single_frame, ExportOptions};
use termreel::logging::{init_logging, DEFAULT_LEVEL};
use termreel::scene::{load_and_validate_scene, load_preset, Preset, Scene};
use termreel::schema::CueKind;
use termreel::timeline::{play_scene, DiscardFrames};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TERMREEL_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "termreel")]
#[command(about = "Render scripted terminal sessions into teaser videos")]
#[command(version = VERSION)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long = "log-level", global = true, default_value = DEFAULT_LEVEL)]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct SceneSource {
    /// Scene YAML file. Defaults to the bundled preset.
    scene: Option<PathBuf>,
    #[arg(long, value_enum, conflicts_with = "scene")]
    preset: Option<Preset>,
}

impl SceneSource {
    fn load(&self) -> Result<Scene> {
        match &self.scene {
            Some(path) => load_and_validate_scene(path),
            None => load_preset(self.preset.unwrap_or(Preset::Zen)),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a scene to MP4.
    Render {
        #[command(flatten)]
        source: SceneSource,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Skip audio even when the scene enables it.
        #[arg(long)]
        no_audio: bool,
        /// Copy the PNG frames (and audio.wav) here before cleanup.
        #[arg(long)]
        keep_frames: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = FfmpegMode::Auto)]
        ffmpeg_mode: FfmpegMode,
        /// Explicit ffmpeg binary for system mode.
        #[arg(long = "ffmpeg")]
        ffmpeg_path: Option<PathBuf>,
        /// Write a JSON render report.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Fail when an encoder pass fails.
        #[arg(long)]
        strict: bool,
    },
    /// Validate a scene and report its length and cues without rendering.
    Check {
        #[command(flatten)]
        source: SceneSource,
        #[arg(long)]
        json: bool,
    },
    /// Render a single frame to PNG.
    Frame {
        #[command(flatten)]
        source: SceneSource,
        #[arg(long = "frame")]
        frame: u32,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Write a bundled preset scene to disk.
    Init {
        #[arg(default_value = "scene.yaml")]
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = Preset::Zen)]
        preset: Preset,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
struct CheckReport {
    ok: bool,
    scene: String,
    width: u32,
    height: u32,
    fps: u32,
    beats: usize,
    frame_count: u32,
    duration_seconds: f64,
    cue_counts: BTreeMap<CueKind, usize>,
    audio: bool,
    output: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let json_errors = matches!(cli.command, Commands::Check { json: true, .. });
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if json_errors {
                match serde_json::to_string_pretty(&envelope_for(&error)) {
                    Ok(json) => println!("{json}"),
                    Err(_) => eprintln!("error: {error:#}"),
                }
            } else {
                eprintln!("error: {error:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Render {
            source,
            output,
            no_audio,
            keep_frames,
            ffmpeg_mode,
            ffmpeg_path,
            report,
            strict,
        } => {
            let scene = source.load()?;
            let mut options = ExportOptions::for_scene(&scene);
            if let Some(output) = output {
                options.output = output;
            }
            options.audio = options.audio && !no_audio;
            options.keep_frames = keep_frames;
            options.ffmpeg_mode = ffmpeg_mode;
            options.ffmpeg_path = ffmpeg_path;
            options.report = report;
            options.strict = strict;
            let summary = render_scene(&scene, &options)?;
            summary.print();
            Ok(())
        }
        Commands::Check { source, json } => run_check(&source, json),
        Commands::Frame {
            source,
            frame,
            output,
        } => {
            let scene = source.load()?;
            let total = render_single_frame(&scene, frame, &output)?;
            println!("Wrote {} (frame {frame} of {total})", output.display());
            Ok(())
        }
        Commands::Init {
            path,
            preset,
            force,
        } => run_init(&path, preset, force),
    }
}

fn run_check(source: &SceneSource, json: bool) -> Result<()> {
    let scene = source.load()?;
    let (_, outcome) = play_scene(&scene, None, DiscardFrames::default())?;
    let env = scene.environment;
    let report = CheckReport {
        ok: true,
        scene: scene.name.clone(),
        width: env.resolution.width,
        height: env.resolution.height,
        fps: env.fps,
        beats: scene.beats.len(),
        frame_count: outcome.frame_count,
        duration_seconds: scene.duration_seconds(),
        cue_counts: cue_counts(&outcome),
        audio: scene.audio.enabled,
        output: scene.output.clone(),
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to serialize check report")?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "OK: {} ({}x{}, {} fps, {} frames = {:.1}s, {} beats)",
        report.scene,
        report.width,
        report.height,
        report.fps,
        report.frame_count,
        report.duration_seconds,
        report.beats
    );
    if report.cue_counts.is_empty() {
        println!("Cues: none");
    } else {
        let cues = report
            .cue_counts
            .iter()
            .map(|(kind, count)| format!("{count} {}", kind.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let audio = if report.audio { "" } else { " (audio disabled)" };
        println!("Cues: {cues}{audio}");
    }
    Ok(())
}

fn run_init(path: &Path, preset: Preset, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, preset.source())
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(preset = preset.name(), path = %path.display(), "wrote scene");
    println!("Wrote {} (preset {})", path.display(), preset.name());
    Ok(())
}
