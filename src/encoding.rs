use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Result};
#[cfg(feature = "sidecar_ffmpeg")]
use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, warn};

use crate::schema::EncodingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FfmpegMode {
    #[default]
    Auto,
    System,
    Sidecar,
}

trait EncoderBackend {
    fn mode_label(&self) -> &'static str;
    fn program(&self) -> Result<PathBuf>;
}

struct SystemFfmpegBackend {
    path: PathBuf,
}

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend;

impl EncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn program(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl EncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn program(&self) -> Result<PathBuf> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        Ok(path)
    }
}

fn select_backend(mode: FfmpegMode, explicit: Option<&Path>) -> Result<Box<dyn EncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend {
            path: explicit.map_or_else(|| PathBuf::from("ffmpeg"), Path::to_path_buf),
        })),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                Err(anyhow!(
                    "ffmpeg sidecar mode requested but termreel was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                ))
            }
        }
    }
}

/// What one ffmpeg invocation did. Failures are recorded here rather than
/// returned as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassOutcome {
    pub label: &'static str,
    pub success: bool,
    pub status: Option<i32>,
    pub stderr_tail: String,
}

/// A resolved ffmpeg binary.
pub struct Encoder {
    program: PathBuf,
    mode_label: &'static str,
}

impl Encoder {
    pub fn resolve(mode: FfmpegMode, explicit: Option<&Path>) -> Result<Self> {
        let backend = select_backend(mode, explicit)?;
        let program = backend.program()?;
        debug!(mode = backend.mode_label(), program = %program.display(), "resolved ffmpeg");
        Ok(Self {
            program,
            mode_label: backend.mode_label(),
        })
    }

    /// Runs ffmpeg to completion with `args`, capturing its stderr tail.
    pub fn run_pass(&self, label: &'static str, args: &[String]) -> PassOutcome {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let outcome = match output {
            Ok(output) => PassOutcome {
                label,
                success: output.status.success(),
                status: output.status.code(),
                stderr_tail: last_n_chars(&String::from_utf8_lossy(&output.stderr), 500),
            },
            Err(error) => {
                let message = if error.kind() == ErrorKind::NotFound {
                    format!(
                        "ffmpeg executable not found (mode={}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                        self.mode_label,
                        self.program.display()
                    )
                } else {
                    format!(
                        "failed to spawn ffmpeg process (mode={}, resolved_path={}): {error}",
                        self.mode_label,
                        self.program.display()
                    )
                };
                PassOutcome {
                    label,
                    success: false,
                    status: None,
                    stderr_tail: message,
                }
            }
        };

        if !outcome.success {
            warn!(
                pass = label,
                status = ?outcome.status,
                stderr_tail = %outcome.stderr_tail,
                args = %args.join(" "),
                "ffmpeg pass failed"
            );
        }
        outcome
    }
}

fn common_args() -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
    ]
}

/// Encodes the PNG sequence matching `pattern` (e.g. `dir/frame_%05d.png`).
/// With `faststart` the output is a final, audio-less artifact.
pub fn sequence_encode_args(
    encoding: &EncodingConfig,
    fps: u32,
    pattern: &Path,
    output: &Path,
    faststart: bool,
) -> Vec<String> {
    let mut args = common_args();
    args.extend([
        "-framerate".to_owned(),
        fps.to_string(),
        "-i".to_owned(),
        pattern.to_string_lossy().into_owned(),
        "-c:v".to_owned(),
        encoding.codec.clone(),
        "-pix_fmt".to_owned(),
        encoding.pixel_format.clone(),
        "-crf".to_owned(),
        encoding.crf.to_string(),
        "-preset".to_owned(),
        encoding.preset.clone(),
    ]);
    if faststart {
        args.extend(faststart_args());
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Copies the video stream of `video` and adds `audio`, trimmed to the
/// shorter of the two.
pub fn mux_args(encoding: &EncodingConfig, video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    let mut args = common_args();
    args.extend([
        "-i".to_owned(),
        video.to_string_lossy().into_owned(),
        "-i".to_owned(),
        audio.to_string_lossy().into_owned(),
        "-c:v".to_owned(),
        "copy".to_owned(),
        "-c:a".to_owned(),
        encoding.audio_codec.clone(),
        "-b:a".to_owned(),
        encoding.audio_bitrate.clone(),
    ]);
    args.extend(faststart_args());
    args.push("-shortest".to_owned());
    args.push(output.to_string_lossy().into_owned());
    args
}

fn faststart_args() -> [String; 2] {
    ["-movflags".to_owned(), "+faststart".to_owned()]
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_args_follow_encoding_config() {
        let args = sequence_encode_args(
            &EncodingConfig::default(),
            24,
            Path::new("/tmp/f/frame_%05d.png"),
            Path::new("/tmp/f/silent.mp4"),
            false,
        );
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "error", "-y", "-framerate", "24", "-i",
                "/tmp/f/frame_%05d.png", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-crf", "12",
                "-preset", "slow", "/tmp/f/silent.mp4",
            ]
        );
    }

    #[test]
    fn single_pass_adds_faststart_before_output() {
        let args = sequence_encode_args(
            &EncodingConfig::default(),
            30,
            Path::new("frames/frame_%05d.png"),
            Path::new("out.mp4"),
            true,
        );
        let tail = &args[args.len() - 3..];
        assert_eq!(tail, ["-movflags", "+faststart", "out.mp4"]);
    }

    #[test]
    fn mux_args_copy_video_and_encode_audio() {
        let args = mux_args(
            &EncodingConfig::default(),
            Path::new("silent.mp4"),
            Path::new("audio.wav"),
            Path::new("teaser.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-i silent.mp4 -i audio.wav -c:v copy -c:a aac -b:a 128k"));
        assert!(joined.ends_with("-movflags +faststart -shortest teaser.mp4"));
    }

    #[test]
    fn missing_binary_is_captured_not_raised() {
        let encoder = Encoder::resolve(
            FfmpegMode::System,
            Some(Path::new("/nonexistent/bin/ffmpeg-termreel")),
        )
        .expect("resolve");
        let outcome = encoder.run_pass("probe", &["-version".to_owned()]);
        assert!(!outcome.success);
        assert_eq!(outcome.status, None);
        assert!(outcome.stderr_tail.contains("not found"), "{}", outcome.stderr_tail);
    }

    #[test]
    fn tail_keeps_the_last_characters() {
        assert_eq!(last_n_chars("  abcdef  ", 4), "ef");
        assert_eq!(last_n_chars("short", 500), "short");
    }

    #[cfg(not(feature = "sidecar_ffmpeg"))]
    #[test]
    fn sidecar_requires_feature() {
        assert!(Encoder::resolve(FfmpegMode::Sidecar, None).is_err());
    }
}
