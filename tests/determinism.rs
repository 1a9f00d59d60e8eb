use anyhow::Result;

use termreel::audio;
use termreel::renderer::Renderer;
use termreel::scene::{load_preset, parse_scene, Preset, Scene};
use termreel::timeline::{play_scene, CapturedFrame, DiscardFrames, FrameSink};

const SCENE: &str = r#"
name: determinism
environment:
  resolution: { width: 320, height: 180 }
  font_size: 20
  line_height: 24
  title_bar_height: 24
  pad_x: 12
  pad_y: 10
  bar: { width: 120, height: 10, radius: 4 }
fonts: { builtin_only: true }
prompt: { icon: ">" }
highlight: prompts
audio: { click: crisp, keystroke_every: 1 }
beats:
  - kind: type
    runs: [["termreel check ", primary], ["--json", arg]]
    enter: true
  - kind: progress
    status: "scanning..."
    duration: { frames: 12 }
    highlight_prompts: true
  - kind: output
    lines:
      - [["  ✓ ", green], ["ok · 3 beats", dim]]
      - [["  █████░░░░░", primary]]
    flash: { from: white, to: primary }
  - kind: blank
  - kind: signoff
  - kind: breathe
    duration: { frames: 10 }
"#;

/// FNV-1a over every rendered frame, one hash per frame.
#[derive(Default)]
struct HashFrames {
    hashes: Vec<u64>,
}

impl FrameSink for HashFrames {
    fn accept(&mut self, frame: CapturedFrame<'_>) -> Result<()> {
        let canvas = frame.canvas.expect("renderer attached");
        self.hashes.push(fnv1a64(canvas.pixels()));
        Ok(())
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325_u64;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn frame_hashes(scene: &Scene) -> Vec<u64> {
    let (sink, outcome) = play_scene(scene, Some(Renderer::new(scene)), HashFrames::default())
        .expect("scene should play");
    assert_eq!(sink.hashes.len() as u32, outcome.frame_count);
    sink.hashes
}

#[test]
fn determinism_rendering_twice_is_byte_identical() {
    let scene = parse_scene(SCENE, "test", "determinism").expect("scene should parse");
    let first = frame_hashes(&scene);
    let second = frame_hashes(&scene);
    assert_eq!(first, second, "identical input must render identical frames");
}

#[test]
fn determinism_frames_actually_change_over_time() {
    let scene = parse_scene(SCENE, "test", "determinism").expect("scene should parse");
    let hashes = frame_hashes(&scene);
    assert_ne!(hashes[0], hashes[1], "typing should change the frame");
    let breathe = &hashes[hashes.len() - 10..];
    assert!(
        breathe.windows(2).any(|pair| pair[0] != pair[1]),
        "breathing signoff should animate"
    );
}

#[test]
fn determinism_theme_change_changes_output() {
    let base = parse_scene(SCENE, "test", "determinism").expect("scene should parse");
    let recolored = parse_scene(
        &SCENE.replace(
            "fonts: { builtin_only: true }",
            "fonts: { builtin_only: true }\ntheme: { background: \"#202020\" }",
        ),
        "test",
        "determinism",
    )
    .expect("scene should parse");
    assert_ne!(frame_hashes(&base)[0], frame_hashes(&recolored)[0]);
}

#[test]
fn determinism_audio_mix_is_stable() {
    let scene = load_preset(Preset::Soft).expect("preset");
    let (_, outcome) =
        play_scene(&scene, None, DiscardFrames::default()).expect("scene should play");
    let mix = || {
        audio::encode_wav(
            scene.audio.sample_rate,
            &audio::quantize(&audio::mix(
                &outcome.cues,
                outcome.frame_count,
                scene.environment.fps,
                scene.audio.sample_rate,
                scene.audio.click,
            )),
        )
    };
    let first = mix();
    let second = mix();
    assert_eq!(fnv1a64(&first), fnv1a64(&second));
    assert_eq!(
        first.len(),
        44 + 2 * audio::buffer_len(outcome.frame_count, scene.environment.fps, scene.audio.sample_rate)
    );
}
