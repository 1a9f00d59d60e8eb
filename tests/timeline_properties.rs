use anyhow::Result;

use termreel::audio::{self, AudioCue};
use termreel::renderer::bar_fill_width;
use termreel::scene::{load_preset, parse_scene, Preset, Scene};
use termreel::schema::{ClickPreset, CueKind};
use termreel::scroll::{next_offset, ScrollGeometry};
use termreel::timeline::{play_scene, CapturedFrame, DiscardFrames, FrameSink};

/// Keeps the text of the cursor line and the overlay progress per frame.
#[derive(Default)]
struct Probe {
    cursor_text: Vec<Option<String>>,
    progress: Vec<Option<f32>>,
}

impl FrameSink for Probe {
    fn wants_pixels(&self, _index: u32) -> bool {
        false
    }

    fn accept(&mut self, frame: CapturedFrame<'_>) -> Result<()> {
        self.cursor_text.push(frame.view.cursor.as_ref().map(|cursor| {
            cursor
                .runs
                .iter()
                .map(|run| run.text.as_str())
                .collect::<String>()
        }));
        self.progress
            .push(frame.view.overlay.as_ref().map(|overlay| overlay.progress));
        Ok(())
    }
}

fn scene(beats: &str) -> Scene {
    parse_scene(
        &format!("fonts: {{ builtin_only: true }}\nbeats:\n{beats}"),
        "test",
        "props",
    )
    .expect("scene should parse")
}

#[test]
fn scroll_target_is_never_negative() {
    let geometry = ScrollGeometry {
        line_height: 92.0,
        viewport_height: 1904.0,
    };
    for lines in 0..200 {
        assert!(geometry.target(lines) >= 0.0, "{lines} lines");
    }
    assert_eq!(geometry.target(0), 0.0);
    assert_eq!(geometry.target(30), 30.0 * 92.0 - 1904.0 + 184.0);
}

#[test]
fn scroll_reaches_fixed_target_in_bounded_ticks() {
    for target in [0.0_f32, 1.0, 92.0, 900.0, 12_000.0] {
        let mut offset = 0.0;
        let mut ticks = 0;
        while offset != target {
            offset = next_offset(offset, target, 0.15);
            ticks += 1;
            assert!(ticks < 200, "did not settle on {target}");
        }
        assert_eq!(next_offset(offset, target, 0.15), target);
    }
}

#[test]
fn typing_ten_characters_grows_one_per_frame() {
    let scene = scene("  - kind: type\n    runs: [[\"abcdefghij\", fg]]\n    prompt: false\n");
    let (probe, outcome) = play_scene(&scene, None, Probe::default()).expect("play");
    assert_eq!(outcome.frame_count, 10);
    let lengths = probe
        .cursor_text
        .iter()
        .map(|text| text.as_ref().map(|text| text.chars().count()))
        .collect::<Vec<_>>();
    assert_eq!(lengths, (1..=10).map(Some).collect::<Vec<_>>());
}

#[test]
fn progress_fill_is_monotonic_from_empty_to_full() {
    let scene = scene(
        "  - kind: progress\n    status: \"go\"\n    duration: { frames: 30 }\n    from: 0.0\n    to: 1.0\n",
    );
    let (probe, outcome) = play_scene(&scene, None, Probe::default()).expect("play");
    assert_eq!(outcome.frame_count, 30);
    let bar = scene.environment.bar.width;
    let widths = probe
        .progress
        .iter()
        .map(|progress| bar_fill_width(progress.expect("overlay on every frame"), bar))
        .collect::<Vec<_>>();
    assert_eq!(widths[0], 0);
    assert_eq!(widths[29], bar);
    assert!(widths.windows(2).all(|pair| pair[0] <= pair[1]), "{widths:?}");
}

#[test]
fn preset_frame_counts_match_declared_beats() {
    for preset in Preset::ALL {
        let scene = load_preset(preset).expect("preset");
        let (sink, outcome) = play_scene(&scene, None, DiscardFrames::default()).expect("play");
        assert_eq!(sink.seen, outcome.frame_count);
        assert_eq!(outcome.frame_count, scene.total_ticks(), "{}", preset.name());
        assert!(
            outcome.cues.iter().all(|cue| cue.frame <= outcome.frame_count),
            "{}",
            preset.name()
        );
    }
}

#[test]
fn presets_emit_their_signature_cues() {
    let play = |preset| {
        let scene = load_preset(preset).expect("preset");
        play_scene(&scene, None, DiscardFrames::default())
            .expect("play")
            .1
    };

    let zen = play(Preset::Zen);
    assert_eq!(zen.cue_count(CueKind::Tok), 3);
    assert_eq!(zen.cue_count(CueKind::Bell), 1);
    assert_eq!(zen.cue_count(CueKind::Keystroke), 0);

    let soft = play(Preset::Soft);
    assert_eq!(soft.cue_count(CueKind::Enter), 6);
    assert_eq!(soft.cue_count(CueKind::Chime), 4);
    assert!(soft.cue_count(CueKind::Keystroke) > 0);

    let crisp = play(Preset::Crisp);
    assert_eq!(crisp.cue_count(CueKind::Chime), 0);
    assert_eq!(crisp.cue_count(CueKind::Enter), 0);
    assert!(crisp.cue_count(CueKind::Keystroke) > soft.cue_count(CueKind::Keystroke));

    let classic = play(Preset::Classic);
    assert!(classic.cues.is_empty());
}

#[test]
fn audio_length_and_range_hold_for_any_cue_list() {
    let cues = [
        AudioCue { frame: 0, kind: CueKind::Bell },
        AudioCue { frame: 0, kind: CueKind::Bell },
        AudioCue { frame: 0, kind: CueKind::Bell },
        AudioCue { frame: 5, kind: CueKind::Chime },
        AudioCue { frame: 7, kind: CueKind::Keystroke },
        AudioCue { frame: 47, kind: CueKind::Tok },
        AudioCue { frame: 48, kind: CueKind::Enter },
        AudioCue { frame: 500, kind: CueKind::Enter },
    ];
    for (frames, fps, rate) in [(48_u32, 24_u32, 44_100_u32), (7, 30, 48_000), (1, 24, 22_050)] {
        let mixed = audio::mix(&cues, frames, fps, rate, ClickPreset::Crisp);
        let expected = (f64::from(frames) / f64::from(fps) * f64::from(rate)).ceil() as usize;
        assert_eq!(mixed.len(), expected);
        assert_eq!(mixed.len(), audio::buffer_len(frames, fps, rate));
        let quantized = audio::quantize(&mixed);
        assert_eq!(quantized.len(), mixed.len());
        assert!(quantized.iter().any(|sample| *sample != 0));
    }
}
