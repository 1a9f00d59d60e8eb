use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::schema::{ClickPreset, CueKind};

/// A sound effect placed at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioCue {
    pub frame: u32,
    pub kind: CueKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ClickVoice {
    duration: f64,
    frequency: f64,
    volume: f64,
    decay: f64,
    noise: f64,
}

const SOFT_CLICK: ClickVoice = ClickVoice {
    duration: 0.022,
    frequency: 1200.0,
    volume: 0.05,
    decay: 150.0,
    noise: 0.03,
};

const CRISP_CLICK: ClickVoice = ClickVoice {
    duration: 0.018,
    frequency: 1800.0,
    volume: 0.15,
    decay: 200.0,
    noise: 0.08,
};

const ENTER_DURATION: f64 = 0.035;
const CHIME_DURATION: f64 = 0.18;
const TOK_DURATION: f64 = 0.08;
const BELL_DURATION: f64 = 2.5;

/// `(frequency, amplitude, decay rate)` of the singing-bowl partials.
const BELL_PARTIALS: [(f64, f64, f64); 4] = [
    (528.0, 1.0, 1.2),
    (1056.0, 0.4, 2.0),
    (1584.0, 0.15, 3.0),
    (2640.0, 0.06, 5.0),
];

fn sample_count(sample_rate: u32, seconds: f64) -> usize {
    (f64::from(sample_rate) * seconds) as usize
}

/// Deterministic noise in `[-0.5, 0.5)` for sample `i`.
fn lcg_noise(i: usize) -> f64 {
    let value = ((i as u64 * 1_103_515_245 + 12_345) >> 16) & 0x7FFF;
    value as f64 / 32_768.0 - 0.5
}

fn click(sample_rate: u32, voice: ClickVoice) -> Vec<f64> {
    let noise_samples = sample_count(sample_rate, 0.003);
    (0..sample_count(sample_rate, voice.duration))
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let envelope = (-t * voice.decay).exp();
            let mut value = (TAU * voice.frequency * t).sin() * envelope * voice.volume;
            if i < noise_samples {
                value += lcg_noise(i) * voice.noise * envelope;
            }
            value
        })
        .collect()
}

fn enter(sample_rate: u32) -> Vec<f64> {
    const FREQUENCY: f64 = 600.0;
    const VOLUME: f64 = 0.08;
    (0..sample_count(sample_rate, ENTER_DURATION))
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let envelope = (-t * 80.0).exp();
            (TAU * FREQUENCY * t).sin() * envelope * VOLUME
                + (TAU * 200.0 * t).sin() * envelope * VOLUME * 0.3
        })
        .collect()
}

fn chime(sample_rate: u32) -> Vec<f64> {
    const START: f64 = 800.0;
    const END: f64 = 1400.0;
    const VOLUME: f64 = 0.06;
    (0..sample_count(sample_rate, CHIME_DURATION))
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let frequency = START + (END - START) * (t / CHIME_DURATION);
            let fade_in = (t / 0.02).min(1.0);
            let fade_out = (1.0 - (t - CHIME_DURATION * 0.6) / (CHIME_DURATION * 0.4)).max(0.0);
            let envelope = fade_in * fade_out;
            (TAU * frequency * t).sin() * envelope * VOLUME
                + (TAU * frequency * 2.5 * t).sin() * envelope * VOLUME * 0.15
        })
        .collect()
}

fn tok(sample_rate: u32) -> Vec<f64> {
    const VOLUME: f64 = 0.12;
    let noise_samples = sample_count(sample_rate, 0.004);
    (0..sample_count(sample_rate, TOK_DURATION))
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let mut value = (TAU * 400.0 * t).sin() * (-t * 60.0).exp() * 0.6
                + (TAU * 1100.0 * t).sin() * (-t * 120.0).exp() * 0.4;
            if i < noise_samples {
                value += lcg_noise(i) * 0.5 * (-t * 300.0).exp();
            }
            value * VOLUME
        })
        .collect()
}

fn bell(sample_rate: u32) -> Vec<f64> {
    const VOLUME: f64 = 0.07;
    (0..sample_count(sample_rate, BELL_DURATION))
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let body = BELL_PARTIALS
                .iter()
                .map(|(frequency, amplitude, decay)| {
                    (TAU * frequency * t).sin() * amplitude * (-t * decay).exp()
                })
                .sum::<f64>();
            let attack = (t / 0.008).min(1.0);
            let beating = 1.0 + 0.02 * (TAU * 1.5 * t).sin();
            body * attack * beating * VOLUME
        })
        .collect()
}

/// Samples of one voice.
pub fn voice(kind: CueKind, sample_rate: u32, click_preset: ClickPreset) -> Vec<f64> {
    match kind {
        CueKind::Keystroke => click(
            sample_rate,
            match click_preset {
                ClickPreset::Soft => SOFT_CLICK,
                ClickPreset::Crisp => CRISP_CLICK,
            },
        ),
        CueKind::Enter => enter(sample_rate),
        CueKind::Chime => chime(sample_rate),
        CueKind::Tok => tok(sample_rate),
        CueKind::Bell => bell(sample_rate),
    }
}

/// `ceil(frames / fps * sample_rate)`, computed exactly.
pub fn buffer_len(total_frames: u32, fps: u32, sample_rate: u32) -> usize {
    let numerator = u64::from(total_frames) * u64::from(sample_rate);
    numerator.div_ceil(u64::from(fps.max(1))) as usize
}

/// `floor(frame / fps * sample_rate)`, computed exactly.
pub fn cue_offset(frame: u32, fps: u32, sample_rate: u32) -> usize {
    (u64::from(frame) * u64::from(sample_rate) / u64::from(fps.max(1))) as usize
}

/// Sums every cue's voice into a buffer covering `total_frames`. Cues at
/// or past the last frame are dropped; voices running past the end are
/// cut off.
pub fn mix(
    cues: &[AudioCue],
    total_frames: u32,
    fps: u32,
    sample_rate: u32,
    click_preset: ClickPreset,
) -> Vec<f64> {
    let mut buffer = vec![0.0; buffer_len(total_frames, fps, sample_rate)];
    let mut voices: BTreeMap<CueKind, Vec<f64>> = BTreeMap::new();
    for cue in cues.iter().filter(|cue| cue.frame < total_frames) {
        let samples = voices
            .entry(cue.kind)
            .or_insert_with(|| voice(cue.kind, sample_rate, click_preset));
        let start = cue_offset(cue.frame, fps, sample_rate);
        if start >= buffer.len() {
            continue;
        }
        for (slot, sample) in buffer[start..].iter_mut().zip(samples.iter()) {
            *slot += sample;
        }
    }
    buffer
}

/// Clamps to `[-1, 1]` and scales to 16-bit, truncating toward zero.
pub fn quantize(samples: &[f64]) -> Vec<i16> {
    samples
        .iter()
        .map(|sample| (sample.clamp(-1.0, 1.0) * 32_767.0) as i16)
        .collect()
}

/// Mono 16-bit PCM RIFF/WAVE bytes.
pub fn encode_wav(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = (samples.len() * 2) as u32;

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

pub fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) -> Result<()> {
    fs::write(path, encode_wav(sample_rate, samples))
        .with_context(|| format!("failed to write audio track {}", path.display()))
}
