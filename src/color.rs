use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Serialize, Serializer};

use crate::error_codes::{CodedError, SCENE_UNKNOWN_COLOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn parse_hex(value: &str) -> Option<Self> {
        let hex = value.strip_prefix('#').unwrap_or(value);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }

    /// Channel-wise linear interpolation; fractional results truncate toward zero.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| {
            let value = a as f32 + (b as f32 - a as f32) * t;
            value.clamp(0.0, 255.0) as u8
        };
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

pub const FG: Rgb = Rgb::new(230, 230, 230);
pub const WHITE: Rgb = Rgb::new(255, 255, 255);
pub const DIM: Rgb = Rgb::new(120, 120, 130);
pub const PRIMARY: Rgb = Rgb::new(251, 113, 133);
pub const GREEN: Rgb = Rgb::new(52, 211, 153);
pub const BLUE: Rgb = Rgb::new(96, 165, 250);
pub const YELLOW: Rgb = Rgb::new(250, 204, 21);
pub const CYAN: Rgb = Rgb::new(103, 232, 249);
pub const COMMENT: Rgb = Rgb::new(180, 180, 195);
pub const ARG: Rgb = Rgb::new(200, 200, 210);

const BUILTIN_PALETTE: [(&str, Rgb); 10] = [
    ("fg", FG),
    ("white", WHITE),
    ("dim", DIM),
    ("primary", PRIMARY),
    ("green", GREEN),
    ("blue", BLUE),
    ("yellow", YELLOW),
    ("cyan", CYAN),
    ("comment", COMMENT),
    ("arg", ARG),
];

/// Named colors available to a scene: the built-in names, overridden or
/// extended by the scene's own `theme.palette`.
#[derive(Debug, Clone)]
pub struct Palette {
    named: BTreeMap<String, Rgb>,
}

impl Palette {
    pub fn builtin() -> Self {
        let named = BUILTIN_PALETTE
            .iter()
            .map(|(name, rgb)| ((*name).to_owned(), *rgb))
            .collect();
        Self { named }
    }

    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut palette = Self::builtin();
        for (name, value) in overrides {
            let rgb = Rgb::parse_hex(value).ok_or_else(|| {
                CodedError::new(
                    SCENE_UNKNOWN_COLOR,
                    format!("palette entry '{name}' must be #rrggbb, got '{value}'"),
                )
            })?;
            palette.named.insert(name.clone(), rgb);
        }
        Ok(palette)
    }

    pub fn resolve(&self, reference: &str) -> Result<Rgb> {
        let reference = reference.trim();
        if reference.starts_with('#') {
            return Rgb::parse_hex(reference).ok_or_else(|| {
                CodedError::new(
                    SCENE_UNKNOWN_COLOR,
                    format!("'{reference}' is not a #rrggbb color"),
                )
                .into()
            });
        }
        self.named.get(reference).copied().ok_or_else(|| {
            let known = self.named.keys().cloned().collect::<Vec<_>>().join(", ");
            CodedError::new(
                SCENE_UNKNOWN_COLOR,
                format!("unknown color '{reference}' (known names: {known})"),
            )
            .into()
        })
    }
}

/// Pulse between `low` and `high` as `(sin(tick * speed) + 1) / 2`.
pub fn breath_color(low: Rgb, high: Rgb, tick: u32, speed: f32) -> Rgb {
    let t = ((tick as f32 * speed).sin() + 1.0) / 2.0;
    low.lerp(high, t)
}
