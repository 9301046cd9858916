//! Colour values accepted from scripts
//!
//! Scripts hand colours over as strings. Everything that reaches a
//! per-instance buffer goes through [`Color::parse`] first, so a bad
//! string is rejected before any stage state changes.

use std::str::FromStr;

/// Errors produced while parsing a colour string
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColorError {
    /// The string is not a recognized colour form
    #[error("unrecognized color {0:?} (expected e.g. \"red\", \"#ff0000\", \"rgb(255,0,0)\")")]
    Unrecognized(String),
}

/// Linear RGB colour with components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
}

/// Named colours understood by [`Color::parse`]
const NAMED: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("lime", 0x00ff00),
    ("green", 0x008000),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("aqua", 0x00ffff),
    ("magenta", 0xff00ff),
    ("fuchsia", 0xff00ff),
    ("gray", 0x808080),
    ("grey", 0x808080),
    ("silver", 0xc0c0c0),
    ("maroon", 0x800000),
    ("olive", 0x808000),
    ("navy", 0x000080),
    ("purple", 0x800080),
    ("teal", 0x008080),
    ("orange", 0xffa500),
    ("pink", 0xffc0cb),
    ("brown", 0xa52a2a),
    ("gold", 0xffd700),
    ("indigo", 0x4b0082),
    ("violet", 0xee82ee),
    ("skyblue", 0x87ceeb),
    ("hotpink", 0xff69b4),
    ("coral", 0xff7f50),
    ("salmon", 0xfa8072),
    ("crimson", 0xdc143c),
    ("turquoise", 0x40e0d0),
    ("lightgray", 0xd3d3d3),
    ("darkgray", 0xa9a9a9),
];

impl Color {
    /// Opaque white, the neutral per-instance colour
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };

    /// Black, the neutral emissive colour
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };

    /// Create a colour from components
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Create a colour from a packed `0xRRGGBB` value
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    /// Packed `0xRRGGBB` value, rounded per channel
    pub fn to_hex(self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    /// Components as an array, the layout per-instance buffers store
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(...)`, `hsl(...)` or a CSS colour name
    pub fn parse(input: &str) -> Result<Self, ColorError> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        let unrecognized = || ColorError::Unrecognized(input.to_string());

        if let Some(hex) = lower.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(unrecognized);
        }
        if let Some(args) = function_args(&lower, "rgb").or_else(|| function_args(&lower, "rgba")) {
            return parse_rgb(args).ok_or_else(unrecognized);
        }
        if let Some(args) = function_args(&lower, "hsl").or_else(|| function_args(&lower, "hsla")) {
            return parse_hsl(args).ok_or_else(unrecognized);
        }
        NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, hex)| Self::from_hex(*hex))
            .ok_or_else(unrecognized)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Per-instance emission: colour scaled by intensity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emissive {
    /// Emitted colour
    pub color: Color,
    /// Multiplier applied to the colour
    pub intensity: f32,
}

impl Emissive {
    /// No emission
    pub const NONE: Emissive = Emissive { color: Color::BLACK, intensity: 0.0 };

    /// Emission with the default intensity of 1.0
    pub fn new(color: Color) -> Self {
        Self { color, intensity: 1.0 }
    }

    /// Emission with an explicit intensity
    pub fn with_intensity(color: Color, intensity: f32) -> Self {
        Self { color, intensity }
    }

    /// Packed RGBA layout (intensity in alpha)
    pub fn to_array(self) -> [f32; 4] {
        [self.color.r, self.color.g, self.color.b, self.intensity]
    }
}

fn function_args<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    input
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let value = u32::from_str_radix(hex, 16).ok()?;
            let expand = |nibble: u32| (nibble << 4) | nibble;
            let r = expand((value >> 8) & 0xf);
            let g = expand((value >> 4) & 0xf);
            let b = expand(value & 0xf);
            Some(Color::from_hex((r << 16) | (g << 8) | b))
        }
        6 => u32::from_str_radix(hex, 16).ok().map(Color::from_hex),
        _ => None,
    }
}

fn split_args(args: &str) -> Vec<&str> {
    args.split(|c: char| c == ',' || c.is_whitespace() || c == '/')
        .filter(|part| !part.is_empty())
        .collect()
}

fn parse_rgb(args: &str) -> Option<Color> {
    let parts = split_args(args);
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let mut channels = [0.0f32; 3];
    for (slot, part) in channels.iter_mut().zip(&parts) {
        let value = match part.strip_suffix('%') {
            Some(percent) => percent.parse::<f32>().ok()? / 100.0,
            None => part.parse::<f32>().ok()? / 255.0,
        };
        *slot = value.clamp(0.0, 1.0);
    }
    Some(Color::new(channels[0], channels[1], channels[2]))
}

fn parse_hsl(args: &str) -> Option<Color> {
    let parts = split_args(args);
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let h = parts[0].trim_end_matches("deg").parse::<f32>().ok()?.rem_euclid(360.0) / 360.0;
    let s = parts[1].strip_suffix('%')?.parse::<f32>().ok()?.clamp(0.0, 100.0) / 100.0;
    let l = parts[2].strip_suffix('%')?.parse::<f32>().ok()?.clamp(0.0, 100.0) / 100.0;

    if s == 0.0 {
        return Some(Color::new(l, l, l));
    }
    let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |t: f32| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * 6.0 * (2.0 / 3.0 - t)
        } else {
            p
        }
    };
    Some(Color::new(hue(h + 1.0 / 3.0), hue(h), hue(h - 1.0 / 3.0)))
}
