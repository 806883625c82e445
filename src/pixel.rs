use std::fmt;
use std::str::FromStr;

use crate::error::{CompareResult, DiffError};

/// One RGBA8 pixel packed into a little-endian 32-bit word.
///
/// Red occupies the lowest byte and alpha the highest, so the in-memory
/// byte order of a `[Pixel]` slice on little-endian targets is `R, G, B, A`,
/// identical to the canonical RGBA8 buffer produced by the codec adapter.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Pixel(u32);

impl Pixel {
    pub const TRANSPARENT: Pixel = Pixel(0);
    pub const RED: Pixel = Pixel::from_rgba(255, 0, 0, 255);

    #[inline(always)]
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(u32::from_le_bytes([r, g, b, a]))
    }

    #[inline(always)]
    pub const fn from_word(word: u32) -> Self {
        Self(word)
    }

    #[inline(always)]
    pub const fn word(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn r(self) -> u8 {
        self.0 as u8
    }

    #[inline(always)]
    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline(always)]
    pub const fn b(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline(always)]
    pub const fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn channels(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Parse `#rrggbb`, `rrggbb`, `#rrggbbaa` or `rrggbbaa`. Colors without
    /// an alpha component are opaque.
    pub fn from_hex(raw: &str) -> CompareResult<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return Err(DiffError::InvalidConfig(format!(
                "color `{raw}` must be #rrggbb or #rrggbbaa"
            )));
        }

        let channel = |index: usize| {
            u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16).map_err(|_| {
                DiffError::InvalidConfig(format!("color `{raw}` contains non-hex digits"))
            })
        };
        let alpha = if digits.len() == 8 { channel(3)? } else { 255 };
        Ok(Self::from_rgba(channel(0)?, channel(1)?, channel(2)?, alpha))
    }
}

impl FromStr for Pixel {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.channels();
        write!(f, "Pixel({r}, {g}, {b}, {a})")
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.channels();
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl From<[u8; 4]> for Pixel {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Self::from_rgba(r, g, b, a)
    }
}
