//! Packed ARGB colour value.
//!
//! Pixels everywhere in the bar are `u32` in `0xAARRGGBB` order, which is
//! exactly the little-endian byte layout of `WL_SHM_FORMAT_ARGB8888`. The
//! wrapper only adds named channel access; bulk blits use the raw `u32`.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid colour '{0}', must be in #RRGGBB hex format")]
pub struct ParseColourError(pub String);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
#[repr(transparent)]
pub struct Colour(u32);

impl Colour {
    pub const fn from_argb(argb: u32) -> Self {
        Self(argb)
    }

    /// Opaque colour from its three channels
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub const fn argb(self) -> u32 {
        self.0
    }

    pub const fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn b(self) -> u8 {
        self.0 as u8
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self(self.0 & 0x00FF_FFFF | (a as u32) << 24)
    }

    /// Parse `#RRGGBB`. The result is always opaque.
    pub fn from_hex(s: &str) -> Result<Self, ParseColourError> {
        let digits = s
            .strip_prefix('#')
            .filter(|d| d.len() == 6 && d.bytes().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| ParseColourError(s.to_string()))?;
        let rgb = u32::from_str_radix(digits, 16).map_err(|_| ParseColourError(s.to_string()))?;
        Ok(Self(0xFF00_0000 | rgb))
    }
}

impl TryFrom<String> for Colour {
    type Error = ParseColourError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Colour> for u32 {
    fn from(c: Colour) -> u32 {
        c.0
    }
}

impl fmt::Debug for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Colour({:#010X})", self.0)
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r(), self.g(), self.b())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        let c = Colour::rgb(0x12, 0x34, 0x56);
        assert_eq!(c.argb(), 0xFF12_3456);
        assert_eq!((c.a(), c.r(), c.g(), c.b()), (0xFF, 0x12, 0x34, 0x56));
        assert_eq!(c.with_alpha(0x80).argb(), 0x8012_3456);
    }

    #[test]
    fn test_from_hex() {
        assert_eq!(Colour::from_hex("#ff8000"), Ok(Colour::rgb(255, 128, 0)));
        assert_eq!(Colour::from_hex("#FF8000").unwrap().to_string(), "#FF8000");

        // Missing hash, wrong length, non-hex digit
        assert!(Colour::from_hex("ff8000").is_err());
        assert!(Colour::from_hex("#ff80").is_err());
        assert!(Colour::from_hex("#ff80zz").is_err());
        assert!(Colour::from_hex("#+f8000").is_err());
    }

    #[test]
    fn test_deserialize() {
        let c: Colour = serde_json::from_str("\"#000000\"").unwrap();
        assert_eq!(c, Colour::rgb(0, 0, 0));
        assert!(serde_json::from_str::<Colour>("\"black\"").is_err());
    }
}
