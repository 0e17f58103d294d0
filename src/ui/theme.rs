// Defaults used when the configuration leaves a value out.
// All colours are packed ARGB: 0xAARRGGBB

use super::colour::Colour;

// Bar colours
pub const BACKGROUND: Colour = Colour::from_argb(0xFF_1E_1E_1E);
pub const FOREGROUND: Colour = Colour::from_argb(0xFF_D0_D0_D0);

// Geometry
pub const THICKNESS: u32 = 32; // Bar height for top/bottom anchors
pub const FONT_SIZE: u32 = 14; // Pixels
pub const ZONE_PADDING: u32 = 8; // Horizontal slack added to measured text widths
pub const TEXT_INSET: u32 = 4; // Left inset of module text inside its zone

// Layer shell namespace reported to the compositor
pub const NAMESPACE: &str = "gaybar";
