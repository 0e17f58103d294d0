//! Shared drawing primitives
//!
//! These functions work on any `&mut [u32]` ARGB pixel buffer with an explicit
//! stride (in pixels). Every rectangle is clipped against the buffer before a
//! single pixel is touched, so callers may pass targets that hang over the
//! edges or lie entirely outside.

/// Axis-aligned rectangle in buffer pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamp to a `bounds_w` x `bounds_h` buffer. Each axis is clamped on its
    /// own: the start is pulled inside the buffer, then the end is cut at the
    /// edge.
    pub fn clip(&self, bounds_w: u32, bounds_h: u32) -> Rect {
        let sx = self.x.min(bounds_w);
        let sy = self.y.min(bounds_h);
        let ex = sx.saturating_add(self.width).min(bounds_w);
        let ey = sy.saturating_add(self.height).min(bounds_h);
        Rect::new(sx, sy, ex - sx, ey - sy)
    }
}

/// Fill `rect` with `colour`. Returns the area actually written.
pub fn fill_rect(pixels: &mut [u32], stride: usize, height: u32, rect: Rect, colour: u32) -> Rect {
    let clipped = rect.clip(stride as u32, height);
    if clipped.is_empty() {
        return clipped;
    }

    for row in clipped.y..clipped.y + clipped.height {
        let start = row as usize * stride + clipped.x as usize;
        pixels[start..start + clipped.width as usize].fill(colour);
    }
    clipped
}

/// Copy source pixels into `rect`, row by row.
/// Source and destination strides are independent; the source is read from
/// its top-left corner even when the destination is clipped.
pub fn copy_rect(
    pixels: &mut [u32],
    stride: usize,
    height: u32,
    rect: Rect,
    src: &[u32],
    src_stride: usize,
) -> Rect {
    let clipped = rect.clip(stride as u32, height);
    if clipped.is_empty() {
        return clipped;
    }

    let w = clipped.width as usize;
    for (iy, row) in (clipped.y..clipped.y + clipped.height).enumerate() {
        let dst = row as usize * stride + clipped.x as usize;
        let src_row = iy * src_stride;
        pixels[dst..dst + w].copy_from_slice(&src[src_row..src_row + w]);
    }
    clipped
}

/// Spread the four 8-bit channels of a pixel into 16-bit lanes
#[inline]
fn widen(c: u32) -> u64 {
    let mut c = c as u64;
    c = (c | (c << 16)) & 0x0000FFFF0000FFFF;
    (c | (c << 8)) & 0x00FF00FF00FF00FF
}

/// Blend `colour` over `bg` with 8-bit coverage `alpha`, all lanes at once.
/// The background keeps its own alpha channel.
#[inline]
pub fn blend(bg: u32, colour: u32, alpha: u8) -> u32 {
    match alpha {
        0 => bg,
        255 => colour & 0x00FF_FFFF | bg & 0xFF00_0000,
        _ => {
            let alpha = alpha as u64;
            let inv_alpha = 255 - alpha;

            let mut blended = widen(bg) * inv_alpha + widen(colour) * alpha;

            blended = (blended >> 8) & 0x00FF00FF00FF00FF;
            blended = (blended | (blended >> 8)) & 0x0000FFFF0000FFFF;
            blended = blended | (blended >> 16);
            blended as u32 & 0x00FF_FFFF | bg & 0xFF00_0000
        }
    }
}
