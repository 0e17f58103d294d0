//! Text measurement and rendering on top of the glyph cache.
//!
//! Pen positions are tracked in 26.6 fixed point. Measuring and rendering
//! walk a string with the same advance and line-break rules, so a measured
//! width always holds the rendered string at the same size.

use super::drawing::{blend, Rect};
use super::glyph_cache::GlyphCache;
use super::text_rasterizing::{FontError, Glyph, Rasterize};
use std::collections::HashMap;

pub struct Font {
    rasterizer: Box<dyn Rasterize>,
    cache: GlyphCache,
    /// Advances measured for glyphs not in the cache
    advances: HashMap<char, u32>,
    size: u32,
}

/// Characters that never produce a glyph. Line feed is handled separately.
#[inline]
fn is_unprintable(c: char) -> bool {
    c.is_control()
}

impl Font {
    /// `rasterizer` must already be set to `size` pixels
    pub fn new(rasterizer: Box<dyn Rasterize>, size: u32) -> Self {
        Self {
            rasterizer,
            cache: GlyphCache::new(),
            advances: HashMap::new(),
            size,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Line height in pixels; lines are exactly one font size apart
    pub fn line_height(&self) -> u32 {
        self.size
    }

    /// Every cached bitmap belongs to the old size, so the cache goes first
    pub fn set_size(&mut self, pixels: u32) -> Result<(), FontError> {
        self.cache.clear();
        self.advances.clear();
        self.rasterizer.set_size(pixels)?;
        self.size = pixels;
        log::debug!("font size set to {}px", pixels);
        Ok(())
    }

    pub fn cache(&self) -> &GlyphCache {
        &self.cache
    }

    /// Substitute advance for code points the face cannot render
    fn default_advance(&self) -> u32 {
        self.size << 6
    }

    fn advance_of(&mut self, c: char) -> u32 {
        if let Some(glyph) = self.cache.lookup(c) {
            return glyph.advance;
        }
        if let Some(&advance) = self.advances.get(&c) {
            return advance;
        }
        let advance = self.rasterizer.advance(c).unwrap_or(self.default_advance());
        self.advances.insert(c, advance);
        advance
    }

    /// Width in whole pixels of the widest line of `text`, rounded up
    pub fn string_width(&mut self, text: &str) -> u32 {
        let mut widest: u64 = 0;
        let mut line: u64 = 0;

        for c in text.chars() {
            if c == '\n' {
                widest = widest.max(line);
                line = 0;
                continue;
            }
            if is_unprintable(c) {
                continue;
            }
            line += self.advance_of(c) as u64;
        }
        widest = widest.max(line);

        ((widest >> 6) + u64::from(widest & 0x3F != 0)) as u32
    }

    /// Render `text` into `region` of a `stride`-wide pixel buffer.
    ///
    /// Once the pen passes the right edge of the region the text either wraps
    /// onto a new line or, without `wrap`, jumps to the next explicit line feed
    /// (stopping if there is none). Rendering stops at the bottom of the region.
    /// Returns whether any pixel was inked.
    pub fn render_string(
        &mut self,
        text: &str,
        wrap: bool,
        colour: u32,
        pixels: &mut [u32],
        stride: usize,
        region: Rect,
    ) -> bool {
        assert!(
            (region.x + region.width) as usize <= stride
                && (region.y + region.height) as usize * stride <= pixels.len(),
            "text region {:?} outside a {}-wide buffer of {} pixels",
            region,
            stride,
            pixels.len()
        );
        if region.is_empty() {
            return false;
        }

        let fallback = self.default_advance();
        let width_64ths = (region.width as u64) << 6;
        let mut x_64ths: u64 = 0;
        let mut y: u32 = 0;
        let mut chars = text.chars();
        let mut inked = false;

        while let Some(c) = chars.next() {
            let mut new_line = c == '\n';

            if !new_line {
                if is_unprintable(c) {
                    continue;
                }

                let pen = ((x_64ths >> 6) as u32, y);
                let advance = match self.cache.fetch(c, self.rasterizer.as_mut()) {
                    Some(glyph) => {
                        inked |= draw_glyph(&glyph, colour, pixels, stride, region, pen);
                        glyph.advance
                    }
                    None => {
                        log::warn!("no glyph for {:?} ({:#x}), skipping", c, c as u32);
                        fallback
                    }
                };

                x_64ths += advance as u64;
                if x_64ths >= width_64ths {
                    if !wrap && !chars.by_ref().any(|c| c == '\n') {
                        return inked;
                    }
                    new_line = true;
                }
            }

            if new_line {
                x_64ths = 0;
                y += self.line_height();
                if y >= region.height {
                    return inked;
                }
            }
        }
        inked
    }
}

/// Blend one glyph at `pen` (relative to `region`), clipped to `region`.
/// False if no covered pixel fell inside the region.
fn draw_glyph(
    glyph: &Glyph,
    colour: u32,
    pixels: &mut [u32],
    stride: usize,
    region: Rect,
    pen: (u32, u32),
) -> bool {
    let w = glyph.width as usize;
    if w == 0 || glyph.bitmap.len() < w * glyph.height as usize {
        return false;
    }

    let (x0, x1) = (region.x as i64, (region.x + region.width) as i64);
    let (y0, y1) = (region.y as i64, (region.y + region.height) as i64);
    let ox = x0 + pen.0 as i64 + glyph.left as i64;
    let oy = y0 + pen.1 as i64 + glyph.top as i64;
    let mut inked = false;

    for (gy, row) in glyph.bitmap.chunks_exact(w).take(glyph.height as usize).enumerate() {
        let y = oy + gy as i64;
        if y < y0 {
            continue;
        }
        if y >= y1 {
            break;
        }

        let line = y as usize * stride;
        for (gx, &alpha) in row.iter().enumerate() {
            let x = ox + gx as i64;
            if x < x0 {
                continue;
            }
            if x >= x1 {
                break;
            }
            if alpha == 0 {
                continue;
            }
            let i = line + x as usize;
            pixels[i] = blend(pixels[i], colour, alpha);
            inked = true;
        }
    }
    inked
}
