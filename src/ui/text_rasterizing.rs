use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, SwashCache};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FontError {
    #[error("could not load font '{path}': {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid font size {0}px")]
    InvalidSize(u32),
}

/// One rasterized code point.
///
/// `advance` is in 26.6 fixed point (1/64th of a pixel) so that summing many
/// advances does not accumulate rounding error; `left`/`top` place the bitmap
/// relative to the pen position and the top of the text line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Glyph {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    pub advance: u32,
    /// 8-bit coverage, `width * height` bytes, rows packed
    pub bitmap: Vec<u8>,
}

/// Turns a code point into a coverage bitmap at the active pixel size
pub trait Rasterize {
    fn set_size(&mut self, pixels: u32) -> Result<(), FontError>;

    /// `None` when the face has no glyph for `c`
    fn rasterize(&mut self, c: char) -> Option<Glyph>;

    /// Advance only, without producing a bitmap
    fn advance(&mut self, c: char) -> Option<u32> {
        self.rasterize(c).map(|g| g.advance)
    }
}

pub struct CosmicRasterizer {
    font_system: FontSystem,
    swash_cache: SwashCache,
    family: Option<String>,
    size: u32,
}

impl CosmicRasterizer {
    /// `file` is loaded on top of the system font database. Without a
    /// `family`, the generic monospace family is used.
    pub fn new(family: Option<String>, file: Option<&Path>, size: u32) -> Result<Self, FontError> {
        if size == 0 {
            return Err(FontError::InvalidSize(size));
        }

        let mut font_system = FontSystem::new();
        if let Some(path) = file {
            let data = std::fs::read(path).map_err(|source| FontError::Load {
                path: path.to_path_buf(),
                source,
            })?;
            font_system.db_mut().load_font_data(data);
            log::debug!("loaded font file {}", path.display());
        }

        Ok(Self {
            font_system,
            swash_cache: SwashCache::new(),
            family,
            size,
        })
    }

    fn shaped(&mut self, c: char) -> Option<Buffer> {
        let attrs = match &self.family {
            Some(name) => Attrs::new().family(Family::Name(name)),
            None => Attrs::new().family(Family::Monospace),
        };

        let size = self.size as f32;
        let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(size, size));
        let mut utf8 = [0u8; 4];

        buffer.set_size(&mut self.font_system, None, None);
        buffer.set_text(
            &mut self.font_system,
            c.encode_utf8(&mut utf8),
            &attrs,
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(&mut self.font_system, false);

        // glyph_id 0 is .notdef in every face: treat as missing
        let found = buffer
            .layout_runs()
            .next()
            .and_then(|run| run.glyphs.first())
            .is_some_and(|glyph| glyph.glyph_id != 0);
        found.then_some(buffer)
    }
}

impl Rasterize for CosmicRasterizer {
    fn set_size(&mut self, pixels: u32) -> Result<(), FontError> {
        if pixels == 0 {
            return Err(FontError::InvalidSize(pixels));
        }
        self.size = pixels;
        Ok(())
    }

    fn rasterize(&mut self, c: char) -> Option<Glyph> {
        let buffer = self.shaped(c)?;
        let run = buffer.layout_runs().next()?;
        let glyph = run.glyphs.first()?;
        let advance = (glyph.w * 64.).round().max(0.) as u32;
        let physical = glyph.physical((0., 0.), 1.);

        let mut rendered = Glyph {
            width: 0,
            height: 0,
            left: 0,
            top: 0,
            advance,
            bitmap: Vec::new(),
        };

        // Whitespace has no image, only an advance
        if let Some(image) = self
            .swash_cache
            .get_image(&mut self.font_system, physical.cache_key)
        {
            let width = image.placement.width;
            let height = image.placement.height;
            let area = (width * height) as usize;

            rendered.bitmap = if image.data.len() == area {
                image.data.clone()
            } else if image.data.len() == area * 4 {
                // Colour glyph (emoji): keep its alpha as coverage
                image.data.iter().skip(3).step_by(4).copied().collect()
            } else {
                log::warn!("unexpected glyph image layout for {:?}", c);
                return Some(rendered);
            };
            rendered.width = width;
            rendered.height = height;
            rendered.left = physical.x + image.placement.left;
            rendered.top = physical.y + run.line_y as i32 - image.placement.top;
        }

        Some(rendered)
    }

    fn advance(&mut self, c: char) -> Option<u32> {
        let buffer = self.shaped(c)?;
        let run = buffer.layout_runs().next()?;
        let glyph = run.glyphs.first()?;
        Some((glyph.w * 64.).round().max(0.) as u32)
    }
}
