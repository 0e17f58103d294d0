//! Fixed-size glyph cache.
//!
//! ASCII code points each own a slot. Everything else shares 256 slots keyed by
//! the XOR of the code point's four bytes. When a different code point keeps
//! landing on an occupied shared slot, a per-slot contention counter grows; once
//! it exceeds the occupant's hit count the occupant is evicted and the slot is
//! left empty, so whichever code point is asked for next claims it.

use super::text_rasterizing::{Glyph, Rasterize};
use std::borrow::Cow;

pub const ASCII_SLOTS: usize = 128;
pub const EXTRA_SLOTS: usize = 256;

#[derive(Debug)]
struct CachedGlyph {
    code: u32,
    hits: u32,
    glyph: Glyph,
}

enum SlotState {
    Vacant,
    Hit,
    Taken { hits: u32 },
}

pub struct GlyphCache {
    ascii: Vec<Option<CachedGlyph>>,
    extra: Vec<Option<CachedGlyph>>,
    contention: [u32; EXTRA_SLOTS],
}

#[inline]
fn slot_hash(code: u32) -> usize {
    code.to_le_bytes().iter().fold(0u8, |h, b| h ^ b) as usize
}

impl Default for GlyphCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphCache {
    pub fn new() -> Self {
        Self {
            ascii: (0..ASCII_SLOTS).map(|_| None).collect(),
            extra: (0..EXTRA_SLOTS).map(|_| None).collect(),
            contention: [0; EXTRA_SLOTS],
        }
    }

    /// Cached glyph for `c`, counting a hit. Never fills or evicts.
    pub fn lookup(&mut self, c: char) -> Option<&Glyph> {
        let code = c as u32;
        let occupant = if (code as usize) < ASCII_SLOTS {
            &mut self.ascii[code as usize]
        } else {
            &mut self.extra[slot_hash(code)]
        };

        match occupant {
            Some(cached) if cached.code == code => {
                cached.hits += 1;
                Some(&cached.glyph)
            }
            _ => None,
        }
    }

    /// Glyph for `c`, rasterizing on a miss.
    ///
    /// An empty slot is filled with the new glyph. A slot held by another code
    /// point is left alone (apart from contention bookkeeping) and the glyph is
    /// returned uncached. `None` when the face has no glyph for `c`.
    pub fn fetch<R>(&mut self, c: char, rasterizer: &mut R) -> Option<Cow<'_, Glyph>>
    where
        R: Rasterize + ?Sized,
    {
        let code = c as u32;
        let (occupant, contention) = if (code as usize) < ASCII_SLOTS {
            (&mut self.ascii[code as usize], None)
        } else {
            let h = slot_hash(code);
            (&mut self.extra[h], Some(&mut self.contention[h]))
        };

        let state = match occupant {
            None => SlotState::Vacant,
            Some(cached) if cached.code == code => SlotState::Hit,
            Some(cached) => SlotState::Taken { hits: cached.hits },
        };

        match state {
            SlotState::Vacant => {
                let glyph = rasterizer.rasterize(c)?;
                log::trace!("caching glyph for {:?} ({:#x})", c, code);
                let cached = occupant.insert(CachedGlyph {
                    code,
                    hits: 1,
                    glyph,
                });
                Some(Cow::Borrowed(&cached.glyph))
            }
            SlotState::Hit => {
                let cached = occupant.as_mut()?;
                cached.hits += 1;
                Some(Cow::Borrowed(&cached.glyph))
            }
            SlotState::Taken { hits } => {
                if let Some(wants) = contention {
                    *wants += 1;
                    if *wants > hits {
                        *wants = 0;
                        if let Some(evicted) = occupant.take() {
                            log::trace!("evicting cached glyph {:#x}", evicted.code);
                        }
                    }
                }
                rasterizer.rasterize(c).map(Cow::Owned)
            }
        }
    }

    /// Hit count of `c` if it is cached
    pub fn hits(&self, c: char) -> Option<u32> {
        let code = c as u32;
        let occupant = if (code as usize) < ASCII_SLOTS {
            &self.ascii[code as usize]
        } else {
            &self.extra[slot_hash(code)]
        };
        occupant.as_ref().filter(|g| g.code == code).map(|g| g.hits)
    }

    pub fn len(&self) -> usize {
        self.ascii.iter().chain(&self.extra).flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached glyph and reset contention
    pub fn clear(&mut self) {
        self.ascii.iter_mut().chain(self.extra.iter_mut()).for_each(|slot| *slot = None);
        self.contention = [0; EXTRA_SLOTS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::text_rasterizing::FontError;

    /// Square glyphs whose advance encodes the code point
    #[derive(Default)]
    struct CountingRasterizer {
        calls: u32,
    }

    impl Rasterize for CountingRasterizer {
        fn set_size(&mut self, _pixels: u32) -> Result<(), FontError> {
            Ok(())
        }

        fn rasterize(&mut self, c: char) -> Option<Glyph> {
            self.calls += 1;
            (c != '\u{FFFF}').then(|| Glyph {
                width: 1,
                height: 1,
                left: 0,
                top: 0,
                advance: c as u32,
                bitmap: vec![255],
            })
        }
    }

    #[test]
    fn test_slot_hash() {
        assert_eq!(slot_hash(0xE9), 0xE9);
        assert_eq!(slot_hash(0x1E8), 0xE9);
        assert_eq!(slot_hash(0x0102_0304), 1 ^ 2 ^ 3 ^ 4);
    }

    #[test]
    fn test_hits_increase() {
        let mut cache = GlyphCache::new();
        let mut r = CountingRasterizer::default();

        assert_eq!(cache.fetch('a', &mut r).map(|g| g.advance), Some('a' as u32));
        assert_eq!(cache.hits('a'), Some(1));

        cache.fetch('a', &mut r);
        assert!(cache.lookup('a').is_some());
        assert_eq!(cache.hits('a'), Some(3));
        assert_eq!(r.calls, 1);
    }

    #[test]
    fn test_lookup_never_fills() {
        let mut cache = GlyphCache::new();
        assert!(cache.lookup('a').is_none());
        assert!(cache.lookup('é').is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_glyph_not_cached() {
        let mut cache = GlyphCache::new();
        let mut r = CountingRasterizer::default();
        assert!(cache.fetch('\u{FFFF}', &mut r).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_contention_evicts() {
        let mut cache = GlyphCache::new();
        let mut r = CountingRasterizer::default();
        let (owner, rival) = ('é', '\u{1E8}');

        cache.fetch(owner, &mut r);
        cache.fetch(owner, &mut r);
        assert_eq!(cache.hits(owner), Some(2));

        // Rival is served uncached until its contention beats the owner's hits
        for _ in 0..2 {
            let glyph = cache.fetch(rival, &mut r);
            assert!(matches!(glyph, Some(Cow::Owned(_))));
            assert_eq!(cache.hits(owner), Some(2));
        }
        assert!(matches!(cache.fetch(rival, &mut r), Some(Cow::Owned(_))));
        assert_eq!(cache.hits(owner), None);
        assert!(cache.is_empty());

        // The freed slot goes to whoever asks next
        assert!(matches!(cache.fetch(rival, &mut r), Some(Cow::Borrowed(_))));
        assert_eq!(cache.hits(rival), Some(1));
    }

    #[test]
    fn test_clear() {
        let mut cache = GlyphCache::new();
        let mut r = CountingRasterizer::default();
        for c in ['a', 'b', 'é'] {
            cache.fetch(c, &mut r);
        }
        assert_eq!(cache.len(), 3);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits('a'), None);

        cache.fetch('a', &mut r);
        assert_eq!(r.calls, 4);
    }
}
