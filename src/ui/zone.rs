//! Zones: the per-widget pixel buffers that make up the bar.
//!
//! Zones are grouped by position. Inside a group each zone sits at the sum of
//! the widths allocated before it, so groups never overlap internally. A zone's
//! pixels can only be written through a [`DrawSession`], which marks the zone
//! dirty when it is dropped if anything was actually written.

use super::colour::Colour;
use super::drawing::{copy_rect, fill_rect, Rect};
use super::font::Font;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZonePosition {
    Left,
    Center,
    Right,
}

impl ZonePosition {
    pub const ALL: [ZonePosition; 3] = [Self::Left, Self::Center, Self::Right];

    fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Center => 1,
            Self::Right => 2,
        }
    }
}

/// Handle to a zone. Stale handles (zone destroyed) are detected, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ZoneId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
pub struct Zone {
    position: ZonePosition,
    width: u32,
    height: u32,
    offset: u32,
    pixels: Vec<u32>,
    dirty: bool,
}

impl Zone {
    pub fn position(&self) -> ZonePosition {
        self.position
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Distance from the start of the position group
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    zone: Option<Zone>,
}

#[derive(Debug, Default)]
struct Group {
    order: Vec<ZoneId>,
    width: u32,
}

pub struct Zones {
    slots: Vec<Slot>,
    free: Vec<u32>,
    groups: [Group; 3],
    height: u32,
    layout_changed: bool,
}

impl Zones {
    /// `height` is the bar thickness: every zone is that tall
    pub fn new(height: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            groups: Default::default(),
            height,
            layout_changed: false,
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Append a zone of `width` pixels to its group, filled with `fill`
    pub fn alloc(&mut self, position: ZonePosition, width: u32, fill: Colour) -> ZoneId {
        let group = &mut self.groups[position.index()];
        let zone = Zone {
            position,
            width,
            height: self.height,
            offset: group.width,
            pixels: vec![fill.argb(); width as usize * self.height as usize],
            dirty: true,
        };
        group.width += width;

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.zone = Some(zone);
                ZoneId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    zone: Some(zone),
                });
                ZoneId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        group.order.push(id);

        // Centre zones move whenever their group grows
        self.layout_changed = true;
        log::debug!("allocated {:?} zone {:?}, {}x{}", position, id, width, self.height);
        id
    }

    /// Remove a zone and close the gap it leaves in its group.
    /// Returns false for a stale handle.
    pub fn destroy(&mut self, id: ZoneId) -> bool {
        let Some(zone) = self.take(id) else {
            return false;
        };

        let group = &mut self.groups[zone.position.index()];
        group.order.retain(|&other| other != id);
        group.width -= zone.width;

        let mut offset = 0;
        for &other in &group.order {
            if let Some(z) = self.slots[other.index as usize].zone.as_mut() {
                z.offset = offset;
                z.dirty = true;
                offset += z.width;
            }
        }

        self.layout_changed = true;
        log::debug!("destroyed {:?} zone {:?}", zone.position, id);
        true
    }

    fn take(&mut self, id: ZoneId) -> Option<Zone> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let zone = slot.zone.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(zone)
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.zone.as_ref())
    }

    fn get_mut(&mut self, id: ZoneId) -> Option<&mut Zone> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.zone.as_mut())
    }

    /// Total width reserved by a position group
    pub fn group_width(&self, position: ZonePosition) -> u32 {
        self.groups[position.index()].width
    }

    /// Zones of one group in allocation order
    pub fn group(&self, position: ZonePosition) -> impl Iterator<Item = (ZoneId, &Zone)> + '_ {
        self.groups[position.index()]
            .order
            .iter()
            .filter_map(move |&id| self.get(id).map(|zone| (id, zone)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &Zone)> + '_ {
        ZonePosition::ALL.into_iter().flat_map(move |p| self.group(p))
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.order.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a draw session. `None` for a stale handle.
    pub fn draw<'a>(&'a mut self, id: ZoneId, font: &'a mut Font) -> Option<DrawSession<'a>> {
        let zone = self.get_mut(id)?;
        Some(DrawSession {
            zone,
            font,
            written: false,
        })
    }

    pub fn needs_drawing(&self) -> bool {
        self.layout_changed || self.iter().any(|(_, zone)| zone.dirty)
    }

    /// True once after zones were added or removed
    pub fn take_layout_changed(&mut self) -> bool {
        std::mem::take(&mut self.layout_changed)
    }

    pub fn clear_dirty(&mut self) {
        for zone in self.slots.iter_mut().filter_map(|slot| slot.zone.as_mut()) {
            zone.dirty = false;
        }
    }
}

/// Exclusive access to one zone's pixels
pub struct DrawSession<'a> {
    zone: &'a mut Zone,
    font: &'a mut Font,
    written: bool,
}

impl DrawSession<'_> {
    pub fn width(&self) -> u32 {
        self.zone.width
    }

    pub fn height(&self) -> u32 {
        self.zone.height
    }

    pub fn rect(&mut self, x: u32, y: u32, w: u32, h: u32, colour: Colour) {
        let zone = &mut *self.zone;
        let written = fill_rect(
            &mut zone.pixels,
            zone.width as usize,
            zone.height,
            Rect::new(x, y, w, h),
            colour.argb(),
        );
        self.written |= !written.is_empty();
    }

    /// Copy a `w` x `h` ARGB image with its top-left corner at `(x, y)`
    pub fn icon(&mut self, x: u32, y: u32, w: u32, h: u32, icon: &[u32]) {
        assert!(
            icon.len() >= w as usize * h as usize,
            "{}x{} icon with only {} pixels",
            w,
            h,
            icon.len()
        );
        let zone = &mut *self.zone;
        let written = copy_rect(
            &mut zone.pixels,
            zone.width as usize,
            zone.height,
            Rect::new(x, y, w, h),
            icon,
            w as usize,
        );
        self.written |= !written.is_empty();
    }

    /// Text with its first line's top-left corner at `(x, y)`, clipped to the
    /// zone and never wrapped.
    pub fn text(&mut self, x: u32, y: u32, text: &str, colour: Colour) {
        let zone = &mut *self.zone;
        if x >= zone.width || y >= zone.height {
            log::warn!(
                "text at ({}, {}) outside a {}x{} zone, skipping",
                x,
                y,
                zone.width,
                zone.height
            );
            return;
        }

        let region = Rect::new(x, y, zone.width - x, zone.height - y);
        self.written |= self.font.render_string(
            text,
            false,
            colour.argb(),
            &mut zone.pixels,
            zone.width as usize,
            region,
        );
    }

    pub fn text_width(&mut self, text: &str) -> u32 {
        self.font.string_width(text)
    }
}

impl Drop for DrawSession<'_> {
    fn drop(&mut self) {
        if self.written {
            self.zone.dirty = true;
        }
    }
}
