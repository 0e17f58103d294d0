//! Zone to output compositing.
//!
//! Every output shows the same zones. Left groups grow rightwards from the left
//! edge, right groups grow leftwards from the right edge, and the centre group
//! is laid out left to right around the middle of the output.

use super::drawing::{copy_rect, fill_rect, Rect};
use super::zone::{Zone, ZonePosition, Zones};

/// Destination x of a zone inside an output `output_width` pixels wide.
///
/// Panics if the zone would not fit; callers check the group first.
pub fn dest_x(
    position: ZonePosition,
    offset: u32,
    zone_width: u32,
    group_width: u32,
    output_width: u32,
) -> u32 {
    assert!(
        offset + zone_width <= group_width && group_width <= output_width,
        "zone [{}, {}) of a {}px group does not fit a {}px output",
        offset,
        offset + zone_width,
        group_width,
        output_width
    );
    match position {
        ZonePosition::Left => offset,
        ZonePosition::Center => (output_width - group_width) / 2 + offset,
        ZonePosition::Right => output_width - offset - zone_width,
    }
}

/// Where a zone lands in an output, or `None` if its group is wider than the
/// output
pub fn zone_rect(zones: &Zones, zone: &Zone, output_width: u32) -> Option<Rect> {
    let group_width = zones.group_width(zone.position());
    if group_width > output_width {
        return None;
    }
    let x = dest_x(
        zone.position(),
        zone.offset(),
        zone.width(),
        group_width,
        output_width,
    );
    Some(Rect::new(x, 0, zone.width(), zone.height()))
}

/// Blit zones into an output buffer and return the damaged areas.
///
/// A `full` pass paints the background first and blits every zone; otherwise
/// only dirty zones are copied.
pub fn compose(
    zones: &Zones,
    pixels: &mut [u32],
    width: u32,
    height: u32,
    full: bool,
    background: u32,
) -> Vec<Rect> {
    let stride = width as usize;
    let mut damage = Vec::new();

    if full {
        let all = fill_rect(pixels, stride, height, Rect::new(0, 0, width, height), background);
        damage.push(all);
    }

    for (id, zone) in zones.iter() {
        if !full && !zone.is_dirty() {
            continue;
        }

        let Some(dest) = zone_rect(zones, zone, width) else {
            if full {
                log::warn!(
                    "{:?} zones need {}px but the output is {}px wide, skipping {:?}",
                    zone.position(),
                    zones.group_width(zone.position()),
                    width,
                    id
                );
            }
            continue;
        };

        let written = copy_rect(pixels, stride, height, dest, zone.pixels(), zone.width() as usize);
        if !full && !written.is_empty() {
            damage.push(written);
        }
    }

    damage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::colour::Colour;
    use pretty_assertions::assert_eq;

    const BG: u32 = 0xFF101010;

    #[test]
    fn test_dest_x() {
        assert_eq!(dest_x(ZonePosition::Left, 0, 100, 100, 1920), 0);
        assert_eq!(dest_x(ZonePosition::Left, 100, 20, 120, 1920), 100);
        assert_eq!(dest_x(ZonePosition::Right, 0, 80, 80, 1920), 1840);
        assert_eq!(dest_x(ZonePosition::Right, 80, 40, 120, 1920), 1800);
        assert_eq!(dest_x(ZonePosition::Center, 0, 100, 200, 1000), 400);
        assert_eq!(dest_x(ZonePosition::Center, 100, 100, 200, 1000), 500);
    }

    #[test]
    #[should_panic]
    fn test_dest_x_overflow_panics() {
        dest_x(ZonePosition::Right, 0, 80, 80, 60);
    }

    #[test]
    fn test_full_pass() {
        let mut zones = Zones::new(2);
        zones.alloc(ZonePosition::Left, 2, Colour::from_argb(1));
        zones.alloc(ZonePosition::Right, 1, Colour::from_argb(2));
        zones.alloc(ZonePosition::Center, 2, Colour::from_argb(3));

        let mut pixels = vec![0; 8 * 2];
        let damage = compose(&zones, &mut pixels, 8, 2, true, BG);

        assert_eq!(damage, vec![Rect::new(0, 0, 8, 2)]);
        let row = [1, 1, BG, 3, 3, BG, BG, 2];
        assert_eq!(&pixels[..8], &row);
        assert_eq!(&pixels[8..], &row);
    }

    #[test]
    fn test_dirty_pass_damage() {
        let mut zones = Zones::new(2);
        let left = zones.alloc(ZonePosition::Left, 2, Colour::from_argb(1));
        zones.alloc(ZonePosition::Right, 3, Colour::from_argb(2));
        zones.clear_dirty();

        let mut pixels = vec![0; 8 * 2];
        assert!(compose(&zones, &mut pixels, 8, 2, false, BG).is_empty());
        assert!(pixels.iter().all(|&p| p == 0));

        let mut font = crate::ui::font::tests::box_font(8);
        zones
            .draw(left, &mut font)
            .unwrap()
            .rect(0, 0, 1, 1, Colour::from_argb(9));
        let damage = compose(&zones, &mut pixels, 8, 2, false, BG);
        assert_eq!(damage, vec![Rect::new(0, 0, 2, 2)]);
        assert_eq!(&pixels[..8], &[9, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_group_is_skipped() {
        let mut zones = Zones::new(1);
        zones.alloc(ZonePosition::Left, 2, Colour::from_argb(1));
        zones.alloc(ZonePosition::Right, 6, Colour::from_argb(2));

        let mut pixels = vec![0; 4];
        compose(&zones, &mut pixels, 4, 1, true, BG);
        assert_eq!(pixels, vec![1, 1, BG, BG]);
    }
}
