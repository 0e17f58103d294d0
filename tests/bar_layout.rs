//! One 1920x1080 output with a 32px bar, a 100px zone on the left and an
//! 80px zone on the right.

use gaybar::ui::compositing::{compose, zone_rect};
use gaybar::ui::drawing::Rect;
use gaybar::ui::{Colour, ZonePosition, Zones};
use gaybar::wayland::output::{frame_gate, Configure, OutputState, Phase};
use gaybar::wayland::BarPosition;
use pretty_assertions::assert_eq;

const THICKNESS: u32 = 32;
const BACKGROUND: u32 = 0xFF20_2020;

fn output() -> (OutputState, u32, u32) {
    let mut output = OutputState::new(42);
    output.set_name("DP-1".to_string());
    output.set_logical_size(1920, 1080);
    let (width, height) = output.footprint(BarPosition::Top, THICKNESS).unwrap();
    output.surface_created();

    let Configure::Resize { width, height } = output.configure(width, height) else {
        panic!("first configure must resize");
    };
    output.buffer_allocated();
    assert_eq!(output.phase(), Phase::BufferValid);
    (output, width, height)
}

#[test]
fn zones_land_at_their_edges() {
    let (output, width, height) = output();
    assert_eq!((width, height), (1920, THICKNESS));
    assert!(frame_gate([&output]));

    let left_colour = Colour::rgb(255, 0, 0);
    let right_colour = Colour::rgb(0, 0, 255);
    let mut zones = Zones::new(THICKNESS);
    let left = zones.alloc(ZonePosition::Left, 100, left_colour);
    let right = zones.alloc(ZonePosition::Right, 80, right_colour);

    let left_rect = zone_rect(&zones, zones.get(left).unwrap(), width).unwrap();
    let right_rect = zone_rect(&zones, zones.get(right).unwrap(), width).unwrap();
    assert_eq!(left_rect, Rect::new(0, 0, 100, THICKNESS));
    assert_eq!(right_rect, Rect::new(1920 - 80, 0, 80, THICKNESS));

    let mut pixels = vec![0; (width * height) as usize];
    let damage = compose(&zones, &mut pixels, width, height, true, BACKGROUND);
    assert_eq!(damage, vec![Rect::new(0, 0, width, height)]);

    for y in [0, THICKNESS / 2, THICKNESS - 1] {
        let row = &pixels[(y * width) as usize..((y + 1) * width) as usize];
        assert!(row[..100].iter().all(|&p| p == left_colour.argb()));
        assert!(row[100..1840].iter().all(|&p| p == BACKGROUND));
        assert!(row[1840..].iter().all(|&p| p == right_colour.argb()));
    }
}

#[test]
fn repeated_configure_keeps_the_buffer() {
    let (mut output, width, height) = output();
    output.frame_submitted();
    assert_eq!(output.configure(width, height), Configure::Unchanged);
    assert_eq!(output.phase(), Phase::BufferValid);
    assert!(!output.buffer_dirty());
}

#[test]
fn dirty_pass_only_touches_redrawn_zones() {
    let (_, width, height) = output();
    let mut zones = Zones::new(THICKNESS);
    zones.alloc(ZonePosition::Left, 100, Colour::rgb(255, 0, 0));
    let clock = zones.alloc(ZonePosition::Right, 80, Colour::rgb(0, 0, 255));

    let mut pixels = vec![0; (width * height) as usize];
    compose(&zones, &mut pixels, width, height, true, BACKGROUND);
    zones.take_layout_changed();
    zones.clear_dirty();

    // A draw session that writes nothing leaves the zone clean
    let mut font = gaybar::ui::Font::new(Box::new(NoGlyphs), 14);
    {
        let mut draw = zones.draw(clock, &mut font).unwrap();
        draw.rect(500, 500, 10, 10, Colour::rgb(0, 255, 0));
    }
    assert!(!zones.needs_drawing());
    assert!(compose(&zones, &mut pixels, width, height, false, BACKGROUND).is_empty());

    {
        let mut draw = zones.draw(clock, &mut font).unwrap();
        draw.rect(0, 0, 10, 10, Colour::rgb(0, 255, 0));
    }
    let damage = compose(&zones, &mut pixels, width, height, false, BACKGROUND);
    assert_eq!(damage, vec![Rect::new(1840, 0, 80, THICKNESS)]);
    assert_eq!(pixels[1840], Colour::rgb(0, 255, 0).argb());
}

/// Rasterizer for tests that never draw text
struct NoGlyphs;

impl gaybar::ui::Rasterize for NoGlyphs {
    fn set_size(&mut self, _: u32) -> Result<(), gaybar::ui::FontError> {
        Ok(())
    }

    fn rasterize(&mut self, _: char) -> Option<gaybar::ui::Glyph> {
        None
    }
}
