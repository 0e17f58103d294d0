//! Local time.

use super::{Module, ModuleDescriptor, ModuleError, ModuleInit};
use crate::bar::Context;
use crate::ui::theme::{TEXT_INSET, ZONE_PADDING};
use crate::ui::zone::ZoneId;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::Deserialize;
use std::time::Duration;

pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "clock",
    description: "Display the current time.",
    init,
};

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
    /// strftime-style format
    format: String,
    interval_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            format: "%H:%M".to_string(),
            interval_ms: 1000,
        }
    }
}

fn check_format(format: &str) -> Result<(), ModuleError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ModuleError::Failed(format!("invalid time format '{}'", format)));
    }
    Ok(())
}

struct Clock {
    format: String,
    zone: ZoneId,
    /// Text currently on screen
    shown: String,
}

fn init(ctx: &mut Context<'_>, init: &ModuleInit<'_>) -> Result<Box<dyn Module>, ModuleError> {
    let options: Options = init.options()?;
    check_format(&options.format)?;

    let now = Local::now().format(&options.format).to_string();
    let width = ctx.text_width(&now) + ZONE_PADDING;
    let zone = ctx.alloc_zone(init.position, width);
    ctx.schedule_interval(Duration::from_millis(options.interval_ms.max(1)), true);

    Ok(Box::new(Clock {
        format: options.format,
        zone,
        shown: String::new(),
    }))
}

impl Module for Clock {
    fn render(&mut self, ctx: &mut Context<'_>) {
        let colours = ctx.colours();
        if let Some(mut draw) = ctx.draw(self.zone) {
            let (w, h) = (draw.width(), draw.height());
            draw.rect(0, 0, w, h, colours.background);
            draw.text(TEXT_INSET, 0, &self.shown, colours.foreground);
        }
    }

    fn tick(&mut self, ctx: &mut Context<'_>) {
        let now = Local::now().format(&self.format).to_string();
        if now != self.shown {
            self.shown = now;
            self.render(ctx);
        }
    }
}
