//! Battery level and time left, read from the kernel's power supply uevent.

use super::{Module, ModuleDescriptor, ModuleError, ModuleInit};
use crate::bar::Context;
use crate::ui::theme::{TEXT_INSET, ZONE_PADDING};
use crate::ui::zone::ZoneId;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "battery",
    description: "Display battery information.",
    init,
};

const PREFIX_CHARGE: &str = "POWER_SUPPLY_CHARGE_";
const PREFIX_ENERGY: &str = "POWER_SUPPLY_ENERGY_";

/// Consumption samples averaged for the time estimate
const AVG_SAMPLES: usize = 60;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
    /// Directory name under /sys/class/power_supply
    battery: String,
    /// Read this file instead of the battery's uevent
    path: Option<PathBuf>,
    interval_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            battery: "BAT1".to_string(),
            path: None,
            interval_ms: 1000,
        }
    }
}

/// Which counters the firmware reports: charge in µAh or energy in µWh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AcpiMode {
    Unknown,
    Charge,
    Energy,
}

impl AcpiMode {
    fn detect(uevent: &str) -> Self {
        if uevent.contains(PREFIX_CHARGE) {
            Self::Charge
        } else if uevent.contains(PREFIX_ENERGY) {
            Self::Energy
        } else {
            Self::Unknown
        }
    }

    fn unit(self) -> char {
        match self {
            Self::Charge => 'A',
            Self::Energy => 'W',
            Self::Unknown => '?',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Unknown,
    Discharging,
    Charging,
}

impl Status {
    fn parse(value: &str) -> Self {
        match value {
            "Charging" => Self::Charging,
            "Discharging" => Self::Discharging,
            _ => Self::Unknown,
        }
    }
}

/// Running mean over the last [`AVG_SAMPLES`] readings
#[derive(Debug)]
struct Average {
    samples: [Option<u64>; AVG_SAMPLES],
    next: usize,
}

impl Average {
    fn new() -> Self {
        Self {
            samples: [None; AVG_SAMPLES],
            next: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn push(&mut self, value: u64) -> u64 {
        self.samples[self.next] = Some(value);
        self.next = (self.next + 1) % AVG_SAMPLES;

        let (sum, count) = self
            .samples
            .iter()
            .flatten()
            .fold((0u64, 0u64), |(sum, count), &v| (sum.saturating_add(v), count + 1));
        sum / count
    }
}

#[derive(Debug)]
struct BatteryInfo {
    mode: AcpiMode,
    status: Status,
    percentage: u64,
    capacity_max: u64,
    capacity_now: u64,
    consumption: u64,
    samples: Average,
}

impl BatteryInfo {
    fn new(mode: AcpiMode) -> Self {
        Self {
            mode,
            status: Status::Unknown,
            percentage: 0,
            capacity_max: 0,
            capacity_now: 0,
            consumption: 0,
            samples: Average::new(),
        }
    }

    /// Apply a uevent dump. True if anything shown or used for the estimate
    /// changed.
    fn update(&mut self, uevent: &str) -> bool {
        let mut changed = false;
        for (key, value) in uevent.lines().filter_map(|line| line.split_once('=')) {
            changed |= self.property(key, value);
        }
        changed
    }

    fn property(&mut self, key: &str, value: &str) -> bool {
        // Property names: drivers/acpi/battery.c in the kernel tree
        match key {
            "POWER_SUPPLY_CAPACITY" => return set_u64(&mut self.percentage, key, value),
            "POWER_SUPPLY_STATUS" => {
                let status = Status::parse(value);
                if status == self.status {
                    return false;
                }
                self.status = status;
                self.samples.reset();
                return true;
            }
            _ => {}
        }

        let (prefix, draw_key) = match self.mode {
            AcpiMode::Charge => (PREFIX_CHARGE, "POWER_SUPPLY_CURRENT_NOW"),
            AcpiMode::Energy => (PREFIX_ENERGY, "POWER_SUPPLY_POWER_NOW"),
            AcpiMode::Unknown => return false,
        };
        match key.strip_prefix(prefix) {
            Some("FULL") => return set_u64(&mut self.capacity_max, key, value),
            Some("NOW") => return set_u64(&mut self.capacity_now, key, value),
            _ => {}
        }
        if key != draw_key {
            return false;
        }

        let mut sample = 0;
        if !parse_u64(&mut sample, key, value) {
            return false;
        }
        let average = self.samples.push(sample);
        let changed = average != self.consumption;
        self.consumption = average;
        changed
    }

    /// Hours and minutes until empty at the average draw
    fn time_left(&self) -> (u64, u64) {
        if self.consumption == 0 {
            return (0, 0);
        }
        let hours = self.capacity_now as f64 / self.consumption as f64;
        let whole = hours.trunc();
        let minutes = ((hours - whole) * 60.0) as u64;
        ((whole as u64).min(99), minutes)
    }
}

fn parse_u64(out: &mut u64, key: &str, value: &str) -> bool {
    match value.trim().parse() {
        Ok(parsed) => {
            *out = parsed;
            true
        }
        Err(e) => {
            log::error!("battery: could not parse {}={} as an unsigned integer: {}", key, value, e);
            false
        }
    }
}

fn set_u64(field: &mut u64, key: &str, value: &str) -> bool {
    let mut parsed = *field;
    parse_u64(&mut parsed, key, value) && std::mem::replace(field, parsed) != parsed
}

fn text(name: &str, hours: u64, minutes: u64, percentage: u64) -> String {
    format!("{}: {:02}:{:02} left\nLVL: {}%", name, hours, minutes, percentage)
}

struct Battery {
    name: String,
    path: PathBuf,
    zone: ZoneId,
    info: BatteryInfo,
}

fn init(ctx: &mut Context<'_>, init: &ModuleInit<'_>) -> Result<Box<dyn Module>, ModuleError> {
    let options: Options = init.options()?;
    let path = options
        .path
        .unwrap_or_else(|| PathBuf::from(format!("/sys/class/power_supply/{}/uevent", options.battery)));

    let uevent = std::fs::read_to_string(&path).map_err(|source| ModuleError::Io {
        path: path.clone(),
        source,
    })?;
    let mode = AcpiMode::detect(&uevent);
    if mode == AcpiMode::Unknown {
        log::error!("battery: could not determine acpi mode of {}", options.battery);
    } else {
        log::trace!("battery: detected acpi {:?} mode", mode);
    }

    let width = ctx.text_width(&text(&options.battery, 99, 99, 100)) + ZONE_PADDING;
    let zone = ctx.alloc_zone(init.position, width);
    ctx.schedule_interval(Duration::from_millis(options.interval_ms.max(1)), true);

    Ok(Box::new(Battery {
        name: options.battery,
        path,
        zone,
        info: BatteryInfo::new(mode),
    }))
}

impl Battery {
    fn trace_status(&self) {
        let info = &self.info;
        let unit = info.mode.unit();
        log::trace!(
            "battery: {:?} {:?} {}% draw {} µ{} now {} µ{}h of {} µ{}h",
            info.mode,
            info.status,
            info.percentage,
            info.consumption,
            unit,
            info.capacity_now,
            unit,
            info.capacity_max,
            unit
        );
    }
}

impl Module for Battery {
    fn render(&mut self, ctx: &mut Context<'_>) {
        let (hours, minutes) = self.info.time_left();
        let text = text(&self.name, hours, minutes, self.info.percentage);
        let colours = ctx.colours();

        if let Some(mut draw) = ctx.draw(self.zone) {
            let (w, h) = (draw.width(), draw.height());
            draw.rect(0, 0, w, h, colours.background);
            draw.text(TEXT_INSET, 0, &text, colours.foreground);
        }
    }

    fn tick(&mut self, ctx: &mut Context<'_>) {
        let uevent = match std::fs::read_to_string(&self.path) {
            Ok(uevent) => uevent,
            Err(e) => {
                log::error!("battery: could not read {}: {}", self.path.display(), e);
                return;
            }
        };

        if self.info.update(&uevent) {
            self.trace_status();
            self.render(ctx);
        }
    }
}
