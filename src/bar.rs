//! The bar: modules, their zones, the scheduler that drives them and the
//! display session they end up on.
//!
//! Each loop iteration runs due tasks, composites if anything changed and the
//! outputs are ready for a frame, then sleeps in the session until the
//! compositor has something to say or the next task is due.

use crate::config::{Config, ModuleColours, ModuleConfig};
use crate::modules::{Module, ModuleError, ModuleInit, ModuleRegistry};
use crate::sched::{Scheduler, SchedulerError, TaskId, Timer};
use crate::signal;
use crate::ui::compositing;
use crate::ui::text_rasterizing::CosmicRasterizer;
use crate::ui::zone::{DrawSession, ZoneId, ZonePosition, Zones};
use crate::ui::{Colour, Font, FontError};
use crate::wayland::{BarGeometry, BarPosition, Session, SessionError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BarError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("could not load font: {0}")]
    Font(#[from] FontError),

    #[error("could not install signal handlers: {0}")]
    Signal(std::io::Error),
}

/// What modules may know about the bar they are on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Appearance {
    pub position: BarPosition,
    pub thickness: u32,
    pub background: Colour,
    pub foreground: Colour,
}

/// A module's colours after applying its overrides
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Colours {
    pub background: Colour,
    pub foreground: Colour,
}

impl Appearance {
    fn colours(&self, overrides: ModuleColours) -> Colours {
        Colours {
            background: overrides.background.unwrap_or(self.background),
            foreground: overrides.foreground.unwrap_or(self.foreground),
        }
    }
}

/// Index of a module instance, stable for the bar's lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

/// Scheduling as seen from a module: every task ticks the module that
/// scheduled it.
pub trait TaskQueue {
    fn tick_after(&mut self, delay: Duration, module: ModuleId) -> TaskId;
    fn tick_every(&mut self, interval: Duration, immediately: bool, module: ModuleId) -> TaskId;
    fn cancel_tick(&mut self, id: TaskId) -> bool;
}

impl<T: Timer + 'static> TaskQueue for Scheduler<Widgets, T> {
    fn tick_after(&mut self, delay: Duration, module: ModuleId) -> TaskId {
        self.delayed(delay, move |widgets: &mut Widgets, sched: &mut Self| {
            let finished = sched.current();
            widgets.tick(module, sched);
            if let Some(task) = finished {
                widgets.forget_task(module, task);
            }
        })
    }

    fn tick_every(&mut self, interval: Duration, immediately: bool, module: ModuleId) -> TaskId {
        self.interval(interval, immediately, move |widgets: &mut Widgets, sched: &mut Self| {
            widgets.tick(module, sched)
        })
    }

    fn cancel_tick(&mut self, id: TaskId) -> bool {
        self.cancel(id)
    }
}

/// Zones and tasks a module acquired through its context
#[derive(Debug, Default)]
struct Owned {
    zones: Vec<ZoneId>,
    tasks: Vec<TaskId>,
}

struct Slot {
    name: String,
    module: Option<Box<dyn Module>>,
    colours: Colours,
    owned: Owned,
}

/// The collaborator interface handed to modules
pub struct Context<'a> {
    zones: &'a mut Zones,
    font: &'a mut Font,
    appearance: &'a Appearance,
    tasks: &'a mut dyn TaskQueue,
    module: ModuleId,
    colours: Colours,
    owned: &'a mut Owned,
}

impl Context<'_> {
    /// New zone at the end of `position`'s group, filled with the module's
    /// background colour
    pub fn alloc_zone(&mut self, position: ZonePosition, width: u32) -> ZoneId {
        let id = self.zones.alloc(position, width, self.colours.background);
        self.owned.zones.push(id);
        id
    }

    pub fn destroy_zone(&mut self, id: ZoneId) -> bool {
        self.owned.zones.retain(|&zone| zone != id);
        self.zones.destroy(id)
    }

    pub fn draw(&mut self, id: ZoneId) -> Option<DrawSession<'_>> {
        self.zones.draw(id, self.font)
    }

    pub fn zone_size(&self, id: ZoneId) -> Option<(u32, u32)> {
        self.zones.get(id).map(|zone| (zone.width(), zone.height()))
    }

    pub fn text_width(&mut self, text: &str) -> u32 {
        self.font.string_width(text)
    }

    /// Tick this module once after `delay`
    pub fn schedule_delayed(&mut self, delay: Duration) -> TaskId {
        let id = self.tasks.tick_after(delay, self.module);
        self.owned.tasks.push(id);
        id
    }

    /// Tick this module every `interval`
    pub fn schedule_interval(&mut self, interval: Duration, immediately: bool) -> TaskId {
        let id = self.tasks.tick_every(interval, immediately, self.module);
        self.owned.tasks.push(id);
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.owned.tasks.retain(|&task| task != id);
        self.tasks.cancel_tick(id)
    }

    pub fn appearance(&self) -> &Appearance {
        self.appearance
    }

    pub fn colours(&self) -> Colours {
        self.colours
    }
}

/// Everything scheduled tasks may touch
pub struct Widgets {
    zones: Zones,
    font: Font,
    appearance: Appearance,
    slots: Vec<Slot>,
}

impl Widgets {
    pub fn new(appearance: Appearance, font: Font) -> Self {
        Self {
            zones: Zones::new(appearance.thickness),
            font,
            appearance,
            slots: Vec::new(),
        }
    }

    pub fn zones(&self) -> &Zones {
        &self.zones
    }

    /// Number of modules that initialised successfully and are not cleaned up
    pub fn active_modules(&self) -> usize {
        self.slots.iter().filter(|slot| slot.module.is_some()).count()
    }

    /// Create the module `config` names. On failure everything it acquired
    /// is released again.
    pub fn add_module(
        &mut self,
        registry: &ModuleRegistry,
        config: &ModuleConfig,
        position: ZonePosition,
        tasks: &mut dyn TaskQueue,
    ) -> Result<ModuleId, ModuleError> {
        let descriptor = registry
            .find(&config.name)
            .ok_or_else(|| ModuleError::Unknown(config.name.clone()))?;

        let id = ModuleId(self.slots.len());
        self.slots.push(Slot {
            name: config.name.clone(),
            module: None,
            colours: self.appearance.colours(config.colours),
            owned: Owned::default(),
        });

        let init = ModuleInit {
            name: &config.name,
            position,
            options: &config.options,
        };
        let result = {
            let mut ctx = self.context(id, tasks);
            (descriptor.init)(&mut ctx, &init)
        };

        match result {
            Ok(module) => {
                log::debug!("initialised module {} ({})", config.name, descriptor.description);
                self.slots[id.0].module = Some(module);
                Ok(id)
            }
            Err(e) => {
                self.release(id, tasks);
                Err(e)
            }
        }
    }

    fn context<'a>(&'a mut self, id: ModuleId, tasks: &'a mut dyn TaskQueue) -> Context<'a> {
        let slot = &mut self.slots[id.0];
        Context {
            zones: &mut self.zones,
            font: &mut self.font,
            appearance: &self.appearance,
            tasks,
            module: id,
            colours: slot.colours,
            owned: &mut slot.owned,
        }
    }

    /// Run a module's scheduled tick
    pub fn tick(&mut self, id: ModuleId, tasks: &mut dyn TaskQueue) {
        let Some(mut module) = self.slots.get_mut(id.0).and_then(|slot| slot.module.take()) else {
            log::warn!("tick for module #{} which is not running", id.0);
            return;
        };
        module.tick(&mut self.context(id, tasks));
        self.slots[id.0].module = Some(module);
    }

    /// A one-shot task ran and no longer needs cancelling
    fn forget_task(&mut self, id: ModuleId, task: TaskId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.owned.tasks.retain(|&owned| owned != task);
        }
    }

    /// Clean modules up, last initialised first
    pub fn cleanup(&mut self, tasks: &mut dyn TaskQueue) {
        for i in (0..self.slots.len()).rev() {
            let id = ModuleId(i);
            if let Some(mut module) = self.slots[i].module.take() {
                log::debug!("cleaning up module {}", self.slots[i].name);
                module.cleanup(&mut self.context(id, tasks));
            }
            self.release(id, tasks);
        }
    }

    fn release(&mut self, id: ModuleId, tasks: &mut dyn TaskQueue) {
        let owned = std::mem::take(&mut self.slots[id.0].owned);
        for task in owned.tasks {
            tasks.cancel_tick(task);
        }
        for zone in owned.zones {
            self.zones.destroy(zone);
        }
    }

    pub fn needs_drawing(&self) -> bool {
        self.zones.needs_drawing()
    }
}

pub struct Bar {
    widgets: Widgets,
    scheduler: Scheduler<Widgets>,
    session: Session,
}

impl Bar {
    /// Connect to the compositor, load the font and start every configured
    /// module. Modules that fail are logged and left out.
    pub fn new(config: &Config, registry: &ModuleRegistry) -> Result<Self, BarError> {
        let bar = &config.bar;
        let appearance = Appearance {
            position: bar.position,
            thickness: bar.thickness,
            background: bar.background,
            foreground: bar.foreground,
        };

        let rasterizer = CosmicRasterizer::new(bar.font.family.clone(), bar.font.file.as_deref(), bar.font.size)?;
        let font = Font::new(Box::new(rasterizer), bar.font.size);

        let session = Session::connect(BarGeometry {
            position: bar.position,
            thickness: bar.thickness,
        })?;
        let mut scheduler = Scheduler::new()?;
        let mut widgets = Widgets::new(appearance, font);

        for (position, module) in config.modules.iter() {
            if let Err(e) = widgets.add_module(registry, module, position, &mut scheduler) {
                log::error!("could not initialise module {}: {}", module.name, e);
            }
        }
        if widgets.active_modules() == 0 {
            log::warn!("no modules running, the bar will stay empty");
        }

        Ok(Self {
            widgets,
            scheduler,
            session,
        })
    }

    /// Run until the compositor goes away or a close is requested
    pub fn run(&mut self) -> Result<(), BarError> {
        signal::install_close_handlers().map_err(BarError::Signal)?;
        let result = self.event_loop();
        if let Err(e) = signal::restore_close_handlers() {
            log::warn!("could not restore signal handlers: {}", e);
        }
        result
    }

    fn event_loop(&mut self) -> Result<(), BarError> {
        while !self.session.should_close() {
            if signal::close_requested() {
                log::info!("close requested, shutting down");
                break;
            }

            self.scheduler.prepare();
            self.scheduler.run(&mut self.widgets);

            if self.widgets.needs_drawing() || self.session.needs_repaint() {
                self.composite();
            }

            self.session.pump_events(self.scheduler.poll_timeout())?;
        }
        Ok(())
    }

    /// Blit zones into every output that is ready for a frame
    fn composite(&mut self) {
        let Some(mut frame) = self.session.begin_frame() else {
            return;
        };

        let zones = &mut self.widgets.zones;
        let layout_changed = zones.take_layout_changed();
        let background = self.widgets.appearance.background.argb();
        for mut target in frame.targets() {
            let full = target.fresh || layout_changed;
            let damage = compositing::compose(zones, target.pixels, target.width, target.height, full, background);
            log::trace!("output {}: {} damaged rect(s)", target.id, damage.len());
            for rect in damage {
                target.damage(rect);
            }
        }
        drop(frame);

        zones.clear_dirty();
    }

    /// Clean modules up in reverse order, then release the timer, then the
    /// outputs and the connection.
    pub fn shutdown(self) {
        let Self {
            mut widgets,
            mut scheduler,
            session,
        } = self;
        widgets.cleanup(&mut scheduler);
        drop(scheduler);
        drop(session);
        log::info!("bye");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleDescriptor;
    use crate::sched::tests::ManualTimer;
    use crate::ui::font::tests::box_font;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::rc::Rc;

    thread_local! {
        static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn record(event: String) {
        EVENTS.with(|events| events.borrow_mut().push(event));
    }

    fn events() -> Vec<String> {
        EVENTS.with(|events| events.borrow_mut().drain(..).collect())
    }

    /// Allocates a zone, ticks every 100ms and paints it in its foreground
    struct Painter {
        name: String,
        zone: ZoneId,
        ticks: Rc<Cell<u32>>,
    }

    impl Module for Painter {
        fn render(&mut self, ctx: &mut Context<'_>) {
            let colour = ctx.colours().foreground;
            if let Some(mut draw) = ctx.draw(self.zone) {
                let (w, h) = (draw.width(), draw.height());
                draw.rect(0, 0, w, h, colour);
            }
        }

        fn tick(&mut self, ctx: &mut Context<'_>) {
            self.ticks.set(self.ticks.get() + 1);
            self.render(ctx);
        }

        fn cleanup(&mut self, _: &mut Context<'_>) {
            record(format!("cleanup {}", self.name));
        }
    }

    thread_local! {
        static TICKS: Rc<Cell<u32>> = Rc::new(Cell::new(0));
    }

    fn painter_init(ctx: &mut Context<'_>, init: &ModuleInit<'_>) -> Result<Box<dyn Module>, ModuleError> {
        let zone = ctx.alloc_zone(init.position, 10);
        ctx.schedule_interval(Duration::from_millis(100), true);
        Ok(Box::new(Painter {
            name: init.name.to_string(),
            zone,
            ticks: TICKS.with(Rc::clone),
        }))
    }

    /// Ticks once after 10ms and again 10ms after every tick
    struct Rearm;

    impl Module for Rearm {
        fn render(&mut self, _: &mut Context<'_>) {}

        fn tick(&mut self, ctx: &mut Context<'_>) {
            ctx.schedule_delayed(Duration::from_millis(10));
        }
    }

    fn rearm_init(ctx: &mut Context<'_>, _: &ModuleInit<'_>) -> Result<Box<dyn Module>, ModuleError> {
        ctx.schedule_delayed(Duration::from_millis(10));
        Ok(Box::new(Rearm))
    }

    fn broken_init(ctx: &mut Context<'_>, _: &ModuleInit<'_>) -> Result<Box<dyn Module>, ModuleError> {
        ctx.alloc_zone(ZonePosition::Left, 50);
        ctx.schedule_delayed(Duration::from_millis(5));
        Err(ModuleError::Failed("no hardware".to_string()))
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(ModuleDescriptor {
            name: "painter",
            description: "test module",
            init: painter_init,
        });
        registry.register(ModuleDescriptor {
            name: "broken",
            description: "always fails",
            init: broken_init,
        });
        registry.register(ModuleDescriptor {
            name: "rearm",
            description: "one-shot ticks",
            init: rearm_init,
        });
        registry
    }

    fn widgets() -> Widgets {
        let appearance = Appearance {
            position: BarPosition::Top,
            thickness: 20,
            background: Colour::rgb(0, 0, 0),
            foreground: Colour::rgb(255, 255, 255),
        };
        Widgets::new(appearance, box_font(7))
    }

    #[test]
    fn test_module_colours() {
        let mut widgets = widgets();
        let mut sched = Scheduler::with_timer(ManualTimer::new());
        let mut config = ModuleConfig::named("painter#red");
        config.colours.background = Some(Colour::rgb(255, 0, 0));

        widgets
            .add_module(&registry(), &config, ZonePosition::Right, &mut sched)
            .unwrap();
        let (_, zone) = widgets.zones().group(ZonePosition::Right).next().unwrap();
        assert_eq!(zone.pixels()[0], Colour::rgb(255, 0, 0).argb());
    }

    #[test]
    fn test_unknown_module() {
        let mut widgets = widgets();
        let mut sched = Scheduler::with_timer(ManualTimer::new());
        let result = widgets.add_module(&registry(), &ModuleConfig::named("nope"), ZonePosition::Left, &mut sched);
        assert!(matches!(result, Err(ModuleError::Unknown(name)) if name == "nope"));
        assert_eq!(widgets.active_modules(), 0);
    }

    #[test]
    fn test_failed_init_releases_resources() {
        let mut widgets = widgets();
        let mut sched = Scheduler::with_timer(ManualTimer::new());
        let result = widgets.add_module(&registry(), &ModuleConfig::named("broken"), ZonePosition::Left, &mut sched);
        assert!(matches!(result, Err(ModuleError::Failed(_))));
        assert!(widgets.zones().is_empty());
        assert!(sched.is_empty());

        // The bar keeps going with the rest
        widgets
            .add_module(&registry(), &ModuleConfig::named("painter"), ZonePosition::Left, &mut sched)
            .unwrap();
        assert_eq!(widgets.active_modules(), 1);
        assert_eq!(widgets.zones().group_width(ZonePosition::Left), 10);
    }

    #[test]
    fn test_ticks_draw_and_cleanup() {
        let mut widgets = widgets();
        let mut sched = Scheduler::with_timer(ManualTimer::new());
        let registry = registry();
        widgets
            .add_module(&registry, &ModuleConfig::named("painter#a"), ZonePosition::Left, &mut sched)
            .unwrap();
        widgets
            .add_module(&registry, &ModuleConfig::named("painter#b"), ZonePosition::Right, &mut sched)
            .unwrap();
        widgets.zones.take_layout_changed();
        widgets.zones.clear_dirty();
        assert!(!widgets.needs_drawing());

        let ticks = TICKS.with(Rc::clone);
        ticks.set(0);
        sched.prepare();
        sched.run(&mut widgets);
        assert_eq!(ticks.get(), 2);
        assert!(widgets.needs_drawing());
        let (_, zone) = widgets.zones().group(ZonePosition::Left).next().unwrap();
        assert_eq!(zone.pixels()[0], Colour::rgb(255, 255, 255).argb());

        sched.timer().set_ms(100);
        sched.prepare();
        sched.run(&mut widgets);
        assert_eq!(ticks.get(), 4);

        events();
        widgets.cleanup(&mut sched);
        assert_eq!(events(), vec!["cleanup painter#b", "cleanup painter#a"]);
        assert!(widgets.zones().is_empty());
        assert!(sched.is_empty());
        assert_eq!(widgets.active_modules(), 0);
    }

    #[test]
    fn test_finished_one_shot_tasks_are_forgotten() {
        let mut widgets = widgets();
        let mut sched = Scheduler::with_timer(ManualTimer::new());
        let id = widgets
            .add_module(&registry(), &ModuleConfig::named("rearm"), ZonePosition::Left, &mut sched)
            .unwrap();

        for i in 1..=1000u64 {
            sched.timer().set_ms(i * 10);
            sched.prepare();
            sched.run(&mut widgets);
        }
        assert_eq!(widgets.slots[id.0].owned.tasks.len(), 1);
        assert_eq!(sched.len(), 1);

        widgets.cleanup(&mut sched);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_battery_redraws_only_on_change() {
        let mut uevent = tempfile::NamedTempFile::new().unwrap();
        uevent
            .write_all(b"POWER_SUPPLY_STATUS=Discharging\nPOWER_SUPPLY_CAPACITY=80\n")
            .unwrap();
        let mut config = ModuleConfig::named("battery");
        config.options.insert(
            "path".to_string(),
            serde_json::Value::from(uevent.path().to_str().unwrap()),
        );

        let mut widgets = widgets();
        let mut sched = Scheduler::with_timer(ManualTimer::new());
        widgets
            .add_module(&ModuleRegistry::builtin(), &config, ZonePosition::Right, &mut sched)
            .unwrap();
        // Widest text is "BAT1: 99:99 left", 16 boxes of 7px, plus padding
        assert_eq!(widgets.zones().group_width(ZonePosition::Right), 16 * 7 + 8);

        widgets.zones.take_layout_changed();
        widgets.zones.clear_dirty();
        sched.prepare();
        sched.run(&mut widgets);
        assert!(widgets.needs_drawing());

        widgets.zones.clear_dirty();
        sched.timer().set_ms(1000);
        sched.prepare();
        sched.run(&mut widgets);
        assert!(!widgets.needs_drawing());
    }
}
