//! Widgets and the table they are looked up in.
//!
//! A module is created by its descriptor's `init`, which allocates zones and
//! schedules ticks through the [`Context`] it is given. The bar owns the
//! instance and hands a fresh context to every callback.

pub mod battery;
pub mod clock;

use crate::bar::Context;
use crate::ui::zone::ZonePosition;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("unknown module '{0}'")]
    Unknown(String),

    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

pub trait Module {
    /// Redraw the module's zones from its current state
    fn render(&mut self, ctx: &mut Context<'_>);

    /// Body of the module's scheduled tasks
    fn tick(&mut self, ctx: &mut Context<'_>) {
        self.render(ctx);
    }

    /// Release what `init` acquired. Zones and tasks the module still owns
    /// afterwards are released by the bar.
    fn cleanup(&mut self, _ctx: &mut Context<'_>) {}
}

/// What `init` gets besides the context
pub struct ModuleInit<'a> {
    /// Configured name, including any `#suffix`
    pub name: &'a str,
    pub position: ZonePosition,
    pub options: &'a Map<String, Value>,
}

impl ModuleInit<'_> {
    /// Deserialize the module-specific keys of the config entry
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, ModuleError> {
        Ok(serde_json::from_value(Value::Object(self.options.clone()))?)
    }
}

pub type InitFn = fn(&mut Context<'_>, &ModuleInit<'_>) -> Result<Box<dyn Module>, ModuleError>;

pub struct ModuleDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub init: InitFn,
}

#[derive(Default)]
pub struct ModuleRegistry {
    descriptors: Vec<ModuleDescriptor>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every module shipped with the bar
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(battery::DESCRIPTOR);
        registry.register(clock::DESCRIPTOR);
        registry
    }

    pub fn register(&mut self, descriptor: ModuleDescriptor) {
        assert!(
            self.find(descriptor.name).is_none(),
            "module {} registered twice",
            descriptor.name
        );
        log::trace!("registered module {}", descriptor.name);
        self.descriptors.push(descriptor);
    }

    /// Look a module up by name. Anything from `#` on is an instance suffix,
    /// so `battery#2` finds `battery`.
    pub fn find(&self, name: &str) -> Option<&ModuleDescriptor> {
        let base = name.split_once('#').map_or(name, |(base, _)| base);
        self.descriptors.iter().find(|d| d.name == base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.descriptors.iter()
    }
}
