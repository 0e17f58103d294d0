//! Configuration file: `$XDG_CONFIG_HOME/gaybar/config.jsonc`.
//!
//! Plain JSON plus `//` and `/* */` comments. Every key is optional.
//!
//! ```jsonc
//! {
//!   "bar": {
//!     "position": "top",
//!     "thickness": 32,
//!     "background": "#1E1E1E",
//!     "foreground": "#D0D0D0",
//!     "font": { "family": "Iosevka", "size": 14 }
//!   },
//!   "modules": {
//!     "right": [
//!       { "name": "battery", "battery": "BAT1", "colors": { "background": "#FFFF00" } },
//!       "clock"
//!     ]
//!   }
//! }
//! ```

use crate::ui::theme;
use crate::ui::zone::ZonePosition;
use crate::ui::Colour;
use crate::wayland::BarPosition;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_PATH: &str = "gaybar/config.jsonc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bar: BarConfig,
    pub modules: ModulesConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BarConfig {
    pub position: BarPosition,
    pub thickness: u32,
    pub background: Colour,
    pub foreground: Colour,
    pub font: FontConfig,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            position: BarPosition::Top,
            thickness: theme::THICKNESS,
            background: theme::BACKGROUND,
            foreground: theme::FOREGROUND,
            font: FontConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Family name looked up in the system font database
    pub family: Option<String>,
    /// Font file loaded on top of the system fonts
    pub file: Option<PathBuf>,
    /// Pixel size
    pub size: u32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: None,
            file: None,
            size: theme::FONT_SIZE,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub left: Vec<ModuleConfig>,
    pub center: Vec<ModuleConfig>,
    pub right: Vec<ModuleConfig>,
}

impl ModulesConfig {
    /// Every configured module with its position, left to right
    pub fn iter(&self) -> impl Iterator<Item = (ZonePosition, &ModuleConfig)> {
        let left = self.left.iter().map(|m| (ZonePosition::Left, m));
        let center = self.center.iter().map(|m| (ZonePosition::Center, m));
        let right = self.right.iter().map(|m| (ZonePosition::Right, m));
        left.chain(center).chain(right)
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.center.is_empty() && self.right.is_empty()
    }
}

/// Colours overriding the bar's for one module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleColours {
    pub background: Option<Colour>,
    pub foreground: Option<Colour>,
}

/// One module entry: either a bare name or an object with a `name` key.
/// Keys other than `name` and `colors` belong to the module.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct ModuleConfig {
    pub name: String,
    pub colours: ModuleColours,
    pub options: Map<String, Value>,
}

impl ModuleConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            colours: ModuleColours::default(),
            options: Map::new(),
        }
    }
}

impl TryFrom<Value> for ModuleConfig {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut options = match value {
            Value::String(name) => return Ok(Self::named(name)),
            Value::Object(map) => map,
            other => return Err(format!("module entry must be a name or an object, got {}", other)),
        };

        let name = match options.remove("name") {
            Some(Value::String(name)) => name,
            Some(other) => return Err(format!("module name must be a string, got {}", other)),
            None => return Err("module entry has no \"name\"".to_string()),
        };
        let colours = match options.remove("colors") {
            Some(value) => serde_json::from_value(value).map_err(|e| format!("module {}: {}", name, e))?,
            None => ModuleColours::default(),
        };

        Ok(Self {
            name,
            colours,
            options,
        })
    }
}

impl Config {
    /// Load `path`, or the default location when `None`. A missing default
    /// file means built-in defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => {
                    log::info!("could not find config file, running with default options");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(&strip_comments(text)).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bar.thickness == 0 {
            return Err(ConfigError::Invalid("bar.thickness must be greater than 0".to_string()));
        }
        if self.bar.font.size == 0 {
            return Err(ConfigError::Invalid("bar.font.size must be greater than 0".to_string()));
        }
        if let Some((_, module)) = self.modules.iter().find(|(_, m)| m.name.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "module with empty name (options: {:?})",
                module.options
            )));
        }
        Ok(())
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_PATH))
}

/// Remove `//` and `/* */` comments, leaving string literals alone. Newlines
/// inside comments are kept so parse errors point at the right line.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_strip_comments() {
        let text = "{\n  // line\n  \"a\": \"// not a comment\", /* block\n */ \"b\": \"\\\"/*\"\n}";
        assert_eq!(
            strip_comments(text),
            "{\n  \n  \"a\": \"// not a comment\", \n  \"b\": \"\\\"/*\"\n}"
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.bar.position, BarPosition::Top);
        assert_eq!(config.bar.thickness, theme::THICKNESS);
        assert_eq!(config.bar.background, theme::BACKGROUND);
        assert_eq!(config.bar.font.size, theme::FONT_SIZE);
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r##"{
                // Dock at the bottom
                "bar": {
                    "position": "bottom",
                    "thickness": 24,
                    "background": "#000000",
                    "font": { "family": "Iosevka", "size": 12 }
                },
                "modules": {
                    "left": ["clock"],
                    "right": [
                        { "name": "battery#2", "battery": "BAT1", "colors": { "foreground": "#FF0000" } }
                    ]
                }
            }"##,
        )
        .unwrap();

        assert_eq!(config.bar.position, BarPosition::Bottom);
        assert_eq!(config.bar.thickness, 24);
        assert_eq!(config.bar.background, Colour::rgb(0, 0, 0));
        assert_eq!(config.bar.foreground, theme::FOREGROUND);
        assert_eq!(config.bar.font.family.as_deref(), Some("Iosevka"));

        let modules: Vec<_> = config.modules.iter().collect();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0], (ZonePosition::Left, &ModuleConfig::named("clock")));

        let (position, battery) = modules[1];
        assert_eq!(position, ZonePosition::Right);
        assert_eq!(battery.name, "battery#2");
        assert_eq!(battery.colours.foreground, Some(Colour::rgb(255, 0, 0)));
        assert_eq!(battery.colours.background, None);
        assert_eq!(battery.options.get("battery"), Some(&Value::from("BAT1")));
        assert!(!battery.options.contains_key("colors"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::parse(r#"{"bar": {"thickness": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse(r#"{"bar": {"font": {"size": 0}}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse(r#"{"bar": {"background": "red"}}"#),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::parse(r#"{"modules": {"left": [{"colors": {}}]}}"#),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::parse(r##"{"modules": {"left": [{"name": "clock", "colors": {"foreground": "#12"}}]}}"##),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ /* tiny */ \"bar\": {{ \"thickness\": 20 }} }}").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.bar.thickness, 20);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.jsonc");
        match Config::load(Some(&missing)) {
            Err(ConfigError::Read { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected read error, got {:?}", other),
        }

        let broken = dir.path().join("broken.jsonc");
        std::fs::write(&broken, "{ \"bar\": ").unwrap();
        match Config::load(Some(&broken)) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, broken),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
