//! The cog model: what a plugin unit exports and what its commands receive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::errors::{CommandError, PluginError};
use crate::domain::entities::{Capabilities, CommandSpec, CommandTable, GuildContext, Message};

/// Config file formats a cog can declare for its own settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
        }
    }
}

/// Typed context passed to every command and event handler. Commands take
/// from it only the fields they need; the platform adapter fills the
/// capability sets before dispatch.
pub struct Context<'a> {
    pub message: &'a Message,
    pub caps: &'a Capabilities,
    pub guild: &'a Mutex<GuildContext>,
    pub cogs: &'a crate::plugins::registry::PluginRegistry,
}

impl Context<'_> {
    /// Lock the guild context for reading or mutation
    pub fn guild(&self) -> MutexGuard<'_, GuildContext> {
        self.guild.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handler for a platform-level event hook
pub type EventFn =
    Arc<dyn Fn(&Context) -> Result<Option<String>, CommandError> + Send + Sync>;

/// A loaded cog: its command and alias tables, event hooks and configuration
pub struct Cog {
    /// Dot-separated qualified name
    pub name: String,
    pub table: CommandTable,
    events: HashMap<String, Vec<EventFn>>,
    /// Cog-specific configuration, loaded before init and saved after exit
    pub config: serde_json::Value,
    format: Option<ConfigFormat>,
}

impl Cog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: CommandTable::new(),
            events: HashMap::new(),
            config: serde_json::Value::Null,
            format: None,
        }
    }

    pub fn set_config_format(&mut self, format: Option<ConfigFormat>) {
        self.format = format;
    }

    pub fn register(&mut self, spec: CommandSpec) {
        self.table.register(spec);
    }

    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.table.alias(alias, target);
    }

    pub fn hide(&mut self, name: impl Into<String>) {
        self.table.hide(name);
    }

    /// Register a handler for a named platform event
    pub fn on_event<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Context) -> Result<Option<String>, CommandError> + Send + Sync + 'static,
    {
        self.events
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn event_handlers(&self, event: &str) -> &[EventFn] {
        self.events.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    fn config_path(&self, config_dir: &Path) -> Option<PathBuf> {
        let format = self.format?;
        Some(config_dir.join(format!("{}.{}", self.name, format.extension())))
    }

    /// Read the cog's config file in its declared format; a missing file is
    /// only a warning
    pub fn load_config(&mut self, config_dir: &Path) -> Result<(), PluginError> {
        let Some(path) = self.config_path(config_dir) else {
            return Ok(());
        };
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("no config file at {} for cog {}", path.display(), self.name);
                return Ok(());
            }
            Err(err) => return Err(PluginError::Open(err.to_string())),
        };
        self.config = match self.format {
            Some(ConfigFormat::Json) => serde_json::from_str(&raw)
                .map_err(|e| PluginError::Open(format!("{}: {}", path.display(), e)))?,
            Some(ConfigFormat::Yaml) => serde_yaml::from_str(&raw)
                .map_err(|e| PluginError::Open(format!("{}: {}", path.display(), e)))?,
            None => serde_json::Value::Null,
        };
        Ok(())
    }

    /// Write the cog's config back in its declared format
    pub fn save_config(&self, config_dir: &Path) -> Result<(), PluginError> {
        let Some(path) = self.config_path(config_dir) else {
            return Ok(());
        };
        if self.config.is_null() {
            return Ok(());
        }
        let raw = match self.format {
            Some(ConfigFormat::Json) => serde_json::to_string_pretty(&self.config)
                .map_err(|e| PluginError::Open(e.to_string()))?,
            Some(ConfigFormat::Yaml) => serde_yaml::to_string(&self.config)
                .map_err(|e| PluginError::Open(e.to_string()))?,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PluginError::Open(e.to_string()))?;
        }
        std::fs::write(&path, raw).map_err(|e| PluginError::Open(e.to_string()))
    }
}

/// The object every plugin unit exports. `setup` registers commands, aliases
/// and event hooks into a fresh `Cog`; the lifecycle hooks bracket the
/// unit's time in the registry.
pub trait CogModule: Send + Sync {
    /// Self-chosen name, overriding the filesystem-derived one
    fn name_override(&self) -> Option<&str> {
        None
    }

    /// Format of the cog's own config file, if it has one
    fn config_format(&self) -> Option<ConfigFormat> {
        None
    }

    fn setup(&self, cog: &mut Cog);

    fn on_init(&self, _cog: &Cog) {}

    fn on_exit(&self, _cog: &Cog) {}
}
