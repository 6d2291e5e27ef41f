//! Plugin system - hot-loadable cogs
//!
//! A cog is a dynamically loaded unit exporting commands, aliases, event
//! hooks and lifecycle hooks. The registry tracks load state per unit and
//! the wheel task discovers and reloads units while the bot runs.

pub mod base;
pub mod cog;
pub mod loader;
pub mod registry;
pub mod wheel;

pub use base::BaseCog;
pub use cog::{Cog, CogModule, ConfigFormat, Context};
pub use loader::{CogLoader, LibCogLoader, ModuleHandle};
pub use registry::{CogState, PluginRegistry, SharedRegistry};
pub use wheel::Wheel;
