//! Domain layer - Core business objects with no external dependencies
//!
//! This layer contains:
//! - Entities: Core business objects (User, Message, CommandSpec, GuildContext)
//! - Traits: Abstractions for infrastructure (ChatPort, Store)

pub mod entities;
pub mod traits;
