//! Domain traits - Abstractions for infrastructure implementations

pub mod chat;
pub mod store;

pub use chat::{BotIdentity, ChatPort};
pub use store::Store;
