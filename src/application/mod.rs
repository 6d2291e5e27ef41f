//! Application layer - Use cases and orchestration
//!
//! This layer contains:
//! - Errors: Per-layer error types
//! - Messaging: Tokenizer, argument binder and dispatcher
//! - Guilds: Lazy per-guild context cache backed by the store

pub mod errors;
pub mod guilds;
pub mod messaging;
