//! Domain entities - Core business objects

pub mod command;
pub mod guild;
pub mod message;
pub mod user;

pub use command::{
    is_valid, ArgType, ArgValue, ArityMode, Bound, CommandSpec, CommandTable, Hint,
};
pub use guild::{GuildContext, GuildSettings, BASE_COG};
pub use message::{Capabilities, Incoming, Message};
pub use user::User;
