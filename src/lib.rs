//! cogwheel - command dispatch and hot-reloadable plugin engine for chat bots

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
