//! courier-bot - A chat bot built from a command parser and a plugin runtime

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
