//! Adapters - Chat service integrations

pub mod console;

pub use console::ConsoleAdapter;
