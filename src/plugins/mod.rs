//! Plugin runtime for courier-bot
//!
//! Plugins are started in dependency order and fed from a single event
//! queue. Each one runs inline on the loop, on its own thread, or in a
//! child process.

pub mod builtin;
pub mod command;
pub mod context;
pub mod manager;
pub mod process;
pub mod resolver;
pub mod runtime;
pub mod trait_def;
pub mod worker;

pub use command::CommandPlugin;
pub use context::{LoopbackSender, PluginContext, Privileges};
pub use manager::{ManagerSettings, PluginManager};
pub use runtime::{LoopExit, LoopState, Runtime, RuntimeHandle, RuntimeSettings};
pub use trait_def::{ConcurrencyMode, Plugin, PluginDescriptor};
