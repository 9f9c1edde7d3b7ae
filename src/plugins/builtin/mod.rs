//! Builtin plugins shipped with the bot

pub mod echo;
pub mod help;
pub mod ping;
pub mod plugins;
pub mod restart;

use crate::plugins::trait_def::PluginDescriptor;

/// Every builtin, in declaration order
pub fn descriptors() -> Vec<PluginDescriptor> {
    vec![
        ping::descriptor(),
        echo::descriptor(),
        restart::descriptor(),
        plugins::descriptor(),
        help::descriptor(),
    ]
}
