//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Adapters: Chat service integrations (console)

pub mod adapters;
pub mod config;
