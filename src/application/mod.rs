//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Commands built from subcommand handlers
//! - Errors: Domain-specific errors
//! - Messaging: Tokenizing, parsing and detecting commands

pub mod errors;
pub mod messaging;
pub mod services;
