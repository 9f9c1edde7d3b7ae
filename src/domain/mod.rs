//! Domain layer - Core business logic with no external dependencies
//! 
//! This layer contains:
//! - Entities: Core business objects (Token, SubcommandSpec, Event, Response)
//! - Traits: Abstractions for infrastructure (Bot)

pub mod entities;
pub mod traits;
