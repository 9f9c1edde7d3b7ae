//! Application services - Business logic orchestration

pub mod command_service;

pub use command_service::{CommandRequest, CommandService, HandlerResult};
