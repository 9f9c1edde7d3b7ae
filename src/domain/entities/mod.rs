//! Domain entities - Core business objects with no external dependencies

pub mod command;
pub mod event;
pub mod invocation;
pub mod message;
pub mod response;
pub mod token;
pub mod user;

pub use command::{
    ArgMode, ArgSpec, CommandMetadata, Converter, ItemPrivilege, OptionSpec, Privilege,
    SubcommandMetadata, SubcommandSpec,
};
pub use event::{Event, EventKind, ROOT_SENDER};
pub use invocation::ParsedInvocation;
pub use message::{ChatMessage, MessageType};
pub use response::{Outcome, Recipient, Response};
pub use token::{Token, TokenKind};
pub use user::User;
