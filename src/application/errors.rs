//! Application layer errors

use thiserror::Error;

/// Command line parse errors; always reported back to the user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No command given")]
    Empty,

    #[error("Unterminated quote starting at position {0}")]
    UnterminatedQuote(usize),

    #[error("Unterminated code block starting at position {0}")]
    UnterminatedCodeBlock(usize),

    #[error("Unexpected character `{found}` after closing quote at position {position}")]
    TrailingQuote { position: usize, found: char },

    #[error("Invalid escape sequence `{0}`")]
    InvalidEscape(String),

    #[error("No subcommands specified that can be parsed")]
    NoSubcommands,

    #[error("Subcommand `{name}` not found. {hint}")]
    UnknownSubcommand { name: String, hint: String },

    #[error("Invalid option `{0}` for subcommand")]
    UnknownOption(String),

    #[error("Option `{0}` does not take a value")]
    UnexpectedValue(String),

    #[error("Could not parse option `{option}`: {reason}")]
    InvalidOptionValue { option: String, reason: String },

    #[error("Positional argument `{0}` not found")]
    MissingArgument(String),

    #[error("At least one argument is required for `{0}`")]
    EmptyGreedy(String),

    #[error("Too many arguments for subcommand `{subcommand}`. Remaining: {remainder:?}")]
    TooManyArguments {
        subcommand: String,
        remainder: Vec<String>,
    },
}

/// Illegal subcommand declarations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Subcommand name must not be empty")]
    EmptyName,

    #[error("Invalid option key `{0}`")]
    InvalidOptionKey(char),

    #[error("Option `{0}` declared twice")]
    DuplicateOption(String),

    #[error("Argument `{0}` declared twice")]
    DuplicateArgument(String),

    #[error("Subcommand `{0}` declares more than one greedy argument")]
    MultipleGreedy(String),
}

/// Plugin dependency graph errors; fatal at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Plugin `{plugin}` depends on unknown plugin `{dependency}`")]
    Unknown { plugin: String, dependency: String },

    #[error("Plugin `{0}` appears twice")]
    Duplicate(String),
}

/// Handler-time errors, confined to the failing plugin
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("{0}")]
    Privilege(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Plugin unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bot error: {0}")]
    Bot(#[from] BotError),
}

/// Runtime lifecycle errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Plugin `{name}` failed to start: {source}")]
    Plugin {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("Failed to spawn worker for `{name}`: {reason}")]
    Spawn { name: String, reason: String },

    #[error("Plugin `{0}` not found")]
    NotFound(String),

    #[error("Event queue closed")]
    QueueClosed,

    #[error("Event queue full")]
    QueueFull,
}

/// Outbound chat service errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
