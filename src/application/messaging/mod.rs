//! Command line handling - Tokenizing, matching and parsing commands

pub mod converters;
pub mod detector;
pub mod matcher;
pub mod parser;
pub mod suggest;
pub mod tokenizer;

pub use detector::CommandDetector;
pub use matcher::match_arguments;
pub use parser::CommandParser;
pub use tokenizer::tokenize;
