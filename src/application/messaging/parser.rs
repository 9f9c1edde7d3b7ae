//! Command parser - Parses a command line against registered subcommands

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::matcher::match_arguments;
use super::suggest::{did_you_mean, suggest};
use super::tokenizer::tokenize;
use crate::application::errors::{ParseError, SpecError};
use crate::domain::entities::{
    CommandMetadata, OptionSpec, ParsedInvocation, SubcommandSpec, Token,
};

/// Shell-like parser for one command's subcommands.
///
/// Options precede arguments: scanning stops at the first token that does
/// not start with `-`, everything after it is matched against argument
/// slots. Short options take their value either attached (`-n3`) or as
/// the next token (`-n 3`); long options use `--name` or `--name=value`.
/// A bare `--` ends the options.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    subcommands: Vec<SubcommandSpec>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subcommand, replacing one with the same name
    pub fn add_subcommand(&mut self, spec: SubcommandSpec) -> Result<(), SpecError> {
        spec.validate()?;
        match self.subcommands.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.subcommands.push(spec),
        }
        Ok(())
    }

    /// Builder form of `add_subcommand`
    pub fn with_subcommand(mut self, spec: SubcommandSpec) -> Result<Self, SpecError> {
        self.add_subcommand(spec)?;
        Ok(self)
    }

    pub fn subcommands(&self) -> &[SubcommandSpec] {
        &self.subcommands
    }

    pub fn subcommand(&self, name: &str) -> Option<&SubcommandSpec> {
        self.subcommands.iter().find(|s| s.name == name)
    }

    /// Metadata of every registered subcommand under `command`
    pub fn metadata(&self, command: &str) -> CommandMetadata {
        self.subcommands
            .iter()
            .fold(CommandMetadata::new(command), |meta, spec| {
                meta.with_subcommand(spec.metadata())
            })
    }

    /// Names close to a mistyped subcommand
    pub fn suggest(&self, name: &str) -> Vec<String> {
        suggest(name, self.subcommands.iter().map(|s| s.name.as_str()))
    }

    /// Parse a command line; the first token names the subcommand
    pub fn parse(&self, raw: &str) -> Result<ParsedInvocation, ParseError> {
        if self.subcommands.is_empty() {
            return Err(ParseError::NoSubcommands);
        }

        let tokens = tokenize(raw)?;
        debug!("Tokens: {:?}", tokens);

        let name = tokens[0].text.as_str();
        let spec = self.subcommand(name).ok_or_else(|| self.unknown(name))?;

        let (opts, rest) = parse_options(spec, &tokens[1..])?;
        let args = match_arguments(spec, rest)?;

        let aliases = spec
            .opts
            .iter()
            .filter_map(|o| o.long.clone().map(|long| (long, o.key_str())))
            .collect();

        Ok(ParsedInvocation {
            subcommand: spec.name.clone(),
            opts,
            args,
            aliases,
        })
    }

    fn unknown(&self, name: &str) -> ParseError {
        let hint = did_you_mean(&self.suggest(name)).unwrap_or_else(|| {
            let names: Vec<&str> = self.subcommands.iter().map(|s| s.name.as_str()).collect();
            format!("Available subcommands: {}", names.join(", "))
        });
        ParseError::UnknownSubcommand {
            name: name.to_string(),
            hint,
        }
    }
}

/// Consume the leading option tokens; returns the options and the tokens
/// left for argument matching
fn parse_options<'a>(
    spec: &SubcommandSpec,
    tokens: &'a [Token],
) -> Result<(BTreeMap<String, Value>, &'a [Token]), ParseError> {
    let mut opts = BTreeMap::new();
    let mut i = 0;

    while i < tokens.len() {
        let text = tokens[i].text.as_str();
        if text == "--" {
            i += 1;
            break;
        }

        let (opt, shown, attached) = if let Some(long) = text.strip_prefix("--") {
            let (name, value) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (long, None),
            };
            let opt = spec
                .option_by_long(name)
                .ok_or_else(|| ParseError::UnknownOption(format!("--{}", name)))?;
            (opt, format!("--{}", name), value)
        } else if let Some(short) = text.strip_prefix('-').filter(|s| !s.is_empty()) {
            let mut chars = short.chars();
            let key = chars.next().unwrap_or_default();
            let opt = spec
                .option(key)
                .ok_or_else(|| ParseError::UnknownOption(format!("-{}", key)))?;
            let rest = chars.as_str();
            (opt, format!("-{}", key), (!rest.is_empty()).then_some(rest))
        } else {
            break;
        };
        i += 1;

        let value = match &opt.converter {
            None => {
                if attached.is_some() {
                    return Err(ParseError::UnexpectedValue(shown));
                }
                Value::Bool(true)
            }
            Some(conv) => {
                let raw = match attached {
                    Some(v) => v,
                    None => {
                        let next = tokens.get(i).map(|t| t.text.as_str()).unwrap_or("");
                        i += 1;
                        next
                    }
                };
                conv.convert(raw)
                    .map_err(|reason| ParseError::InvalidOptionValue {
                        option: shown,
                        reason,
                    })?
            }
        };
        opts.insert(opt.key_str(), value);
    }

    for opt in &spec.opts {
        opts.entry(opt.key_str()).or_insert_with(|| default_value(opt));
    }

    Ok((opts, &tokens[i.min(tokens.len())..]))
}

fn default_value(opt: &OptionSpec) -> Value {
    if opt.is_flag() {
        Value::Bool(false)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::converters::{emoji, integer, or_default, string};
    use crate::domain::entities::{ArgSpec, OptionSpec};
    use serde_json::json;

    fn group_parser() -> CommandParser {
        CommandParser::new()
            .with_subcommand(
                SubcommandSpec::new("add")
                    .arg(ArgSpec::positional("name", string()))
                    .arg(ArgSpec::positional("emoji", emoji())),
            )
            .unwrap()
            .with_subcommand(
                SubcommandSpec::new("archive")
                    .opt(OptionSpec::flag('r').with_long("recursive"))
                    .arg(ArgSpec::greedy("channels", string())),
            )
            .unwrap()
    }

    fn todo_parser() -> CommandParser {
        CommandParser::new()
            .with_subcommand(
                SubcommandSpec::new("test")
                    .opt(OptionSpec::flag('a'))
                    .opt(OptionSpec::valued('b', string()).with_long("bee"))
                    .opt(OptionSpec::valued('n', integer()))
                    .arg(ArgSpec::positional("arg1", string())),
            )
            .unwrap()
    }

    #[test]
    fn test_quoted_name_and_emoji() {
        let parsed = group_parser().parse("add 'my group' :smile:").unwrap();
        assert_eq!(parsed.subcommand, "add");
        assert_eq!(parsed.arg_str("name"), Some("my group"));
        assert_eq!(parsed.arg_str("emoji"), Some("smile"));
    }

    #[test]
    fn test_flag_and_greedy() {
        let parsed = group_parser().parse("archive -r foo bar").unwrap();
        assert!(parsed.flag("r"));
        assert!(parsed.flag("recursive"));
        assert_eq!(parsed.arg_strings("channels"), vec!["foo", "bar"]);

        let parsed = group_parser().parse("archive").unwrap();
        assert!(!parsed.flag("r"));
        assert!(parsed.arg_list("channels").is_empty());
    }

    #[test]
    fn test_valued_option_takes_next_token() {
        let parsed = todo_parser().parse("test -a -b c d").unwrap();
        assert!(parsed.flag("a"));
        assert_eq!(parsed.opt_str("b"), Some("c"));
        assert_eq!(parsed.arg_str("arg1"), Some("d"));
        assert_eq!(parsed.opt("n"), Some(&Value::Null));
    }

    #[test]
    fn test_attached_and_long_values() {
        let parsed = todo_parser().parse("test -n42 -bx y").unwrap();
        assert_eq!(parsed.opt_i64("n"), Some(42));
        assert_eq!(parsed.opt_str("b"), Some("x"));

        let parsed = todo_parser().parse("test --bee=z y").unwrap();
        assert_eq!(parsed.opt_str("bee"), Some("z"));
        assert_eq!(parsed.opt_str("b"), Some("z"));
    }

    #[test]
    fn test_options_first() {
        // After the first argument, `-a` is just another argument.
        assert!(matches!(
            todo_parser().parse("test d -a"),
            Err(ParseError::TooManyArguments { .. })
        ));
        let parsed = todo_parser().parse("test -- -a").unwrap();
        assert_eq!(parsed.arg_str("arg1"), Some("-a"));
    }

    #[test]
    fn test_escaped_dash_is_argument() {
        let parsed = todo_parser().parse(r"test \\-b").unwrap();
        assert_eq!(parsed.arg_str("arg1"), Some("-b"));
        assert_eq!(parsed.opt("b"), Some(&Value::Null));
    }

    #[test]
    fn test_option_errors() {
        assert_eq!(
            todo_parser().parse("test -x d"),
            Err(ParseError::UnknownOption("-x".to_string()))
        );
        assert_eq!(
            todo_parser().parse("test -afoo d"),
            Err(ParseError::UnexpectedValue("-a".to_string()))
        );
        assert!(matches!(
            todo_parser().parse("test -n abc d"),
            Err(ParseError::InvalidOptionValue { .. })
        ));
    }

    #[test]
    fn test_repeated_flag_is_idempotent() {
        let parsed = todo_parser().parse("test -a -a d").unwrap();
        assert!(parsed.flag("a"));
    }

    #[test]
    fn test_valued_option_without_value() {
        let parser = CommandParser::new()
            .with_subcommand(
                SubcommandSpec::new("show")
                    .opt(OptionSpec::valued('l', or_default(integer(), json!(10)))),
            )
            .unwrap();
        assert_eq!(parser.parse("show -l").unwrap().opt_i64("l"), Some(10));
        assert_eq!(parser.parse("show -l 3").unwrap().opt_i64("l"), Some(3));
    }

    #[test]
    fn test_missing_and_extra_arguments() {
        assert_eq!(
            todo_parser().parse("test"),
            Err(ParseError::MissingArgument("arg1".to_string()))
        );
        assert!(matches!(
            todo_parser().parse("test a b"),
            Err(ParseError::TooManyArguments { remainder, .. }) if remainder == vec!["b"]
        ));
    }

    #[test]
    fn test_unknown_subcommand_hint() {
        match group_parser().parse("ad x :y:") {
            Err(ParseError::UnknownSubcommand { name, hint }) => {
                assert_eq!(name, "ad");
                assert_eq!(hint, "Did you mean `add`?");
            }
            other => panic!("unexpected: {:?}", other),
        }
        match group_parser().parse("zzzzzzzz") {
            Err(ParseError::UnknownSubcommand { hint, .. }) => {
                assert_eq!(hint, "Available subcommands: add, archive");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_parser_and_input() {
        assert_eq!(CommandParser::new().parse("x"), Err(ParseError::NoSubcommands));
        assert_eq!(group_parser().parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut parser = group_parser();
        parser
            .add_subcommand(SubcommandSpec::new("add").arg(ArgSpec::positional("only", string())))
            .unwrap();
        assert_eq!(parser.subcommands().len(), 2);
        let parsed = parser.parse("add x").unwrap();
        assert_eq!(parsed.arg_str("only"), Some("x"));
    }

    #[test]
    fn test_invalid_declaration() {
        let mut parser = CommandParser::new();
        let spec = SubcommandSpec::new("x")
            .arg(ArgSpec::greedy("a", string()))
            .arg(ArgSpec::greedy("b", string()));
        assert_eq!(
            parser.add_subcommand(spec),
            Err(SpecError::MultipleGreedy("x".to_string()))
        );
    }

    #[test]
    fn test_all_positionals_filled() {
        let spec = (0..5).fold(SubcommandSpec::new("many"), |s, i| {
            s.arg(ArgSpec::positional(format!("a{}", i), string()))
        });
        let parser = CommandParser::new().with_subcommand(spec).unwrap();
        let parsed = parser.parse("many 1 2 3 4 5").unwrap();
        assert_eq!(parsed.args.len(), 5);
        assert_eq!(parsed.arg_str("a4"), Some("5"));
        assert!(matches!(
            parser.parse("many 1 2 3 4"),
            Err(ParseError::MissingArgument(name)) if name == "a4"
        ));
    }

    #[test]
    fn test_metadata_export() {
        let meta = group_parser().metadata("group");
        assert_eq!(meta.subcommands.len(), 2);
        assert_eq!(
            meta.syntax(),
            "group add <name> <emoji>\n or group archive [-r|--recursive] [channels...]"
        );
    }
}
