//! Argument matcher - Assigns argument tokens to declared slots
//!
//! Each token is tried, in order, against the positional slots (first free
//! slot whose converter accepts it), then the optional slots, then the
//! greedy slot. Tokens that fit nowhere end up in the remainder.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::application::errors::ParseError;
use crate::domain::entities::{ArgMode, ArgSpec, SubcommandSpec, Token};

/// Slot assignment before the completeness checks
#[derive(Debug, Default)]
pub struct Assignment {
    pub values: BTreeMap<String, Value>,
    pub remainder: Vec<String>,
}

/// Match `tokens` against the argument slots of `spec`
pub fn match_arguments(
    spec: &SubcommandSpec,
    tokens: &[Token],
) -> Result<BTreeMap<String, Value>, ParseError> {
    let Assignment { values, remainder } = assign(spec, tokens);

    if let Some(missing) = spec.positional().find(|a| !values.contains_key(&a.name)) {
        return Err(ParseError::MissingArgument(missing.name.clone()));
    }

    if !remainder.is_empty() {
        return Err(ParseError::TooManyArguments {
            subcommand: spec.name.clone(),
            remainder,
        });
    }

    for greedy in spec.greedy().filter(|a| a.non_empty) {
        let empty = matches!(values.get(&greedy.name), Some(Value::Array(items)) if items.is_empty());
        if empty {
            return Err(ParseError::EmptyGreedy(greedy.name.clone()));
        }
    }

    Ok(values)
}

/// Assign tokens to slots without judging the result
pub fn assign(spec: &SubcommandSpec, tokens: &[Token]) -> Assignment {
    let mut out = Assignment::default();
    for arg in spec.optional() {
        out.values.insert(arg.name.clone(), Value::Null);
    }
    for arg in spec.greedy() {
        out.values.insert(arg.name.clone(), Value::Array(Vec::new()));
    }

    let mut filled = HashSet::new();
    for token in tokens {
        let text = literal(&token.text);
        let placed = [ArgMode::Positional, ArgMode::Optional, ArgMode::Greedy]
            .into_iter()
            .any(|mode| {
                spec.args
                    .iter()
                    .filter(|a| a.mode == mode)
                    .any(|arg| try_slot(arg, text, &mut filled, &mut out.values))
            });
        if !placed {
            out.remainder.push(text.to_string());
        }
    }

    out
}

/// Undo the escape of a leading option marker
pub fn literal(text: &str) -> &str {
    match text.strip_prefix('\\') {
        Some(rest) if rest.starts_with('-') => rest,
        _ => text,
    }
}

/// Slots stay taken once filled, even by a converter that yields `null`
fn try_slot<'a>(
    arg: &'a ArgSpec,
    text: &str,
    filled: &mut HashSet<&'a str>,
    values: &mut BTreeMap<String, Value>,
) -> bool {
    if arg.mode != ArgMode::Greedy && filled.contains(arg.name.as_str()) {
        return false;
    }

    let Ok(value) = arg.converter.convert(text) else {
        return false;
    };

    match arg.mode {
        ArgMode::Greedy => {
            if let Some(Value::Array(items)) = values.get_mut(&arg.name) {
                items.push(value);
            } else {
                values.insert(arg.name.clone(), Value::Array(vec![value]));
            }
        }
        _ => {
            filled.insert(arg.name.as_str());
            values.insert(arg.name.clone(), value);
        }
    }
    true
}
