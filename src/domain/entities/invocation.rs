use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of parsing one command line against a subcommand table.
///
/// Flags default to `false`, valued options and optional arguments to
/// `null`, greedy arguments to an empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvocation {
    pub subcommand: String,
    pub opts: BTreeMap<String, Value>,
    pub args: BTreeMap<String, Value>,
    /// Long option name to short key
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl ParsedInvocation {
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            subcommand: subcommand.into(),
            opts: BTreeMap::new(),
            args: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Option value by short key or long alias
    pub fn opt(&self, name: &str) -> Option<&Value> {
        self.opts.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|short| self.opts.get(short))
        })
    }

    /// Whether a flag was given
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.opt(name), Some(Value::Bool(true)))
    }

    /// Whether the option appeared on the command line at all
    pub fn has_opt(&self, name: &str) -> bool {
        !matches!(self.opt(name), None | Some(Value::Null) | Some(Value::Bool(false)))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.opt(name).and_then(Value::as_str)
    }

    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.opt(name).and_then(Value::as_i64)
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Whether an argument slot received at least one token
    pub fn has_arg(&self, name: &str) -> bool {
        match self.args.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.arg(name).and_then(Value::as_str)
    }

    pub fn arg_i64(&self, name: &str) -> Option<i64> {
        self.arg(name).and_then(Value::as_i64)
    }

    /// Items of a greedy argument; empty when absent
    pub fn arg_list(&self, name: &str) -> &[Value] {
        match self.args.get(name) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// String items of a greedy argument
    pub fn arg_strings(&self, name: &str) -> Vec<String> {
        self.arg_list(name)
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}
