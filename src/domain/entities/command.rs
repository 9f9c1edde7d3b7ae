use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::errors::SpecError;

/// Privilege level of a sender, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    User,
    Moderator,
    Admin,
}

impl Privilege {
    pub fn as_str(&self) -> &str {
        match self {
            Privilege::User => "user",
            Privilege::Moderator => "moderator",
            Privilege::Admin => "admin",
        }
    }
}

impl Default for Privilege {
    fn default() -> Self {
        Privilege::User
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converter function type
pub type ConvertFn = dyn Fn(&str) -> Result<Value, String> + Send + Sync;

/// Turns a raw token into a typed value; the name shows up in syntax strings
#[derive(Clone)]
pub struct Converter {
    name: String,
    func: Arc<ConvertFn>,
}

impl Converter {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn convert(&self, raw: &str) -> Result<Value, String> {
        (self.func)(raw)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").field("name", &self.name).finish()
    }
}

/// A short option such as `-r` or `-n 3`
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub key: char,
    pub long: Option<String>,
    /// `None` makes this a boolean flag
    pub converter: Option<Converter>,
    pub description: Option<String>,
    pub privilege: Option<Privilege>,
}

impl OptionSpec {
    pub fn flag(key: char) -> Self {
        Self {
            key,
            long: None,
            converter: None,
            description: None,
            privilege: None,
        }
    }

    pub fn valued(key: char, converter: Converter) -> Self {
        Self {
            converter: Some(converter),
            ..Self::flag(key)
        }
    }

    pub fn with_long(mut self, long: impl Into<String>) -> Self {
        self.long = Some(long.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege);
        self
    }

    pub fn is_flag(&self) -> bool {
        self.converter.is_none()
    }

    pub fn key_str(&self) -> String {
        self.key.to_string()
    }

    pub fn syntax(&self) -> String {
        let mut out = format!("[-{}", self.key);
        if let Some(long) = &self.long {
            out.push_str("|--");
            out.push_str(long);
        }
        if let Some(conv) = &self.converter {
            out.push_str(&format!(" <{}>", conv.name()));
        }
        out.push(']');
        out
    }
}

/// How an argument slot consumes tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgMode {
    /// Required, exactly one token
    Positional,
    /// At most one token, `null` when absent
    Optional,
    /// Any number of tokens collected into a list
    Greedy,
}

/// A named argument slot of a subcommand
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: String,
    pub converter: Converter,
    pub mode: ArgMode,
    pub description: Option<String>,
    pub privilege: Option<Privilege>,
    /// Greedy slots only: reject an empty match
    pub non_empty: bool,
}

impl ArgSpec {
    fn with_mode(name: impl Into<String>, converter: Converter, mode: ArgMode) -> Self {
        Self {
            name: name.into(),
            converter,
            mode,
            description: None,
            privilege: None,
            non_empty: false,
        }
    }

    pub fn positional(name: impl Into<String>, converter: Converter) -> Self {
        Self::with_mode(name, converter, ArgMode::Positional)
    }

    pub fn optional(name: impl Into<String>, converter: Converter) -> Self {
        Self::with_mode(name, converter, ArgMode::Optional)
    }

    pub fn greedy(name: impl Into<String>, converter: Converter) -> Self {
        Self::with_mode(name, converter, ArgMode::Greedy)
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege);
        self
    }

    pub fn syntax(&self) -> String {
        match self.mode {
            ArgMode::Positional => format!("<{}>", self.name),
            ArgMode::Optional => format!("[{}]", self.name),
            ArgMode::Greedy if self.non_empty => format!("<{}...>", self.name),
            ArgMode::Greedy => format!("[{}...]", self.name),
        }
    }
}

/// Declared options and arguments of one subcommand
#[derive(Debug, Clone)]
pub struct SubcommandSpec {
    pub name: String,
    pub description: Option<String>,
    pub privilege: Option<Privilege>,
    pub args: Vec<ArgSpec>,
    pub opts: Vec<OptionSpec>,
}

impl SubcommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            privilege: None,
            args: Vec::new(),
            opts: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege);
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn opt(mut self, opt: OptionSpec) -> Self {
        self.opts.push(opt);
        self
    }

    /// Check the declaration invariants
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }

        for (i, opt) in self.opts.iter().enumerate() {
            if opt.key == '-' || opt.key.is_whitespace() {
                return Err(SpecError::InvalidOptionKey(opt.key));
            }
            if self.opts[..i].iter().any(|o| o.key == opt.key) {
                return Err(SpecError::DuplicateOption(opt.key_str()));
            }
            if let Some(long) = &opt.long {
                if self.opts[..i].iter().any(|o| o.long.as_deref() == Some(long.as_str())) {
                    return Err(SpecError::DuplicateOption(long.clone()));
                }
            }
        }

        for (i, arg) in self.args.iter().enumerate() {
            if self.args[..i].iter().any(|a| a.name == arg.name) {
                return Err(SpecError::DuplicateArgument(arg.name.clone()));
            }
        }

        if self.greedy().count() > 1 {
            return Err(SpecError::MultipleGreedy(self.name.clone()));
        }

        Ok(())
    }

    pub fn positional(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| a.mode == ArgMode::Positional)
    }

    pub fn optional(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| a.mode == ArgMode::Optional)
    }

    pub fn greedy(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| a.mode == ArgMode::Greedy)
    }

    pub fn option(&self, key: char) -> Option<&OptionSpec> {
        self.opts.iter().find(|o| o.key == key)
    }

    pub fn option_by_long(&self, long: &str) -> Option<&OptionSpec> {
        self.opts.iter().find(|o| o.long.as_deref() == Some(long))
    }

    /// Usage line showing only what `privilege` may use
    pub fn syntax_for(&self, privilege: Privilege) -> String {
        let allowed = |p: &Option<Privilege>| p.map_or(true, |p| p <= privilege);

        let parts: Vec<String> = self
            .opts
            .iter()
            .filter(|o| allowed(&o.privilege))
            .map(OptionSpec::syntax)
            .chain(
                self.args
                    .iter()
                    .filter(|a| allowed(&a.privilege))
                    .map(ArgSpec::syntax),
            )
            .collect();

        if parts.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, parts.join(" "))
        }
    }

    pub fn syntax(&self) -> String {
        self.syntax_for(Privilege::Admin)
    }

    pub fn metadata(&self) -> SubcommandMetadata {
        let items = self
            .opts
            .iter()
            .map(|o| ItemPrivilege {
                name: format!("-{}", o.key),
                syntax: o.syntax(),
                privilege: o.privilege,
            })
            .chain(self.args.iter().map(|a| ItemPrivilege {
                name: a.name.clone(),
                syntax: a.syntax(),
                privilege: a.privilege,
            }))
            .collect();

        SubcommandMetadata {
            name: self.name.clone(),
            syntax: self.syntax(),
            description: self.description.clone(),
            privilege: self.privilege,
            items,
        }
    }
}

/// Minimum privilege of a single option or argument
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemPrivilege {
    pub name: String,
    pub syntax: String,
    pub privilege: Option<Privilege>,
}

/// Exported description of a subcommand for help rendering
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubcommandMetadata {
    pub name: String,
    pub syntax: String,
    pub description: Option<String>,
    pub privilege: Option<Privilege>,
    pub items: Vec<ItemPrivilege>,
}

impl SubcommandMetadata {
    pub fn visible_to(&self, privilege: Privilege) -> bool {
        self.privilege.map_or(true, |p| p <= privilege)
    }

    pub fn syntax_for(&self, privilege: Privilege) -> String {
        let parts: Vec<&str> = self
            .items
            .iter()
            .filter(|i| i.privilege.map_or(true, |p| p <= privilege))
            .map(|i| i.syntax.as_str())
            .collect();
        if parts.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, parts.join(" "))
        }
    }
}

/// Exported description of a command plugin
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommandMetadata {
    pub name: String,
    pub description: Option<String>,
    pub subcommands: Vec<SubcommandMetadata>,
}

impl CommandMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            subcommands: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_subcommand(mut self, sub: SubcommandMetadata) -> Self {
        self.subcommands.push(sub);
        self
    }

    /// Full usage text; subcommands are joined by `or`
    pub fn syntax_for(&self, privilege: Privilege) -> String {
        let lines: Vec<String> = self
            .subcommands
            .iter()
            .filter(|s| s.visible_to(privilege))
            .map(|s| format!("{} {}", self.name, s.syntax_for(privilege)))
            .collect();
        if lines.is_empty() {
            self.name.clone()
        } else {
            lines.join("\n or ")
        }
    }

    pub fn syntax(&self) -> String {
        self.syntax_for(Privilege::Admin)
    }

    pub fn short_help(&self) -> &str {
        self.description.as_deref().unwrap_or("No description available.")
    }
}
