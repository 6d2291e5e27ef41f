//! Command descriptors and per-cog command tables.
//!
//! Commands are declared as explicit descriptors at registration time:
//! parameter names, arity mode and per-parameter validators are first-class
//! data, and every command carries the handler it dispatches to.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::application::errors::CommandError;
use crate::domain::entities::Capabilities;
use crate::plugins::cog::Context;

/// Every command, alias and cog name must match this
static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z][a-z_.0-9]*$").expect("name pattern"));

/// Check if a name matches `[a-z][a-z_.0-9]*`.
pub fn is_valid(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// How the final declared parameter consumes leftover text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArityMode {
    /// Exact token count, no embedded whitespace in the last token
    #[default]
    Fixed,
    /// Last parameter absorbs all remaining raw text, whitespace included
    FullText,
    /// Last parameter is re-split into a whitespace-delimited tail
    Variadic,
}

/// Scalar types a positional argument can be coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Int,
    Float,
    Bool,
}

impl ArgType {
    pub fn name(&self) -> &'static str {
        match self {
            ArgType::Str => "str",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
        }
    }
}

/// A coerced argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Str(s) => write!(f, "{}", s),
            ArgValue::Int(n) => write!(f, "{}", n),
            ArgValue::Float(x) => write!(f, "{}", x),
            ArgValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Validation attached to a single parameter
#[derive(Debug, Clone)]
pub enum Hint {
    /// Coerce the token to a scalar type
    Type(ArgType),
    /// Token must match one of these values, case-insensitively; on success
    /// it is canonicalized to the declared casing
    Choice(Vec<String>),
    /// Token must match this pattern from its first character
    Pattern(Regex),
}

/// One declared positional parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub required: bool,
    pub hint: Option<Hint>,
    pub help: String,
}

/// Arguments produced by a successful bind: extracted flag characters,
/// validated positional values and the variadic tail, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bound {
    pub flags: String,
    pub values: Vec<ArgValue>,
    pub tail: Vec<String>,
}

impl Bound {
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(flag)
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(ArgValue::as_str)
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        self.values.get(index).and_then(ArgValue::as_int)
    }

    pub fn float(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(ArgValue::as_float)
    }

    pub fn bool(&self, index: usize) -> Option<bool> {
        self.values.get(index).and_then(ArgValue::as_bool)
    }
}

/// Handler function invoked with the typed context and the bound arguments.
/// An `Ok(Some(text))` return is sent back to the originating channel.
pub type CommandFn =
    Arc<dyn Fn(&Context, &Bound) -> Result<Option<String>, CommandError> + Send + Sync>;

/// Descriptor of one invocable command
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub help: Option<String>,
    params: Vec<Param>,
    pub arity: ArityMode,
    pub flags: BTreeMap<char, String>,
    pub permissions: Vec<(String, bool)>,
    pub fallback: Option<String>,
    pub delete_message: bool,
    pub handler: Option<CommandFn>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: None,
            params: Vec::new(),
            arity: ArityMode::Fixed,
            flags: BTreeMap::new(),
            permissions: Vec::new(),
            fallback: None,
            delete_message: false,
            handler: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Declare a required positional parameter
    pub fn with_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            required: true,
            hint: None,
            help: String::new(),
        });
        self
    }

    /// Declare an optional positional parameter (not counted in min arity)
    pub fn with_opt_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            required: false,
            hint: None,
            help: String::new(),
        });
        self
    }

    /// Attach a validation hint to an already declared parameter
    pub fn with_hint(mut self, param: &str, hint: Hint) -> Self {
        match self.params.iter_mut().find(|p| p.name == param) {
            Some(p) => p.hint = Some(hint),
            None => tracing::warn!(
                "annotation for unknown parameter '{}' in command '{}'",
                param,
                self.name
            ),
        }
        self
    }

    /// Attach a human-readable hint string to an already declared parameter
    pub fn with_param_help(mut self, param: &str, help: impl Into<String>) -> Self {
        match self.params.iter_mut().find(|p| p.name == param) {
            Some(p) => p.help = help.into(),
            None => tracing::warn!(
                "help for unknown parameter '{}' in command '{}'",
                param,
                self.name
            ),
        }
        self
    }

    pub fn with_flag(mut self, flag: char, help: impl Into<String>) -> Self {
        self.flags.insert(flag, help.into());
        self
    }

    /// Last declared parameter absorbs the rest of the text, spaces included
    pub fn full_text(mut self) -> Self {
        self.arity = ArityMode::FullText;
        self
    }

    /// Declare an optional variadic tail parameter absorbing extra tokens
    pub fn with_tail(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            required: false,
            hint: None,
            help: String::new(),
        });
        self.arity = ArityMode::Variadic;
        self
    }

    /// Require a capability to be granted
    pub fn with_permission(mut self, name: impl Into<String>) -> Self {
        self.permissions.push((name.into(), true));
        self
    }

    /// Require a capability to be absent
    pub fn without_permission(mut self, name: impl Into<String>) -> Self {
        self.permissions.push((name.into(), false));
        self
    }

    /// Command to resolve instead when permission is denied
    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    /// Delete the triggering message after execution (sole-command messages
    /// only, and only when the bot may manage messages in the channel)
    pub fn delete_message(mut self) -> Self {
        self.delete_message = true;
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Context, &Bound) -> Result<Option<String>, CommandError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn min_arity(&self) -> usize {
        self.params.iter().filter(|p| p.required).count()
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    /// Determine if a caller with the given capabilities may run this command
    pub fn allows(&self, caps: &Capabilities) -> bool {
        caps.satisfies(&self.permissions)
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .field("permissions", &self.permissions)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Per-cog mapping of canonical command names to descriptors, plus alias
/// resolution and permission/fallback chaining.
///
/// The alias table maps every reachable name to a canonical one; canonical
/// names map to themselves, and aliases never chain.
#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<String, Arc<CommandSpec>>,
    aliases: HashMap<String, String>,
    hidden: HashSet<String>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a command descriptor. Invalid and duplicate canonical names
    /// are rejected and logged, not errors.
    pub fn register(&mut self, spec: CommandSpec) {
        let name = spec.name.clone();
        if !is_valid(&name) {
            tracing::error!("invalid command name '{}'", name);
            return;
        }
        if self.commands.contains_key(&name) {
            tracing::error!("duplicate command name '{}'", name);
            return;
        }
        if let Some(target) = self.aliases.get(&name) {
            if target != &name {
                tracing::warn!("command '{}' overwrites an alias mapped to '{}'", name, target);
            }
        }
        self.aliases.insert(name.clone(), name.clone());
        self.commands.insert(name, Arc::new(spec));
    }

    /// Map an alias to a canonical command name. Collisions with a different
    /// existing mapping are rejected and logged.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        let alias = alias.into();
        let target = target.into();
        if !is_valid(&alias) {
            tracing::error!("invalid alias name '{}'", alias);
            return;
        }
        if let Some(existing) = self.aliases.get(&alias) {
            if existing != &target {
                tracing::error!(
                    "couldn't register alias '{}' for '{}': already mapped to '{}'",
                    alias,
                    target,
                    existing
                );
            }
            return;
        }
        self.aliases.insert(alias, target);
    }

    /// Remove a name from help listings
    pub fn hide(&mut self, name: impl Into<String>) {
        self.hidden.insert(name.into());
    }

    /// Whether a name (canonical or alias) is known
    pub fn has(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Alias to canonical lookup, one level only
    pub fn resolve(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.aliases
            .get(name)
            .and_then(|canonical| self.commands.get(canonical))
            .cloned()
    }

    /// Resolve a command, checking permissions and walking the fallback
    /// chain; `None` means denied with no satisfiable fallback.
    pub fn get_permitted(&self, name: &str, caps: &Capabilities) -> Option<Arc<CommandSpec>> {
        let mut visited = HashSet::new();
        let mut current = name.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return None;
            }
            let spec = self.resolve(&current)?;
            if spec.allows(caps) {
                return Some(spec);
            }
            current = spec.fallback.clone()?;
        }
    }

    /// Canonical commands visible for the given capabilities, for help output
    pub fn visible(&self, caps: &Capabilities) -> Vec<Arc<CommandSpec>> {
        let mut out: Vec<_> = self
            .commands
            .keys()
            .filter(|name| !self.hidden.contains(*name))
            .filter_map(|name| self.get_permitted(name, caps))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out.dedup_by(|a, b| a.name == b.name);
        out
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Canonical names in the table
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.commands.keys()
    }
}
