//! Application layer errors

use thiserror::Error;

use crate::application::messaging::pretty;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Argument binding failures. The `Display` output is the user-facing,
/// localizable message; none of these are fatal to the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("Invalid flag: -{0}")]
    InvalidFlag(char),

    #[error("Too few arguments, at least {0} expected")]
    TooFewArguments(usize),

    #[error("Too many arguments, at most {0} expected")]
    TooManyArguments(usize),

    #[error("This command doesn't expect any arguments")]
    NoArgumentsExpected,

    #[error("Argument \"{value}\" should be of type {expected}")]
    TypeMismatch {
        param: String,
        value: String,
        expected: &'static str,
    },

    #[error("Argument \"{value}\" should have one of the following values: {}", pretty(.allowed, "`%s`", "or"))]
    InvalidChoice {
        param: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Argument \"{value}\" should match the following regex: `{pattern}`")]
    PatternMismatch {
        param: String,
        value: String,
        pattern: String,
    },
}

/// Plugin unit load/reload failures
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid cog name: '{0}'")]
    InvalidName(String),

    #[error("No cog export found in {0}")]
    NoExport(String),

    #[error("Failed to open module: {0}")]
    Open(String),

    #[error("Cog init failed: {0}")]
    Init(String),

    #[error("Cog not found: {0}")]
    NotFound(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_messages_are_user_facing() {
        assert_eq!(BindError::InvalidFlag('x').to_string(), "Invalid flag: -x");
        assert_eq!(
            BindError::TooFewArguments(2).to_string(),
            "Too few arguments, at least 2 expected"
        );
        assert_eq!(
            BindError::InvalidChoice {
                param: "mode".to_string(),
                value: "up".to_string(),
                allowed: vec!["on".to_string(), "off".to_string(), "auto".to_string()],
            }
            .to_string(),
            "Argument \"up\" should have one of the following values: `on`, `off` or `auto`"
        );
    }
}
