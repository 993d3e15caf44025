//! Script lifecycle error types.

use thiserror::Error;

/// Errors raised while compiling, loading or running a scriptlet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Syntax or name resolution failure. The message is meant for the
    /// author of the source.
    #[error("Failed compiling {name}: {message}")]
    Compile { name: String, message: String },

    #[error("Scriptlet {0} is not loaded")]
    NotLoaded(String),

    /// A predeclared name has no runtime binding.
    #[error("Scriptlet references unbound name {0}")]
    UnboundName(String),

    #[error("Scriptlet missing {0} function")]
    MissingEntryPoint(String),

    #[error("Failed with unexpected return value: {value} ({type_name})")]
    UnexpectedReturn { type_name: String, value: String },

    #[error("Scriptlet cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Runtime(String),
}

pub type ScriptResult<T> = Result<T, ScriptError>;
