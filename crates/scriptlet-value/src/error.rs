//! Conversion errors.

use std::fmt::Display;

use thiserror::Error;

/// Errors that can occur while converting a host value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// A map key was not string-like. Carries the offending key kind.
    #[error("Only string keys are supported, found {0}")]
    UnsupportedKeyType(&'static str),

    /// The value has no dynamic representation.
    #[error("Unrecognised type {type_name} for value {value}")]
    UnsupportedType { type_name: String, value: String },

    /// Raised by a custom `Serialize` implementation.
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for ConvertError {
    fn custom<T: Display>(msg: T) -> Self {
        ConvertError::Custom(msg.to_string())
    }
}
