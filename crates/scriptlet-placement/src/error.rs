//! Placement error types.

use thiserror::Error;

use scriptlet_runtime::ScriptError;
use scriptlet_value::ConvertError;

/// Failures reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("Failed connecting to {address}: {message}")]
    Unreachable { address: String, message: String },

    #[error("{0}")]
    Query(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Errors that abort a placement run.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Marshalling {what} failed: {source}")]
    Convert {
        what: String,
        #[source]
        source: ConvertError,
    },

    #[error("Failed loading cluster metadata: {0}")]
    Metadata(#[source] CollaboratorError),

    #[error("{operation} for {member:?} failed: {source}")]
    Collaborator {
        operation: &'static str,
        member: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Failed parsing {field}: {message}")]
    Parse {
        field: &'static str,
        message: String,
    },
}

impl PlacementError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PlacementError::Script(ScriptError::Cancelled(_))
                | PlacementError::Metadata(CollaboratorError::Cancelled)
                | PlacementError::Collaborator {
                    source: CollaboratorError::Cancelled,
                    ..
                }
        )
    }
}

pub type PlacementResult<T> = Result<T, PlacementError>;
