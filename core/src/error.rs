//! Error types shared by every resource operation.

use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors produced while building a resource or dispatching one of its actions.
///
/// Every failure is local to a single construction or dispatch call. Nothing
/// is retried automatically and the resource's published state is never
/// changed by a failed call.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// An action name collides with [`RESERVED_ACTION_NAMES`](crate::action::RESERVED_ACTION_NAMES).
    ///
    /// Returned at construction; the resource is not created.
    #[error("\"{0}\" cannot be used as an action name: it is reserved")]
    ReservedName(String),

    /// Two definitions share the same action name.
    #[error("action \"{0}\" is defined more than once")]
    DuplicateAction(String),

    /// An action was registered with an empty name.
    #[error("action names must not be empty")]
    EmptyActionName,

    /// Dispatch named an action the resource does not define.
    #[error("unknown action \"{0}\"")]
    UnknownAction(String),

    /// A lock-flagged action was called while the resource lock was held.
    ///
    /// The epic was not invoked.
    #[error("action \"{action}\" rejected: resource is locked")]
    Locked {
        /// Rejected action
        action: String,
    },

    /// The epic returned an error, rejected, or its stream failed.
    ///
    /// Carries the epic's own error unchanged; use
    /// [`anyhow::Error::downcast_ref`] to recover the concrete type.
    #[error(transparent)]
    Epic(anyhow::Error),

    /// A stream epic completed without emitting anything.
    #[error("epic for action \"{action}\" completed without emitting a value")]
    NoEmission {
        /// Action whose stream was empty
        action: String,
    },

    /// A middleware stage failed.
    #[error("middleware stage {stage} failed for action \"{action}\": {source}")]
    Middleware {
        /// Action being processed
        action: String,
        /// Zero-based index of the failing stage
        stage: usize,
        /// Error returned by the stage
        #[source]
        source: anyhow::Error,
    },

    /// Reading or writing the persistence medium failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

impl ResourceError {
    /// Whether this error was raised while building the resource.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ReservedName(_) | Self::DuplicateAction(_) | Self::EmptyActionName
        )
    }

    /// Whether the call was rejected by the resource lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// The epic's original error, if this is an epic failure.
    #[must_use]
    pub const fn epic_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Epic(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_name_display() {
        let err = ResourceError::ReservedName("subscribe".into());
        assert_eq!(
            err.to_string(),
            "\"subscribe\" cannot be used as an action name: it is reserved"
        );
        assert!(err.is_configuration());
        assert!(!err.is_locked());
    }

    #[test]
    fn epic_error_is_transparent() {
        let err = ResourceError::Epic(anyhow::anyhow!("backend unavailable"));
        assert_eq!(err.to_string(), "backend unavailable");
        assert!(err.epic_error().is_some());
    }

    #[test]
    fn locked_display() {
        let err = ResourceError::Locked {
            action: "save".into(),
        };
        assert_eq!(err.to_string(), "action \"save\" rejected: resource is locked");
        assert!(err.is_locked());
    }
}
