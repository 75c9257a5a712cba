//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Failures of the trigger store or execution log
//! - `ActionError`: Failures raised by a trigger's action hook
//! - `TriggerError`: Control-surface errors returned to callers

use std::fmt;

/// Errors from trigger store and execution log operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No trigger with this name.
    NotFound { name: String },
    /// A trigger with this name is already stored.
    AlreadyExists { name: String },
    /// The backing store could not complete the operation.
    Unavailable { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "trigger not found in store: {name}"),
            Self::AlreadyExists { name } => write!(f, "trigger already stored: {name}"),
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors returned by a trigger action.
///
/// These never escape the dispatcher; they become failed execution records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The action ran and reported a failure.
    Failed { message: String },
    /// The action panicked or was aborted.
    Aborted { message: String },
}

impl ActionError {
    /// Creates a failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { message } => write!(f, "action failed: {message}"),
            Self::Aborted { message } => write!(f, "action panicked: {message}"),
        }
    }
}

impl std::error::Error for ActionError {}

/// Errors from the registration and control operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// A trigger with this name already exists.
    AlreadyExists { name: String },
    /// No trigger with this name exists.
    NotFound { name: String },
    /// The schedule is missing, non-positive, or not valid for the kind.
    InvalidSchedule { reason: String },
    /// The trigger name is empty or contains unsupported characters.
    InvalidName { name: String, reason: String },
    /// Manual firing was requested for a scheduled trigger.
    NotManual { name: String },
    /// The durable store could not be reached.
    StoreUnavailable { reason: String },
    /// The timer engine task has stopped.
    EngineUnavailable,
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists { name } => write!(f, "trigger already exists: {name}"),
            Self::NotFound { name } => write!(f, "trigger not found: {name}"),
            Self::InvalidSchedule { reason } => write!(f, "invalid schedule: {reason}"),
            Self::InvalidName { name, reason } => {
                write!(f, "invalid trigger name '{name}': {reason}")
            }
            Self::NotManual { name } => {
                write!(f, "trigger '{name}' is not a manual trigger")
            }
            Self::StoreUnavailable { reason } => {
                write!(f, "trigger store unavailable: {reason}")
            }
            Self::EngineUnavailable => write!(f, "timer engine is not running"),
        }
    }
}

impl std::error::Error for TriggerError {}

impl From<StoreError> for TriggerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { name } => Self::NotFound { name },
            StoreError::AlreadyExists { name } => Self::AlreadyExists { name },
            StoreError::Unavailable { reason } => Self::StoreUnavailable { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_maps_to_trigger_error() {
        let err = TriggerError::from(StoreError::AlreadyExists {
            name: "ping".to_string(),
        });
        assert_eq!(
            err,
            TriggerError::AlreadyExists {
                name: "ping".to_string()
            }
        );

        let err = TriggerError::from(StoreError::Unavailable {
            reason: "connection refused".to_string(),
        });
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn action_error_display() {
        let err = ActionError::failed("webhook returned 500");
        assert_eq!(err.to_string(), "action failed: webhook returned 500");
    }

    #[test]
    fn not_manual_display() {
        let err = TriggerError::NotManual {
            name: "nightly".to_string(),
        };
        assert!(err.to_string().contains("not a manual trigger"));
    }
}
