//! Plan validation errors.

use std::path::PathBuf;

use reelcut_common::error::ReelcutError;

/// Errors raised while loading or validating an edit plan.
///
/// Every variant rejects the whole plan; nothing is rendered.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Malformed operation: missing or invalid fields, unknown action.
    #[error("Invalid operation {op_id}: {message}")]
    Validation { op_id: String, message: String },

    /// Overlapping cuts or speed changes, impossible transitions.
    #[error("Temporal conflict in operation {op_id}: {message}")]
    TemporalConflict { op_id: String, message: String },

    /// Operation references time outside the source duration.
    #[error("Operation {op_id} out of range: {message}")]
    OutOfRange { op_id: String, message: String },
}

impl PlanError {
    pub fn validation(op_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            op_id: op_id.into(),
            message: msg.into(),
        }
    }

    pub fn conflict(op_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TemporalConflict {
            op_id: op_id.into(),
            message: msg.into(),
        }
    }

    pub fn out_of_range(op_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::OutOfRange {
            op_id: op_id.into(),
            message: msg.into(),
        }
    }
}

impl From<PlanError> for ReelcutError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                ReelcutError::FileNotFound { path }
            }
            PlanError::Io { source, .. } => ReelcutError::Io(source),
            PlanError::Parse { path, source } => ReelcutError::Validation {
                op_id: None,
                message: format!("{}: {source}", path.display()),
            },
            PlanError::Validation { op_id, message } => ReelcutError::Validation {
                op_id: Some(op_id),
                message,
            },
            PlanError::TemporalConflict { op_id, message } => ReelcutError::TemporalConflict {
                op_id: Some(op_id),
                message,
            },
            PlanError::OutOfRange { op_id, message } => ReelcutError::OutOfRange {
                op_id: Some(op_id),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_taxonomy() {
        let err: ReelcutError = PlanError::conflict("4", "overlaps cut 2").into();
        assert!(matches!(
            err,
            ReelcutError::TemporalConflict { ref op_id, .. } if op_id.as_deref() == Some("4")
        ));

        let err: ReelcutError = PlanError::Io {
            path: PathBuf::from("/missing/plan.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert!(matches!(err, ReelcutError::FileNotFound { .. }));
    }
}
