//! Error types shared across Reelcut crates.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for Reelcut operations.
///
/// Plan problems (`Validation`, `TemporalConflict`, `OutOfRange`) are raised
/// before any rendering starts. `SegmentRender` is retryable per segment;
/// `RenderAborted` carries every segment that exhausted its retries.
/// `Encode` is fatal and never leaves an artifact at the output path.
#[derive(Debug, thiserror::Error)]
pub enum ReelcutError {
    #[error("Validation error{}: {message}", op_suffix(.op_id))]
    Validation {
        op_id: Option<String>,
        message: String,
    },

    #[error("Temporal conflict{}: {message}", op_suffix(.op_id))]
    TemporalConflict {
        op_id: Option<String>,
        message: String,
    },

    #[error("Out of range{}: {message}", op_suffix(.op_id))]
    OutOfRange {
        op_id: Option<String>,
        message: String,
    },

    #[error("Segment {segment} render error: {message}")]
    SegmentRender { segment: usize, message: String },

    #[error("Render aborted: {} part(s) failed ({})", .failures.len(), join_failures(.failures))]
    RenderAborted { failures: Vec<PartFailure> },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Render job cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelcutError.
pub type ReelcutResult<T> = Result<T, ReelcutError>;

/// A render part (segment or transition) that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PartFailure {
    /// Human-readable label, e.g. `segment 3` or `transition 2->3`.
    pub part: String,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: String,
}

impl fmt::Display for PartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.part, self.attempts, self.last_error
        )
    }
}

fn op_suffix(op_id: &Option<String>) -> String {
    match op_id {
        Some(id) => format!(" in operation {id}"),
        None => String::new(),
    }
}

fn join_failures(failures: &[PartFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReelcutError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            op_id: None,
            message: msg.into(),
        }
    }

    pub fn temporal_conflict(msg: impl Into<String>) -> Self {
        Self::TemporalConflict {
            op_id: None,
            message: msg.into(),
        }
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange {
            op_id: None,
            message: msg.into(),
        }
    }

    pub fn segment_render(segment: usize, msg: impl Into<String>) -> Self {
        Self::SegmentRender {
            segment,
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error rejects the plan before rendering.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::TemporalConflict { .. } | Self::OutOfRange { .. }
        )
    }

    /// Whether a segment worker should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SegmentRender { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_error_display_includes_operation() {
        let err = ReelcutError::TemporalConflict {
            op_id: Some("7".to_string()),
            message: "cut overlaps cut 3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Temporal conflict in operation 7: cut overlaps cut 3"
        );
        assert!(err.is_plan_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_aborted_lists_every_failure() {
        let err = ReelcutError::RenderAborted {
            failures: vec![
                PartFailure {
                    part: "segment 1".to_string(),
                    attempts: 3,
                    last_error: "decode failed".to_string(),
                },
                PartFailure {
                    part: "segment 4".to_string(),
                    attempts: 3,
                    last_error: "timed out".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 part(s) failed"));
        assert!(text.contains("segment 1 after 3 attempt(s): decode failed"));
        assert!(text.contains("segment 4"));
    }

    #[test]
    fn test_segment_render_is_retryable() {
        assert!(ReelcutError::segment_render(2, "boom").is_retryable());
        assert!(!ReelcutError::encode("mux failed").is_retryable());
    }
}
