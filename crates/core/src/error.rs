use thiserror::Error;

use crate::pattern::PatternId;

/// Configuration and structural failures of the replay engine.
///
/// Everything except `StepFailed` is detected before a run starts. A failing
/// step is reported through `RunReport`, and only turned into `StepFailed` when
/// the caller asks for it with `RunReport::into_result`.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("pixel ({x}, {y}) is outside the {width}x{height} buffer")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown pattern id {0}")]
    UnknownPattern(PatternId),

    #[error("goto target '{0}' has no matching label")]
    UnresolvedLabel(String),

    #[error("label '{0}' is declared more than once")]
    DuplicateLabel(String),

    #[error("step {index} failed: {reason}")]
    StepFailed { index: usize, reason: String },

    #[error("script '{name}' does not compile: {message}")]
    Script { name: String, message: String },

    #[error("malformed document: {0}")]
    Format(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ReplayError> = std::result::Result<T, E>;
