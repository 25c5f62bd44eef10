//! Error types for grimoire-core.

use thiserror::Error;

use crate::types::PlotMode;

/// All errors that can arise from store and figure operations.
///
/// None of these leave the store in a modified state: every check runs
/// before a new snapshot is published.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A path segment (grimoire, chapter or plot) does not exist, or the plot
    /// has not received its first commit yet.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// A grimoire/chapter/plot name failed validation.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    /// The figure document is not well-formed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A push requested a mode other than the one fixed by the first push.
    #[error("plot {path} was created in {existing} mode; push requested {requested}")]
    ModeConflict {
        path: String,
        existing: PlotMode,
        requested: PlotMode,
    },

    /// An append-mode payload does not fit the shape of the stored figure.
    #[error("incompatible append at {pointer}: {reason}")]
    IncompatibleAppend { pointer: String, reason: String },
}

impl StoreError {
    /// Stable machine-readable code used in wire error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::InvalidName { .. } | StoreError::InvalidPayload(_) => "invalid_payload",
            StoreError::ModeConflict { .. } => "mode_conflict",
            StoreError::IncompatibleAppend { .. } => "incompatible_append",
        }
    }
}
