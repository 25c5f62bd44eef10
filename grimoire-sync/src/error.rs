//! Error types for grimoire-sync.

use thiserror::Error;

use grimoire_core::StoreError;

use crate::auth::AuthFailure;

/// All errors a producer or viewer can receive from the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The push credential was missing or wrong. Nothing was touched.
    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),

    /// Store-level failure: not found, invalid payload, mode conflict,
    /// incompatible append.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Stable machine-readable code used in wire error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Unauthorized(_) => "unauthorized",
            SyncError::Store(err) => err.code(),
        }
    }
}
