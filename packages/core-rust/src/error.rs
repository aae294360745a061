//! Error types for the view engine.
//!
//! Local evaluation (filters, sorting, column extraction) is total and has
//! no error type. Errors only arise when decoding persisted view configs or
//! when an operation names a view that does not exist; the store recovers
//! from the former and reports the latter to the caller.

use crate::view::ViewId;

/// Errors produced by view config decoding and view-list operations.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("view config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("view config has unexpected shape: {reason}")]
    Shape { reason: String },
    #[error("unknown view: {0}")]
    UnknownView(ViewId),
}
