//! Errors surfaced by the sync layer.

/// Failure at the fetch or persist boundary.
///
/// The view store is never left inconsistent by any of these. Unreadable
/// view configs are not errors: they degrade to the default view.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("fetching rows of {table} failed: {source}")]
    Fetch {
        table: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("persisting view config {key} failed: {source}")]
    Persist {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::Persist { .. } => true,
        }
    }
}
