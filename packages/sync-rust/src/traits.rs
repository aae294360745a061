//! Backend seams of the sync layer.

use async_trait::async_trait;
use viewgrid_core::{ScanPage, ScanRequest};

/// Remote record store, queried one page at a time.
/// Implementations: HTTP, memory (tests and the inspect tool).
///
/// Used as `Arc<dyn RecordSource>`.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Scans one page of `table`. The returned `columnTypes` may grow
    /// between calls.
    async fn scan(&self, table: &str, request: &ScanRequest) -> anyhow::Result<ScanPage>;
}

/// Named blob storage for persisted view configs.
///
/// Used as `Arc<dyn ViewConfigStore>`.
#[async_trait]
pub trait ViewConfigStore: Send + Sync {
    /// Loads the blob stored under `key`. Returns `None` if it does not
    /// exist.
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `content` under `key`, replacing any previous blob.
    async fn store(&self, key: &str, content: &str) -> anyhow::Result<()>;
}
