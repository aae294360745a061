//! Sync layer configuration.

use std::time::Duration;

use viewgrid_core::view::DEFAULT_PAGE_SIZE;

/// Default key of the persisted view config blob.
pub const DEFAULT_VIEW_CONFIG_KEY: &str = "viewgrid.views";

/// Configuration of one table's sync layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote record and config service.
    pub base_url: String,
    /// Table the grid shows.
    pub table: String,
    /// Key the view config blob is stored under.
    pub view_config_key: String,
    /// Page size for views that do not set one.
    pub page_size: u32,
    /// Maximum time to wait for a remote request.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            table: String::new(),
            view_config_key: DEFAULT_VIEW_CONFIG_KEY.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Default config for `table`, with the config key namespaced by it.
    #[must_use]
    pub fn for_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            view_config_key: format!("{DEFAULT_VIEW_CONFIG_KEY}.{table}"),
            table,
            ..Self::default()
        }
    }
}
