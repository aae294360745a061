//! Reconciles a [`ViewStore`] with its remote record source and persisted
//! view config.
//!
//! Store mutations stay synchronous; everything here runs as a consequence
//! of them. Fetch results carry a [`Generation`](crate::generation::Generation)
//! and are dropped when a newer fetch started meanwhile. Saves are serialized
//! per sync instance: a save attempted while another is in flight returns
//! [`SaveOutcome::InFlight`] instead of waiting.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use viewgrid_core::store::StoreObserver;
use viewgrid_core::{
    ColumnSet, ColumnSetBuilder, Record, RowId, ScanRequest, SchemaSet, View, ViewConfig,
    ViewId, ViewStore,
};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::generation::GenerationTracker;
use crate::traits::{RecordSource, ViewConfigStore};

/// Shared handle to a view store. Each table instance owns its own.
pub type StoreHandle = Arc<RwLock<ViewStore>>;

/// Rows currently shown by the grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RowSetState {
    /// Nothing fetched yet.
    #[default]
    Idle,
    /// A fetch is running.
    Loading,
    /// The latest fetch succeeded.
    Ready {
        records: Vec<Record>,
        next_cursor: Option<u64>,
        total: Option<u64>,
    },
    /// The latest fetch failed. The store is unaffected.
    Error { message: String, retryable: bool },
}

impl RowSetState {
    /// Rows to display; empty unless ready.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Ready { records, .. } => records,
            _ => &[],
        }
    }
}

/// Result of a fetch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The rows were applied.
    Applied { rows: usize, new_columns: usize },
    /// A newer fetch started before this one finished; its result was
    /// dropped.
    Superseded,
}

/// Result of a save that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The config was written.
    Saved,
    /// Nothing changed since the last write.
    Skipped,
    /// Another save is running.
    InFlight,
}

/// Flags structural view-list changes so they can be persisted without an
/// explicit save.
#[derive(Default)]
struct ViewListWatcher {
    changed: AtomicBool,
}

impl StoreObserver for ViewListWatcher {
    fn on_init(&self, _views: &[View], _current: &ViewId) {
        self.changed.store(false, Ordering::Release);
    }

    fn on_current_view_change(&self, _view: &View) {}

    fn on_view_update(&self, _view: &View) {}

    fn on_selection_change(&self, _view_id: &ViewId, _selected: &BTreeSet<RowId>) {}

    fn on_view_list_change(&self, _views: &[View]) {
        self.changed.store(true, Ordering::Release);
    }

    fn on_persisted(&self) {
        self.changed.store(false, Ordering::Release);
    }

    fn on_reset(&self) {
        self.changed.store(false, Ordering::Release);
    }
}

/// Sync layer of one table's grid.
pub struct ViewSync {
    config: SyncConfig,
    store: StoreHandle,
    source: Arc<dyn RecordSource>,
    configs: Arc<dyn ViewConfigStore>,
    generations: GenerationTracker,
    rows: RwLock<RowSetState>,
    schemas: RwLock<SchemaSet>,
    save_lock: tokio::sync::Mutex<()>,
    list_watcher: Arc<ViewListWatcher>,
}

impl ViewSync {
    /// Creates the sync layer with a fresh store.
    #[must_use]
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn RecordSource>,
        configs: Arc<dyn ViewConfigStore>,
    ) -> Self {
        let list_watcher = Arc::new(ViewListWatcher::default());
        let mut store = ViewStore::new();
        store.add_observer(list_watcher.clone());
        Self {
            config,
            store: Arc::new(RwLock::new(store)),
            source,
            configs,
            generations: GenerationTracker::new(),
            rows: RwLock::new(RowSetState::Idle),
            schemas: RwLock::new(SchemaSet::new()),
            save_lock: tokio::sync::Mutex::new(()),
            list_watcher,
        }
    }

    /// Handle to the store; grids mutate it directly.
    #[must_use]
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Table this sync layer serves.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Current row set.
    #[must_use]
    pub fn rows(&self) -> RowSetState {
        self.rows.read().clone()
    }

    /// Column set over every schema observed so far, with a selection
    /// column in front.
    #[must_use]
    pub fn columns(&self) -> ColumnSet {
        let schemas = self.schemas.read();
        ColumnSetBuilder::new(schemas.schemas())
            .with_selection_column()
            .build()
    }

    /// Rows of the current page selected in the current view.
    #[must_use]
    pub fn selected_records(&self) -> Vec<Record> {
        let rows = self.rows.read();
        let store = self.store.read();
        store
            .selected_records(rows.records())
            .into_iter()
            .cloned()
            .collect()
    }

    // ---- views ----

    /// Loads the persisted view config into the store.
    ///
    /// A missing, unreadable or failing blob leaves the store with a single
    /// default view; this never fails.
    pub async fn load_views(&self) {
        let key = &self.config.view_config_key;
        let generation = self.generations.begin("views");
        let raw = match self.configs.load(key).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "view config unavailable, using defaults");
                None
            }
        };
        if !self.generations.is_current(&generation) {
            tracing::debug!(key = %key, "stale view config load dropped");
            return;
        }
        // Missing, empty or unreadable blobs all fall back to the default
        // view, which takes the configured page size as its baseline.
        let fell_back = raw.as_deref().map_or(true, |raw| {
            ViewConfig::parse(raw).map_or(true, |config| config.views.is_empty())
        });
        let mut store = self.store.write();
        store.init_store(raw.as_deref());
        if fell_back && store.current_view().page_size != self.config.page_size {
            store.on_current_view_page_size_change(self.config.page_size);
            store.mark_persisted();
        }
    }

    /// Persists the view config if it changed since the last write.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persist`] if the write fails; the store keeps its
    /// unsaved state so the save can be retried.
    pub async fn save(&self) -> Result<SaveOutcome, SyncError> {
        let Ok(_guard) = self.save_lock.try_lock() else {
            tracing::debug!(table = %self.config.table, "save already in flight");
            return Ok(SaveOutcome::InFlight);
        };

        let (written, content) = {
            let store = self.store.read();
            match store.get_raw_if_changed_configs() {
                Some(content) => (store.config(), content),
                None => return Ok(SaveOutcome::Skipped),
            }
        };

        let key = &self.config.view_config_key;
        self.configs
            .store(key, &content)
            .await
            .map_err(|source| SyncError::Persist {
                key: key.clone(),
                source,
            })?;
        self.store.write().mark_persisted_config(&written);
        tracing::info!(key = %key, views = written.views.len(), "view config saved");
        Ok(SaveOutcome::Saved)
    }

    /// Saves if views were added, renamed or removed since the last write.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub async fn persist_view_list_changes(&self) -> Result<SaveOutcome, SyncError> {
        if self.list_watcher.changed.load(Ordering::Acquire) {
            self.save().await
        } else {
            Ok(SaveOutcome::Skipped)
        }
    }

    // ---- rows ----

    /// Fetches the current view's page.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Fetch`] if the scan fails; the row set becomes
    /// [`RowSetState::Error`] and the store is untouched.
    pub async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        self.fetch(None).await
    }

    /// Fetches from `cursor` (a previous page's `nextCursor`) or, when
    /// `None`, the current view's page.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn fetch(&self, cursor: Option<u64>) -> Result<FetchOutcome, SyncError> {
        let table = self.config.table.clone();
        let request = ScanRequest::from_view(self.store.read().current_view(), cursor);
        let generation = self.generations.begin("rows");
        *self.rows.write() = RowSetState::Loading;

        let result = self.source.scan(&table, &request).await;
        if !self.generations.is_current(&generation) {
            tracing::debug!(table = %table, generation = generation.value(), "stale fetch dropped");
            return Ok(FetchOutcome::Superseded);
        }

        match result {
            Ok(page) => {
                let new_columns = {
                    let mut schemas = self.schemas.write();
                    let added = schemas.merge(page.column_types);
                    self.store
                        .write()
                        .set_available_columns(schemas.schemas().iter().map(|s| s.name.clone()));
                    added
                };
                let rows = page.records.len();
                *self.rows.write() = RowSetState::Ready {
                    records: page.records,
                    next_cursor: page.next_cursor,
                    total: page.total,
                };
                tracing::debug!(table = %table, rows, new_columns, "rows applied");
                Ok(FetchOutcome::Applied { rows, new_columns })
            }
            Err(source) => {
                tracing::warn!(table = %table, error = %source, "fetch failed");
                *self.rows.write() = RowSetState::Error {
                    message: source.to_string(),
                    retryable: true,
                };
                Err(SyncError::Fetch { table, source })
            }
        }
    }

    /// Drops all state and supersedes outstanding fetches, e.g. when the
    /// grid is unmounted.
    pub fn reset(&self) {
        self.generations.invalidate_all();
        self.store.write().reset();
        self.schemas.write().clear();
        *self.rows.write() = RowSetState::Idle;
    }

    /// The current view config as written on the next save.
    #[must_use]
    pub fn config_snapshot(&self) -> ViewConfig {
        self.store.read().config()
    }
}
