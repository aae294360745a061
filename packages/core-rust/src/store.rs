//! The view store: authoritative state for one table's grid.
//!
//! [`ViewStore`] holds the saved views, which one is current, the
//! per-view row selection and the dirty-tracking snapshots. Every mutator is
//! synchronous and leaves the store consistent: there is always at least one
//! view and the current view id always resolves.
//!
//! Dirty tracking works on two levels:
//!
//! - each view's `updated` flag compares its [fingerprint](View::fingerprint)
//!   with the snapshot taken when the view was last loaded or persisted;
//! - [`ViewStore::get_raw_if_changed_configs`] compares the fingerprint of
//!   the whole collection (views, their ids and `currentViewId`) with the
//!   last persisted one, so callers can skip a write when nothing changed.
//!
//! Selection and the current page never count as changes, but selection is
//! part of the serialized config.
//!
//! Observers registered with [`ViewStore::add_observer`] are notified after
//! each mutation, modeled after a fan-out composite observer.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;

use crate::error::ViewError;
use crate::filter::{Filter, SortDirection};
use crate::value::{Record, RowId};
use crate::view::{View, ViewConfig, ViewId};

/// Observer for view store mutations.
///
/// Used as `Arc<dyn StoreObserver>`. Callbacks run synchronously inside the
/// mutating call, after the state change, and must not block.
pub trait StoreObserver: Send + Sync {
    /// Called after the store was hydrated from a persisted config.
    fn on_init(&self, views: &[View], current: &ViewId);

    /// Called after a different view became current.
    fn on_current_view_change(&self, view: &View);

    /// Called after a structural field of a view changed.
    fn on_view_update(&self, view: &View);

    /// Called after the selection of a view changed.
    fn on_selection_change(&self, view_id: &ViewId, selected: &BTreeSet<RowId>);

    /// Called after views were added, renamed or removed.
    fn on_view_list_change(&self, views: &[View]);

    /// Called when recording a write left the store with no unpersisted
    /// changes.
    fn on_persisted(&self);

    /// Called when the store is reset to its initial state.
    fn on_reset(&self);
}

/// Composite observer that fans out to multiple observers.
#[derive(Default)]
pub struct CompositeStoreObserver {
    observers: Vec<Arc<dyn StoreObserver>>,
}

impl CompositeStoreObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn StoreObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl StoreObserver for CompositeStoreObserver {
    fn on_init(&self, views: &[View], current: &ViewId) {
        for observer in &self.observers {
            observer.on_init(views, current);
        }
    }

    fn on_current_view_change(&self, view: &View) {
        for observer in &self.observers {
            observer.on_current_view_change(view);
        }
    }

    fn on_view_update(&self, view: &View) {
        for observer in &self.observers {
            observer.on_view_update(view);
        }
    }

    fn on_selection_change(&self, view_id: &ViewId, selected: &BTreeSet<RowId>) {
        for observer in &self.observers {
            observer.on_selection_change(view_id, selected);
        }
    }

    fn on_view_list_change(&self, views: &[View]) {
        for observer in &self.observers {
            observer.on_view_list_change(views);
        }
    }

    fn on_persisted(&self) {
        for observer in &self.observers {
            observer.on_persisted();
        }
    }

    fn on_reset(&self) {
        for observer in &self.observers {
            observer.on_reset();
        }
    }
}

/// State container for one table's views.
pub struct ViewStore {
    views: Vec<View>,
    current_view_id: ViewId,
    /// Per-view state as last loaded or persisted.
    saved: HashMap<ViewId, View>,
    /// Collection fingerprint as last loaded or persisted.
    persisted: serde_json::Value,
    /// Column keys of the active descriptor set, once known.
    available_columns: Option<Vec<String>>,
    observer: CompositeStoreObserver,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ViewStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStore")
            .field("views", &self.views.len())
            .field("current_view_id", &self.current_view_id)
            .field("observers", &self.observer.len())
            .finish_non_exhaustive()
    }
}

impl ViewStore {
    /// A store in its initial state: one clean default view.
    #[must_use]
    pub fn new() -> Self {
        let default = View::default_view();
        let current_view_id = default.id.clone();
        let mut store = Self {
            views: vec![default],
            current_view_id,
            saved: HashMap::new(),
            persisted: serde_json::Value::Null,
            available_columns: None,
            observer: CompositeStoreObserver::default(),
        };
        store.take_snapshot();
        store
    }

    /// Registers an observer for subsequent mutations.
    pub fn add_observer(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observer.add(observer);
    }

    // ---- hydration ----

    /// Hydrates from persisted config text. Absent, empty or malformed text
    /// yields a single default view; this never fails.
    pub fn init_store(&mut self, raw: Option<&str>) {
        let config = match raw.map(str::trim) {
            None | Some("") => ViewConfig::default(),
            Some(raw) => ViewConfig::parse(raw).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "discarding unreadable view config");
                ViewConfig::default()
            }),
        };
        self.hydrate(config);
    }

    /// Hydrates from an already parsed config value.
    pub fn init_from_value(&mut self, value: serde_json::Value) {
        let config = ViewConfig::from_value(value).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "discarding unreadable view config");
            ViewConfig::default()
        });
        self.hydrate(config);
    }

    fn hydrate(&mut self, config: ViewConfig) {
        let mut seen = HashSet::new();
        let mut views = Vec::with_capacity(config.views.len());
        for mut view in config.views {
            if view.id.is_empty() {
                view.id = ViewId::generate();
            }
            if !seen.insert(view.id.clone()) {
                tracing::warn!(view = %view.id, "dropping view with duplicate id");
                continue;
            }
            view.updated = false;
            views.push(view);
        }
        if views.is_empty() {
            views.push(View::default_view());
        }

        let current_view_id = config
            .current_view_id
            .filter(|id| seen.contains(id))
            .unwrap_or_else(|| views[0].id.clone());

        self.views = views;
        self.current_view_id = current_view_id;
        self.take_snapshot();
        tracing::debug!(
            views = self.views.len(),
            current = %self.current_view_id,
            "view store initialized"
        );
        self.observer.on_init(&self.views, &self.current_view_id);
    }

    /// Returns the store to its initial state: one clean default view, no
    /// known columns. Observers stay registered.
    pub fn reset(&mut self) {
        let default = View::default_view();
        self.current_view_id = default.id.clone();
        self.views = vec![default];
        self.available_columns = None;
        self.take_snapshot();
        self.observer.on_reset();
    }

    // ---- reads ----

    /// All views in list order.
    #[must_use]
    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// Looks up a view by id.
    #[must_use]
    pub fn view(&self, id: &ViewId) -> Option<&View> {
        self.views.iter().find(|v| &v.id == id)
    }

    /// Id of the current view.
    #[must_use]
    pub fn current_view_id(&self) -> &ViewId {
        &self.current_view_id
    }

    /// The current view.
    #[must_use]
    pub fn current_view(&self) -> &View {
        &self.views[self.current_index()]
    }

    /// Rows of `rows` selected in the current view, in `rows` order.
    #[must_use]
    pub fn selected_records<'r>(&self, rows: &'r [Record]) -> Vec<&'r Record> {
        let selected = &self.current_view().selected_row_ids;
        rows.iter().filter(|r| selected.contains(&r.id)).collect()
    }

    fn current_index(&self) -> usize {
        self.views
            .iter()
            .position(|v| v.id == self.current_view_id)
            .unwrap_or(0)
    }

    // ---- current view switching ----

    /// Switches the current view. An unknown id falls back to the first
    /// view. Returns the id that is current afterwards.
    pub fn on_current_view_id_change(&mut self, id: &ViewId) -> ViewId {
        let next = if self.view(id).is_some() {
            id.clone()
        } else {
            tracing::debug!(view = %id, "unknown view requested, falling back to first view");
            self.ensure_not_empty();
            self.views[0].id.clone()
        };
        if next != self.current_view_id {
            self.current_view_id = next;
            let view = &self.views[self.current_index()];
            self.observer.on_current_view_change(view);
        }
        self.current_view_id.clone()
    }

    fn ensure_not_empty(&mut self) {
        if self.views.is_empty() {
            self.views.push(View::default_view());
        }
    }

    // ---- structural mutators ----

    /// Replaces the current view's filters and returns to the first page.
    pub fn on_current_view_queries_change(&mut self, filters: Vec<Filter>) {
        self.mutate_current(|view| {
            view.filters = filters;
            view.page = 0;
        });
    }

    /// Sets or clears the current view's sort.
    pub fn on_current_view_sort_change(
        &mut self,
        sort_by: Option<String>,
        direction: SortDirection,
    ) {
        self.mutate_current(|view| {
            view.sort_by = sort_by;
            view.sort_direction = direction;
        });
    }

    /// Sets the current view's visible columns. Keys missing from the
    /// available columns (once known) and repeated keys are dropped.
    pub fn on_current_view_columns_change(&mut self, keys: Vec<String>) {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys
            .into_iter()
            .filter(|key| {
                self.available_columns
                    .as_ref()
                    .map_or(true, |available| available.contains(key))
            })
            .filter(|key| seen.insert(key.clone()))
            .collect();
        self.mutate_current(|view| view.columns = keys);
    }

    /// Sets the current view's page size and returns to the first page.
    pub fn on_current_view_page_size_change(&mut self, page_size: u32) {
        self.mutate_current(|view| {
            view.page_size = page_size;
            view.page = 0;
        });
    }

    /// Moves the current view's pagination cursor.
    pub fn on_current_view_page_change(&mut self, page: u32) {
        self.mutate_current(|view| view.page = page);
    }

    /// Records the column keys of the active descriptor set.
    pub fn set_available_columns<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_columns = Some(keys.into_iter().map(Into::into).collect());
    }

    fn mutate_current<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut View),
    {
        self.ensure_not_empty();
        let index = self.current_index();
        let view = &mut self.views[index];
        apply(view);
        view.updated = is_dirty(&self.saved, view);
        self.observer.on_view_update(view);
    }

    // ---- selection ----

    /// Selects exactly `ids` in the current view.
    pub fn on_select_all<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = RowId>,
    {
        self.mutate_selection(|selected| *selected = ids.into_iter().collect());
    }

    /// Clears the current view's selection.
    pub fn on_select_none(&mut self) {
        self.mutate_selection(BTreeSet::clear);
    }

    /// Adds `ids` to the current view's selection.
    pub fn on_select_rows<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = RowId>,
    {
        self.mutate_selection(|selected| selected.extend(ids));
    }

    /// Flips one row's selection. Returns whether it is selected afterwards.
    pub fn on_toggle_row(&mut self, id: &RowId) -> bool {
        let mut now_selected = false;
        self.mutate_selection(|selected| {
            now_selected = if selected.remove(id) {
                false
            } else {
                selected.insert(id.clone());
                true
            };
        });
        now_selected
    }

    fn mutate_selection<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut BTreeSet<RowId>),
    {
        self.ensure_not_empty();
        let index = self.current_index();
        let view = &mut self.views[index];
        apply(&mut view.selected_row_ids);
        self.observer
            .on_selection_change(&view.id, &view.selected_row_ids);
    }

    // ---- view list ----

    /// Saves the current view's state as a new view and makes it current.
    ///
    /// The source view reverts to its saved state; its selection is kept.
    /// The new view starts unsaved until the next persist.
    pub fn save_current_view_as(&mut self, name: impl Into<String>) -> ViewId {
        self.ensure_not_empty();
        let index = self.current_index();
        let mut created = self.views[index].clone();
        created.id = ViewId::generate();
        created.name = name.into();
        created.updated = true;

        if let Some(saved) = self.saved.get(&self.views[index].id) {
            let source = &mut self.views[index];
            let selection = std::mem::take(&mut source.selected_row_ids);
            *source = saved.clone();
            source.selected_row_ids = selection;
            source.updated = false;
        }

        let id = created.id.clone();
        tracing::debug!(view = %id, name = %created.name, "view saved as new view");
        self.views.push(created);
        self.current_view_id = id.clone();
        self.observer.on_view_list_change(&self.views);
        self.observer.on_current_view_change(self.current_view());
        id
    }

    /// Renames a view.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::UnknownView`] when no view has this id.
    pub fn rename_view(&mut self, id: &ViewId, name: impl Into<String>) -> Result<(), ViewError> {
        let view = self
            .views
            .iter_mut()
            .find(|v| &v.id == id)
            .ok_or_else(|| ViewError::UnknownView(id.clone()))?;
        view.name = name.into();
        view.updated = is_dirty(&self.saved, view);
        self.observer.on_view_list_change(&self.views);
        Ok(())
    }

    /// Deletes a view. Deleting the current view makes the first remaining
    /// view current; deleting the last view leaves a fresh default view.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::UnknownView`] when no view has this id.
    pub fn delete_view(&mut self, id: &ViewId) -> Result<(), ViewError> {
        let index = self
            .views
            .iter()
            .position(|v| &v.id == id)
            .ok_or_else(|| ViewError::UnknownView(id.clone()))?;
        self.views.remove(index);
        self.ensure_not_empty();
        self.observer.on_view_list_change(&self.views);
        if &self.current_view_id == id {
            self.current_view_id = self.views[0].id.clone();
            self.observer.on_current_view_change(&self.views[0]);
        }
        Ok(())
    }

    /// Reverts the current view's structural fields to its saved state.
    /// Selection is kept. A view that was never saved reverts to the
    /// default layout under its own id and name.
    pub fn discard_current_view_changes(&mut self) {
        let index = self.current_index();
        let current = &self.views[index];
        let mut restored = match self.saved.get(&current.id) {
            Some(saved) => saved.clone(),
            None => View::new(current.id.clone(), current.name.clone()),
        };
        restored.selected_row_ids = current.selected_row_ids.clone();
        restored.updated = is_dirty(&self.saved, &restored);
        self.views[index] = restored;
        self.observer.on_view_update(&self.views[index]);
    }

    // ---- persistence ----

    /// The collection as persisted config.
    #[must_use]
    pub fn config(&self) -> ViewConfig {
        ViewConfig {
            views: self.views.clone(),
            current_view_id: Some(self.current_view_id.clone()),
        }
    }

    /// Serializes the collection for persistence.
    #[must_use]
    pub fn get_raw_configs(&self) -> String {
        serde_json::to_string(&self.config()).unwrap_or_default()
    }

    /// Like [`get_raw_configs`](Self::get_raw_configs), but `None` when the
    /// collection matches what was last loaded or persisted.
    #[must_use]
    pub fn get_raw_if_changed_configs(&self) -> Option<String> {
        if self.has_unpersisted_changes() {
            Some(self.get_raw_configs())
        } else {
            None
        }
    }

    /// Whether the collection differs from what was last loaded or
    /// persisted.
    #[must_use]
    pub fn has_unpersisted_changes(&self) -> bool {
        collection_fingerprint(&self.views, &self.current_view_id) != self.persisted
    }

    /// Records the current state as persisted.
    pub fn mark_persisted(&mut self) {
        self.take_snapshot();
        self.observer.on_persisted();
    }

    /// Records `written` as the persisted state. Changes made after that
    /// config was captured stay dirty.
    pub fn mark_persisted_config(&mut self, written: &ViewConfig) {
        self.saved = written
            .views
            .iter()
            .map(|v| (v.id.clone(), v.clone()))
            .collect();
        let current = written
            .current_view_id
            .clone()
            .unwrap_or_else(|| self.current_view_id.clone());
        self.persisted = collection_fingerprint(&written.views, &current);
        for view in &mut self.views {
            view.updated = is_dirty(&self.saved, view);
        }
        if !self.has_unpersisted_changes() {
            self.observer.on_persisted();
        }
    }

    fn take_snapshot(&mut self) {
        for view in &mut self.views {
            view.updated = false;
        }
        self.saved = self
            .views
            .iter()
            .map(|v| (v.id.clone(), v.clone()))
            .collect();
        self.persisted = collection_fingerprint(&self.views, &self.current_view_id);
    }
}

fn is_dirty(saved: &HashMap<ViewId, View>, view: &View) -> bool {
    saved
        .get(&view.id)
        .map_or(true, |s| s.fingerprint() != view.fingerprint())
}

fn collection_fingerprint(views: &[View], current: &ViewId) -> serde_json::Value {
    let views: Vec<serde_json::Value> = views
        .iter()
        .map(|v| json!({ "id": v.id, "view": v.fingerprint() }))
        .collect();
    json!({ "views": views, "currentViewId": current })
}
