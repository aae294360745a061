//! Views and their persisted form.
//!
//! A [`View`] bundles everything a grid needs to reproduce what the user is
//! looking at: column selection and order, sort, filters, pagination and row
//! selection. [`ViewConfig`] is the persisted collection of views.
//!
//! Decoding is lenient. Persisted configs outlive the code that wrote them,
//! so a field with an unexpected shape falls back to its default and a view
//! that cannot be decoded at all is skipped; neither fails the whole config.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::column::{ColumnDescriptor, ColumnSet};
use crate::error::ViewError;
use crate::filter::{paginate, sort_rows, CompiledQuery, Filter, Page, SortDirection};
use crate::operator::OperatorRegistry;
use crate::value::{Record, RowId};

/// Id of the implicit view every store starts with.
pub const DEFAULT_VIEW_ID: &str = "default";
/// Name of the implicit default view.
pub const DEFAULT_VIEW_NAME: &str = "Default";
/// Page size for views that do not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Identifier of a view.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub String);

impl ViewId {
    /// A fresh random id for a newly saved view.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id of the implicit default view.
    #[must_use]
    pub fn default_view() -> Self {
        Self(DEFAULT_VIEW_ID.to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty (never assigned).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Deserializes a field, falling back to its default when the persisted
/// value has the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// Deserializes a sequence, keeping only the elements that decode.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let items = match raw {
        serde_json::Value::Array(items) => items,
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn lenient_row_ids<'de, D>(deserializer: D) -> Result<BTreeSet<RowId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_seq::<D, RowId>(deserializer)?.into_iter().collect())
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// A named bundle of grid state for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    #[serde(default, deserialize_with = "lenient")]
    pub id: ViewId,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    /// Visible column keys in display order. Empty shows every column.
    #[serde(default, deserialize_with = "lenient_seq")]
    pub columns: Vec<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        deserialize_with = "lenient"
    )]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sort_direction: SortDirection,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub filters: Vec<Filter>,
    #[serde(default = "default_page_size", deserialize_with = "lenient_page_size")]
    pub page_size: u32,
    /// Zero-based page index (the pagination cursor).
    #[serde(default, deserialize_with = "lenient")]
    pub page: u32,
    #[serde(default, deserialize_with = "lenient_row_ids")]
    pub selected_row_ids: BTreeSet<RowId>,
    /// Whether the view differs from its last persisted snapshot. Maintained
    /// by the store; never persisted.
    #[serde(skip)]
    pub updated: bool,
}

fn lenient_page_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or(DEFAULT_PAGE_SIZE))
}

/// Structural part of a view: what "unsaved changes" are measured on.
/// Selection and the current page are deliberately left out.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StructuralView<'a> {
    name: &'a str,
    columns: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_by: Option<&'a str>,
    sort_direction: SortDirection,
    filters: &'a [Filter],
    page_size: u32,
}

impl View {
    /// A new empty view with the given id and name.
    #[must_use]
    pub fn new(id: ViewId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            columns: Vec::new(),
            sort_by: None,
            sort_direction: SortDirection::Asc,
            filters: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            page: 0,
            selected_row_ids: BTreeSet::new(),
            updated: false,
        }
    }

    /// The implicit default view.
    #[must_use]
    pub fn default_view() -> Self {
        Self::new(ViewId::default_view(), DEFAULT_VIEW_NAME)
    }

    /// Canonical JSON of the structural fields.
    ///
    /// Two views with equal fingerprints are the same as far as persistence
    /// is concerned: JSON object key order is irrelevant and an absent
    /// optional field equals a missing one.
    #[must_use]
    pub fn fingerprint(&self) -> serde_json::Value {
        serde_json::to_value(StructuralView {
            name: &self.name,
            columns: &self.columns,
            sort_by: self.sort_by.as_deref(),
            sort_direction: self.sort_direction,
            filters: &self.filters,
            page_size: self.page_size,
        })
        .unwrap_or_default()
    }

    /// Runs filter, sort and pagination over `rows` and resolves the visible
    /// columns.
    #[must_use]
    pub fn project<'a>(
        &self,
        columns: &'a ColumnSet,
        registry: &OperatorRegistry,
        rows: &'a [Record],
    ) -> Projection<'a> {
        let query = CompiledQuery::compile(&self.filters, columns, registry);
        let mut filtered = query.filter(rows);
        if let Some(sort_by) = &self.sort_by {
            match columns.get(sort_by) {
                Some(column) => sort_rows(&mut filtered, column, self.sort_direction),
                None => tracing::debug!(column = %sort_by, "sort on unknown column ignored"),
            }
        }
        let page = paginate(filtered, self.page as usize, self.page_size as usize);
        Projection {
            columns: columns.project(&self.columns),
            page,
        }
    }
}

/// What a grid renders for one view: resolved columns and one page of rows.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    pub columns: Vec<&'a ColumnDescriptor>,
    pub page: Page<'a>,
}

impl Projection<'_> {
    /// Header titles in display order.
    #[must_use]
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.title.as_str()).collect()
    }

    /// Rendered cell text, row-major.
    #[must_use]
    pub fn cells(&self) -> Vec<Vec<String>> {
        self.page
            .rows
            .iter()
            .map(|record| self.columns.iter().map(|c| c.render_record(record)).collect())
            .collect()
    }
}

/// The persisted collection of views for one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    pub views: Vec<View>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_view_id: Option<ViewId>,
}

impl ViewConfig {
    /// Parses persisted config text.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Parse`] when `raw` is not JSON and
    /// [`ViewError::Shape`] when it is not an object.
    pub fn parse(raw: &str) -> Result<Self, ViewError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Decodes an already parsed config.
    ///
    /// A config that was stringified twice (a JSON string holding JSON) is
    /// unwrapped once. Views that fail to decode are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Shape`] when the value is not an object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ViewError> {
        let mut object = match value {
            serde_json::Value::Object(object) => object,
            serde_json::Value::String(inner) => return Self::parse(&inner),
            other => {
                return Err(ViewError::Shape {
                    reason: format!("expected an object, found {}", json_kind(&other)),
                })
            }
        };

        let views = match object.remove("views") {
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| match serde_json::from_value::<View>(item) {
                    Ok(view) => Some(view),
                    Err(err) => {
                        tracing::warn!(index, error = %err, "skipping undecodable view");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        let current_view_id = match object.remove("currentViewId") {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Some(ViewId(id)),
            _ => None,
        };
        Ok(Self {
            views,
            current_view_id,
        })
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Named persistence blob as stored by the remote config service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfigBlob {
    /// Config key, one per table.
    pub name: String,
    /// Serialized [`ViewConfig`].
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnSetBuilder;
    use crate::operator;
    use crate::schema::{ColumnSchema, ColumnType};

    #[test]
    fn view_json_uses_camel_case_and_skips_updated() {
        let mut view = View::default_view();
        view.sort_by = Some("duration".to_string());
        view.updated = true;
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["sortBy"], "duration");
        assert_eq!(json["sortDirection"], "ASC");
        assert_eq!(json["pageSize"], 50);
        assert!(json.get("updated").is_none());
    }

    #[test]
    fn missing_fields_default() {
        let view: View = serde_json::from_str(r#"{"id":"v1"}"#).unwrap();
        assert_eq!(view.id, ViewId::from("v1"));
        assert_eq!(view.page_size, DEFAULT_PAGE_SIZE);
        assert!(view.filters.is_empty());
    }

    #[test]
    fn malformed_fields_fall_back() {
        let view: View = serde_json::from_str(
            r#"{"id":"v1","name":7,"sortDirection":"SIDEWAYS","pageSize":"x",
                "filters":[{"property":"a","operator":"EQUAL","value":1},{"bogus":true}],
                "columns":["a",3,"b"],"extra":{"ignored":true}}"#,
        )
        .unwrap();
        assert_eq!(view.name, "");
        assert_eq!(view.sort_direction, SortDirection::Asc);
        assert_eq!(view.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(view.filters.len(), 1);
        assert_eq!(view.columns, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn fingerprint_ignores_selection_and_page() {
        let mut a = View::default_view();
        let b = a.clone();
        a.selected_row_ids.insert(RowId::from("r1"));
        a.page = 3;
        assert_eq!(a.fingerprint(), b.fingerprint());
        a.filters.push(Filter::new("x", operator::EQUAL, "y"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn config_parse_skips_bad_views_and_unwraps_double_encoding() {
        let inner = r#"{"views":[{"id":"a","name":"A"},42],"currentViewId":"a","legacy":1}"#;
        let outer = serde_json::to_string(inner).unwrap();
        let config = ViewConfig::parse(&outer).unwrap();
        assert_eq!(config.views.len(), 1);
        assert_eq!(config.current_view_id, Some(ViewId::from("a")));
    }

    #[test]
    fn config_parse_rejects_non_objects() {
        assert!(matches!(ViewConfig::parse("[1,2]"), Err(ViewError::Shape { .. })));
        assert!(matches!(ViewConfig::parse("{not json"), Err(ViewError::Parse(_))));
    }

    #[test]
    fn project_filters_sorts_and_pages() {
        let schemas = vec![
            ColumnSchema::new("status", ColumnType::String),
            ColumnSchema::new("duration", ColumnType::Int),
        ];
        let columns = ColumnSetBuilder::new(&schemas).build();
        let rows = vec![
            Record::new("1").with("status", "SUCCESS").with("duration", 5_i64),
            Record::new("2").with("status", "FAILED").with("duration", 7_i64),
            Record::new("3").with("status", "SUCCESS").with("duration", 9_i64),
            Record::new("4").with("status", "SUCCESS"),
        ];
        let mut view = View::default_view();
        view.filters = vec![Filter::new("status", operator::EQUAL, "SUCCESS")];
        view.sort_by = Some("duration".to_string());
        view.sort_direction = SortDirection::Desc;
        view.page_size = 2;
        view.columns = vec!["duration".to_string()];

        let registry = OperatorRegistry::default();
        let projection = view.project(&columns, &registry, &rows);
        assert_eq!(projection.page.total, 3);
        assert_eq!(projection.headers(), vec!["duration"]);
        assert_eq!(projection.cells(), vec![vec!["9".to_string()], vec!["5".to_string()]]);

        view.page = 1;
        let projection = view.project(&columns, &registry, &rows);
        let ids: Vec<&str> = projection.page.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["4"]);
    }
}
