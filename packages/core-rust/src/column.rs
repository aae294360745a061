//! Column descriptors and the builder that derives them from schemas.
//!
//! A [`ColumnDescriptor`] is the only way the engine reads a record: it
//! extracts a typed value ([`ColumnDescriptor::extract`]), renders it as cell
//! text ([`ColumnDescriptor::render_cell`]) and describes how it can be
//! filtered ([`ColumnDescriptor::build_filter_options`]). The capability set
//! is selected by [`ColumnKind`], which is derived from the declared schema
//! type.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::operator::{Arity, OperatorRegistry};
use crate::schema::{ColumnSchema, ColumnType};
use crate::value::{Record, Scalar};

/// Key of the synthetic multi-select checkbox column.
pub const SELECTION_COLUMN_KEY: &str = "__select__";
/// Key of the synthetic row actions column.
pub const ACTIONS_COLUMN_KEY: &str = "__actions__";

/// Capability class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    String,
    Int,
    Float,
    Bool,
    Bytes,
    Object,
    /// Declared type was not recognized; values are shown as plain text.
    Raw,
    /// Synthetic checkbox column, carries no record data.
    Selection,
    /// Synthetic row actions column, carries no record data.
    Actions,
}

impl ColumnKind {
    /// Maps a declared schema type to its column kind.
    #[must_use]
    pub fn from_type(column_type: &ColumnType) -> Self {
        match column_type {
            ColumnType::String => Self::String,
            ColumnType::Int => Self::Int,
            ColumnType::Float => Self::Float,
            ColumnType::Bool => Self::Bool,
            ColumnType::Bytes => Self::Bytes,
            ColumnType::Object => Self::Object,
            ColumnType::Unknown(_) => Self::Raw,
        }
    }

    /// Whether the column is generated by the engine rather than a schema.
    #[must_use]
    pub fn is_synthetic(self) -> bool {
        matches!(self, Self::Selection | Self::Actions)
    }
}

/// Custom cell text renderer: `(value, record) -> text`.
pub type CellRenderer = Arc<dyn Fn(Option<&Scalar>, &Record) -> String + Send + Sync>;

/// Typed definition of how to extract, render and filter one attribute.
#[derive(Clone)]
pub struct ColumnDescriptor {
    /// Unique key within a [`ColumnSet`]; views reference columns by it.
    pub key: String,
    /// Header text.
    pub title: String,
    /// Capability class.
    pub kind: ColumnKind,
    /// Record attribute the value is read from.
    pub attribute: String,
    /// Known categorical values from the schema.
    pub hint_values: Vec<Scalar>,
    renderer: Option<CellRenderer>,
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("attribute", &self.attribute)
            .field("custom_renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl ColumnDescriptor {
    /// Creates a descriptor reading `attribute` under the same key.
    #[must_use]
    pub fn new(attribute: impl Into<String>, kind: ColumnKind) -> Self {
        let attribute = attribute.into();
        Self {
            key: attribute.clone(),
            title: default_title(&attribute).to_string(),
            kind,
            attribute,
            hint_values: Vec::new(),
            renderer: None,
        }
    }

    fn synthetic(key: &str, kind: ColumnKind) -> Self {
        Self {
            key: key.to_string(),
            title: String::new(),
            kind,
            attribute: String::new(),
            hint_values: Vec::new(),
            renderer: None,
        }
    }

    /// Builder-style key override (the attribute stays the same).
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Builder-style title override.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder-style renderer override.
    #[must_use]
    pub fn with_renderer(mut self, renderer: CellRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Reads this column's value from a record.
    ///
    /// Pure and total: a missing attribute, or a synthetic column, gives
    /// `None`. Raw columns stringify whatever they find.
    #[must_use]
    pub fn extract<'r>(&self, record: &'r Record) -> Option<Cow<'r, Scalar>> {
        if self.kind.is_synthetic() {
            return None;
        }
        let value = record.get(&self.attribute)?;
        match self.kind {
            ColumnKind::Raw => Some(Cow::Owned(Scalar::String(value.to_display_string()))),
            _ => Some(Cow::Borrowed(value)),
        }
    }

    /// Cell text for an extracted value.
    #[must_use]
    pub fn render_cell(&self, value: Option<&Scalar>, record: &Record) -> String {
        if let Some(renderer) = &self.renderer {
            return renderer(value, record);
        }
        value.map(Scalar::to_display_string).unwrap_or_default()
    }

    /// Convenience: extract then render.
    #[must_use]
    pub fn render_record(&self, record: &Record) -> String {
        let value = self.extract(record);
        self.render_cell(value.as_deref(), record)
    }

    /// Distinct values observed in `rows`, in first-seen order, at most
    /// `limit` of them.
    #[must_use]
    pub fn observed_values(&self, rows: &[Record], limit: usize) -> Vec<Scalar> {
        let mut seen: Vec<Scalar> = Vec::new();
        for row in rows {
            if seen.len() >= limit {
                break;
            }
            if let Some(value) = self.extract(row) {
                if !seen.contains(&*value) {
                    seen.push(value.into_owned());
                }
            }
        }
        seen
    }

    /// Describes how this column can be filtered.
    ///
    /// `registry` supplies the operator options; `value_options` are extra
    /// candidate values (typically [`observed_values`](Self::observed_values))
    /// merged after the schema hints. `None` when no operator applies.
    #[must_use]
    pub fn build_filter_options(
        &self,
        registry: &OperatorRegistry,
        value_options: &[Scalar],
    ) -> Option<FilterSpec> {
        if self.kind.is_synthetic() {
            return None;
        }
        let operators: Vec<OperatorOption> = registry
            .operators_for(self.kind)
            .into_iter()
            .map(|op| OperatorOption {
                id: op.id().to_string(),
                label: op.label().to_string(),
                arity: op.arity(),
            })
            .collect();
        if operators.is_empty() {
            return None;
        }
        let mut values = self.hint_values.clone();
        for value in value_options {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        Some(FilterSpec {
            property: self.key.clone(),
            title: self.title.clone(),
            kind: self.kind,
            operators,
            value_options: values,
        })
    }
}

/// An operator entry offered by a [`FilterSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorOption {
    pub id: String,
    pub label: String,
    #[serde(skip)]
    pub arity: Arity,
}

/// Filter editor description for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Column key a filter built from this spec refers to.
    pub property: String,
    pub title: String,
    pub kind: ColumnKind,
    pub operators: Vec<OperatorOption>,
    pub value_options: Vec<Scalar>,
}

fn default_title(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Ordered, key-indexed set of column descriptors.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
}

impl ColumnSet {
    /// Builds a set from descriptors. A repeated key replaces the earlier
    /// descriptor in place.
    #[must_use]
    pub fn from_descriptors(descriptors: Vec<ColumnDescriptor>) -> Self {
        let mut set = Self::default();
        for descriptor in descriptors {
            set.upsert(descriptor);
        }
        set
    }

    fn upsert(&mut self, descriptor: ColumnDescriptor) {
        if let Some(&pos) = self.index.get(&descriptor.key) {
            self.columns[pos] = descriptor;
        } else {
            self.index.insert(descriptor.key.clone(), self.columns.len());
            self.columns.push(descriptor);
        }
    }

    /// Looks up a descriptor by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ColumnDescriptor> {
        self.index.get(key).map(|&pos| &self.columns[pos])
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in display order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.key.as_str())
    }

    /// Descriptors in display order.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolves a view's column list. Unknown keys are skipped; an empty list
    /// selects every column.
    #[must_use]
    pub fn project(&self, keys: &[String]) -> Vec<&ColumnDescriptor> {
        if keys.is_empty() {
            return self.columns.iter().collect();
        }
        keys.iter().filter_map(|key| self.get(key)).collect()
    }

    /// Filter specs for every filterable column, with up to
    /// `values_per_column` observed values from `rows` each.
    #[must_use]
    pub fn filter_specs(
        &self,
        registry: &OperatorRegistry,
        rows: &[Record],
        values_per_column: usize,
    ) -> Vec<FilterSpec> {
        self.columns
            .iter()
            .filter_map(|column| {
                let observed = column.observed_values(rows, values_per_column);
                column.build_filter_options(registry, &observed)
            })
            .collect()
    }
}

/// Derives a [`ColumnSet`] from column schemas.
///
/// Output order is stable for a fixed input: schema order, or allow-list
/// order when an allow-list is set, with the selection column first and the
/// actions column last.
pub struct ColumnSetBuilder<'a> {
    schemas: &'a [ColumnSchema],
    allow_list: Option<Vec<String>>,
    selection: bool,
    actions: bool,
    renderers: HashMap<String, CellRenderer>,
    titles: HashMap<String, String>,
}

impl<'a> ColumnSetBuilder<'a> {
    /// Starts a builder over `schemas`.
    #[must_use]
    pub fn new(schemas: &'a [ColumnSchema]) -> Self {
        Self {
            schemas,
            allow_list: None,
            selection: false,
            actions: false,
            renderers: HashMap::new(),
            titles: HashMap::new(),
        }
    }

    /// Restricts and orders the output to these keys.
    #[must_use]
    pub fn allow_list<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Prepends the multi-select checkbox column.
    #[must_use]
    pub fn with_selection_column(mut self) -> Self {
        self.selection = true;
        self
    }

    /// Appends the row actions column.
    #[must_use]
    pub fn with_actions_column(mut self) -> Self {
        self.actions = true;
        self
    }

    /// Overrides cell rendering for one key. A later call for the same key
    /// wins.
    #[must_use]
    pub fn with_renderer(mut self, key: impl Into<String>, renderer: CellRenderer) -> Self {
        self.renderers.insert(key.into(), renderer);
        self
    }

    /// Overrides the header text for one key.
    #[must_use]
    pub fn with_title(mut self, key: impl Into<String>, title: impl Into<String>) -> Self {
        self.titles.insert(key.into(), title.into());
        self
    }

    /// Builds the column set.
    #[must_use]
    pub fn build(mut self) -> ColumnSet {
        let mut by_name: HashMap<&str, ColumnDescriptor> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for schema in self.schemas {
            let kind = ColumnKind::from_type(&schema.column_type);
            if let ColumnType::Unknown(declared) = &schema.column_type {
                tracing::warn!(
                    column = %schema.name,
                    declared = %declared,
                    "unknown column type, falling back to raw text"
                );
            }
            let mut descriptor = ColumnDescriptor::new(schema.name.clone(), kind);
            descriptor.hint_values.clone_from(&schema.hint_values);
            if by_name.insert(schema.name.as_str(), descriptor).is_none() {
                order.push(schema.name.as_str());
            }
        }

        let selected: Vec<&str> = match &self.allow_list {
            Some(keys) => keys
                .iter()
                .filter_map(|key| {
                    let known = by_name.contains_key(key.as_str());
                    if !known {
                        tracing::debug!(column = %key, "allow-listed column not in schema");
                    }
                    order.iter().copied().find(|name| *name == key.as_str())
                })
                .collect(),
            None => order,
        };

        let mut descriptors = Vec::with_capacity(selected.len() + 2);
        if self.selection {
            descriptors.push(ColumnDescriptor::synthetic(
                SELECTION_COLUMN_KEY,
                ColumnKind::Selection,
            ));
        }
        for name in selected {
            let Some(mut descriptor) = by_name.remove(name) else {
                continue;
            };
            if let Some(title) = self.titles.remove(name) {
                descriptor.title = title;
            }
            if let Some(renderer) = self.renderers.remove(name) {
                descriptor.renderer = Some(renderer);
            }
            descriptors.push(descriptor);
        }
        if self.actions {
            descriptors.push(ColumnDescriptor::synthetic(
                ACTIONS_COLUMN_KEY,
                ColumnKind::Actions,
            ));
        }
        ColumnSet::from_descriptors(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator;

    fn schemas() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("sys/id", ColumnType::String),
            ColumnSchema::new("status", ColumnType::String)
                .with_hints(vec![Scalar::from("SUCCESS"), Scalar::from("FAILED")]),
            ColumnSchema::new("duration", ColumnType::Float),
            ColumnSchema::new("blob", ColumnType::Unknown("TENSOR".to_string())),
        ]
    }

    #[test]
    fn build_keeps_schema_order_and_adds_synthetic_columns() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas)
            .with_selection_column()
            .with_actions_column()
            .build();
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(
            keys,
            vec![SELECTION_COLUMN_KEY, "sys/id", "status", "duration", "blob", ACTIONS_COLUMN_KEY]
        );
        assert_eq!(set.get("sys/id").unwrap().title, "id");
    }

    #[test]
    fn build_is_stable_across_runs() {
        let schemas = schemas();
        let a: Vec<String> = ColumnSetBuilder::new(&schemas)
            .build()
            .keys()
            .map(str::to_string)
            .collect();
        let b: Vec<String> = ColumnSetBuilder::new(&schemas)
            .build()
            .keys()
            .map(str::to_string)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn allow_list_orders_and_skips_unknown_keys() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas)
            .allow_list(["duration", "missing", "sys/id"])
            .build();
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys, vec!["duration", "sys/id"]);
    }

    #[test]
    fn duplicate_schema_names_collapse_and_last_type_wins() {
        let schemas = vec![
            ColumnSchema::new("a", ColumnType::Int),
            ColumnSchema::new("b", ColumnType::Int),
            ColumnSchema::new("a", ColumnType::Float),
        ];
        let set = ColumnSetBuilder::new(&schemas).build();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a").unwrap().kind, ColumnKind::Float);
        assert_eq!(set.keys().next(), Some("a"));
    }

    #[test]
    fn unknown_type_degrades_to_raw_text() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas).build();
        let blob = set.get("blob").unwrap();
        assert_eq!(blob.kind, ColumnKind::Raw);
        let record = Record::new("r1").with("blob", 42_i64);
        assert_eq!(
            blob.extract(&record).as_deref(),
            Some(&Scalar::String("42".to_string()))
        );
    }

    #[test]
    fn extract_is_total() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas).with_selection_column().build();
        let empty = Record::new("r1");
        for column in set.iter() {
            assert!(column.extract(&empty).is_none());
        }
        let record = Record::new("r2").with("status", "SUCCESS");
        assert!(set.get(SELECTION_COLUMN_KEY).unwrap().extract(&record).is_none());
    }

    #[test]
    fn renderer_override_last_writer_wins() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas)
            .with_renderer(
                "status",
                Arc::new(|_: Option<&Scalar>, _: &Record| "first".to_string()),
            )
            .with_renderer(
                "status",
                Arc::new(|v: Option<&Scalar>, _: &Record| {
                    format!("<{}>", v.map(Scalar::to_display_string).unwrap_or_default())
                }),
            )
            .build();
        let record = Record::new("r1").with("status", "SUCCESS");
        assert_eq!(set.get("status").unwrap().render_record(&record), "<SUCCESS>");
        assert_eq!(set.get("duration").unwrap().render_record(&record), "");
    }

    #[test]
    fn filter_options_merge_hints_with_observed_values() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas).with_selection_column().build();
        let registry = OperatorRegistry::default();
        let rows = vec![
            Record::new("1").with("status", "SUCCESS"),
            Record::new("2").with("status", "RUNNING"),
        ];
        let specs = set.filter_specs(&registry, &rows, 10);
        assert!(specs.iter().all(|s| s.property != SELECTION_COLUMN_KEY));
        let status = specs.iter().find(|s| s.property == "status").unwrap();
        assert_eq!(
            status.value_options,
            vec![Scalar::from("SUCCESS"), Scalar::from("FAILED"), Scalar::from("RUNNING")]
        );
        assert!(status.operators.iter().any(|o| o.id == operator::CONTAIN));
        let duration = specs.iter().find(|s| s.property == "duration").unwrap();
        assert!(duration.operators.iter().any(|o| o.id == operator::RANGE));
        assert!(duration.operators.iter().all(|o| o.id != operator::CONTAIN));
    }

    #[test]
    fn project_skips_unknown_keys() {
        let schemas = schemas();
        let set = ColumnSetBuilder::new(&schemas).build();
        let projected = set.project(&["status".to_string(), "gone".to_string()]);
        assert_eq!(projected.len(), 1);
        assert_eq!(set.project(&[]).len(), set.len());
    }
}
