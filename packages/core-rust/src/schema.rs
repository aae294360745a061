//! Column schemas discovered from the remote store.
//!
//! The schema is open: every scan may report attributes that were not seen
//! before. [`SchemaSet`] accumulates them in first-seen order so descriptor
//! order stays stable while the set grows.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Scalar;

/// Declared type of a record attribute.
///
/// Serialized as the upper-case name (`"STRING"`, `"INT"`, ...). Any other
/// name deserializes to [`ColumnType::Unknown`] instead of failing, so one
/// malformed schema entry never rejects a whole scan response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    String,
    Int,
    Float,
    Bool,
    Bytes,
    Object,
    /// Unrecognized declared type, kept verbatim.
    Unknown(String),
}

impl ColumnType {
    /// Wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "STRING",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Bool => "BOOL",
            Self::Bytes => "BYTES",
            Self::Object => "OBJECT",
            Self::Unknown(name) => name,
        }
    }

    /// Whether values of this type are numbers.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl From<String> for ColumnType {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => Self::String,
            "INT" => Self::Int,
            "FLOAT" => Self::Float,
            "BOOL" => Self::Bool,
            "BYTES" => Self::Bytes,
            "OBJECT" => Self::Object,
            _ => Self::Unknown(name),
        }
    }
}

impl From<ColumnType> for String {
    fn from(column_type: ColumnType) -> Self {
        column_type.as_str().to_string()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared name and type of one attribute across a record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    /// Attribute name, e.g. `sys/id`.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Known categorical values, used to prefill filter pickers.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hint_values: Vec<Scalar>,
}

impl ColumnSchema {
    /// Creates a schema entry without hint values.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            hint_values: Vec::new(),
        }
    }

    /// Builder-style hint values setter.
    #[must_use]
    pub fn with_hints(mut self, hints: Vec<Scalar>) -> Self {
        self.hint_values = hints;
        self
    }
}

/// Growing union of all column schemas observed for one table.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: Vec<ColumnSchema>,
    index: HashMap<String, usize>,
}

impl SchemaSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges newly reported schemas and returns how many names were new.
    ///
    /// Unseen names append in arrival order. A known name keeps its position;
    /// its type is replaced by the latest declaration and hint values are
    /// unioned.
    pub fn merge<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = ColumnSchema>,
    {
        let mut added = 0;
        for schema in incoming {
            if let Some(&pos) = self.index.get(&schema.name) {
                let existing = &mut self.schemas[pos];
                existing.column_type = schema.column_type;
                for hint in schema.hint_values {
                    if !existing.hint_values.contains(&hint) {
                        existing.hint_values.push(hint);
                    }
                }
            } else {
                self.index.insert(schema.name.clone(), self.schemas.len());
                self.schemas.push(schema);
                added += 1;
            }
        }
        if added > 0 {
            tracing::debug!(added, total = self.schemas.len(), "schema grew");
        }
        added
    }

    /// All schemas in first-seen order.
    #[must_use]
    pub fn schemas(&self) -> &[ColumnSchema] {
        &self.schemas
    }

    /// Looks up a schema by attribute name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnSchema> {
        self.index.get(name).map(|&pos| &self.schemas[pos])
    }

    /// Number of known attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no attribute has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Drops everything, e.g. when the grid switches to another table.
    pub fn clear(&mut self) {
        self.schemas.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_parses_known_names_case_insensitively() {
        let t: ColumnType = serde_json::from_str(r#""float""#).unwrap();
        assert_eq!(t, ColumnType::Float);
        assert_eq!(serde_json::to_string(&ColumnType::Bool).unwrap(), r#""BOOL""#);
    }

    #[test]
    fn column_type_keeps_unknown_names() {
        let t: ColumnType = serde_json::from_str(r#""TENSOR""#).unwrap();
        assert_eq!(t, ColumnType::Unknown("TENSOR".to_string()));
        assert_eq!(serde_json::to_string(&t).unwrap(), r#""TENSOR""#);
    }

    #[test]
    fn column_schema_wire_shape() {
        let schema: ColumnSchema =
            serde_json::from_str(r#"{"name":"status","type":"STRING","hintValues":["A","B"]}"#)
                .unwrap();
        assert_eq!(schema.name, "status");
        assert_eq!(schema.column_type, ColumnType::String);
        assert_eq!(schema.hint_values.len(), 2);
    }

    #[test]
    fn merge_appends_new_names_in_arrival_order() {
        let mut set = SchemaSet::new();
        let added = set.merge(vec![
            ColumnSchema::new("b", ColumnType::Int),
            ColumnSchema::new("a", ColumnType::String),
        ]);
        assert_eq!(added, 2);
        let added = set.merge(vec![
            ColumnSchema::new("a", ColumnType::String),
            ColumnSchema::new("c", ColumnType::Float),
        ]);
        assert_eq!(added, 1);
        let names: Vec<&str> = set.schemas().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn merge_replaces_type_in_place_and_unions_hints() {
        let mut set = SchemaSet::new();
        set.merge(vec![
            ColumnSchema::new("x", ColumnType::Int).with_hints(vec![Scalar::Int(1)]),
            ColumnSchema::new("y", ColumnType::Int),
        ]);
        set.merge(vec![
            ColumnSchema::new("x", ColumnType::Float)
                .with_hints(vec![Scalar::Int(1), Scalar::Int(2)]),
        ]);
        let x = set.get("x").unwrap();
        assert_eq!(x.column_type, ColumnType::Float);
        assert_eq!(x.hint_values, vec![Scalar::Int(1), Scalar::Int(2)]);
        assert_eq!(set.schemas()[0].name, "x");
        assert_eq!(set.len(), 2);
    }
}
