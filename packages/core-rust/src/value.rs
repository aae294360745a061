//! Record values and row identity.
//!
//! A [`Record`] is an open mapping from attribute name to a typed [`Scalar`].
//! Records arrive from the remote store and are never mutated by the engine;
//! every column access goes through a
//! [`ColumnDescriptor`](crate::column::ColumnDescriptor).
//!
//! # JSON form
//!
//! Scalars serialize untagged: booleans, integers, floats and strings map to
//! their natural JSON types, binary data to `{"$bytes": "<base64>"}` and any
//! other JSON (objects, arrays) is carried verbatim as [`Scalar::Object`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::ColumnType;

/// Stable identifier of a row within its table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A typed cell value.
///
/// Equality is structural (`Int(1) != Float(1.0)`); filter operators use the
/// looser [`Scalar::loose_eq`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScalarRepr", into = "ScalarRepr")]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// UTF-8 string. Datetimes travel as ISO-8601 strings.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Nested JSON (objects and arrays), kept opaque.
    Object(serde_json::Value),
}

/// Untagged wire mirror of [`Scalar`]. Variant order matters: serde tries
/// them top to bottom.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ScalarRepr {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes {
        #[serde(rename = "$bytes")]
        bytes: String,
    },
    Object(serde_json::Value),
}

impl TryFrom<ScalarRepr> for Scalar {
    type Error = base64::DecodeError;

    fn try_from(repr: ScalarRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            ScalarRepr::Bool(b) => Self::Bool(b),
            ScalarRepr::Int(i) => Self::Int(i),
            ScalarRepr::Float(f) => Self::Float(f),
            ScalarRepr::String(s) => Self::String(s),
            ScalarRepr::Bytes { bytes } => Self::Bytes(BASE64.decode(bytes)?),
            ScalarRepr::Object(v) => Self::Object(v),
        })
    }
}

impl From<Scalar> for ScalarRepr {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => Self::Bool(b),
            Scalar::Int(i) => Self::Int(i),
            Scalar::Float(f) => Self::Float(f),
            Scalar::String(s) => Self::String(s),
            Scalar::Bytes(b) => Self::Bytes {
                bytes: BASE64.encode(b),
            },
            Scalar::Object(v) => Self::Object(v),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl Scalar {
    /// Converts a JSON value into a scalar. `null` maps to `None` (missing).
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s)),
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    let decoded = map
                        .get("$bytes")
                        .and_then(serde_json::Value::as_str)
                        .and_then(|encoded| BASE64.decode(encoded).ok());
                    if let Some(bytes) = decoded {
                        return Some(Self::Bytes(bytes));
                    }
                }
                Some(Self::Object(serde_json::Value::Object(map)))
            }
            other @ serde_json::Value::Array(_) => Some(Self::Object(other)),
        }
    }

    /// The column type this value naturally belongs to.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Bool(_) => ColumnType::Bool,
            Self::Int(_) => ColumnType::Int,
            Self::Float(_) => ColumnType::Float,
            Self::String(_) => ColumnType::String,
            Self::Bytes(_) => ColumnType::Bytes,
            Self::Object(_) => ColumnType::Object,
        }
    }

    /// Numeric view of the value, if it is an `Int` or `Float`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of the value, if it is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Plain-text form used by raw-string columns and default cell rendering.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => BASE64.encode(b),
            Self::Object(v) => v.to_string(),
        }
    }

    /// Reinterprets a string operand as the type of `like`.
    ///
    /// Filter values typed into a text box arrive as strings; comparing them
    /// against numeric or boolean cells needs the parsed form. Returns a clone
    /// of `self` when no coercion applies and `None` when parsing fails.
    #[must_use]
    pub fn coerce_like(&self, like: &Scalar) -> Option<Scalar> {
        let Self::String(text) = self else {
            return Some(self.clone());
        };
        let text = text.trim();
        match like {
            Self::Int(_) | Self::Float(_) => text
                .parse::<i64>()
                .map(Self::Int)
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(Self::Float)),
            Self::Bool(_) => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },
            _ => Some(self.clone()),
        }
    }

    /// Equality used by filter operators: numbers compare by value across
    /// `Int`/`Float`, everything else structurally.
    #[must_use]
    pub fn loose_eq(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    /// Ordering used by filter operators. `None` when the two values are not
    /// comparable (different families, booleans, bytes, objects).
    #[must_use]
    pub fn partial_order(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting rows.
    ///
    /// Values of different families are ranked bool < number < string <
    /// bytes < object, so a column with mixed types still sorts
    /// deterministically.
    #[must_use]
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            // Signed zeros are equal; NaNs still get a fixed place.
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Object(a), Self::Object(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) | Self::Float(_) => 1,
            Self::String(_) => 2,
            Self::Bytes(_) => 3,
            Self::Object(_) => 4,
        }
    }
}

/// Exact comparison of an integer with a float. Going through `f64` would
/// round integers above 2^53 and break transitivity.
#[allow(clippy::cast_possible_truncation)]
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float above every i64.
    const I64_END: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= I64_END {
        return Ordering::Less;
    }
    if float < -I64_END {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    int.cmp(&(whole as i64))
        .then_with(|| whole.partial_cmp(&float).unwrap_or(Ordering::Equal))
}

/// One row of data from the remote store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Row identity, unique within `table`.
    pub id: RowId,
    /// Source table the row was scanned from, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub table: Option<String>,
    /// Attribute values. `null` attributes are dropped on ingest.
    #[serde(default, deserialize_with = "deserialize_values")]
    pub values: BTreeMap<String, Scalar>,
}

fn deserialize_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, Scalar>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| Scalar::from_json(v).map(|s| (k, s)))
        .collect())
}

impl Record {
    /// Creates an empty record with the given id.
    #[must_use]
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            table: None,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    /// Builder-style source table setter.
    #[must_use]
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Looks up an attribute; `None` when absent.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Scalar> {
        self.values.get(attribute)
    }
}
