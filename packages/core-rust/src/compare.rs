//! Side-by-side comparison of selected rows.
//!
//! Each selected row (possibly from a different table) gets a column prefix
//! `{label}-{rowId}@`, where the label is the row's identity attribute
//! (`modelName` by default) or its table name. The plan's union column set
//! holds every source column under its prefix, so columns never collide and
//! a column known to one source simply stays blank for the others.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::column::{ColumnSet, ColumnSetBuilder};
use crate::schema::ColumnSchema;
use crate::value::{Record, RowId, Scalar};

/// Attribute read for a row's compare label by default.
pub const DEFAULT_IDENTITY_ATTRIBUTE: &str = "modelName";

/// One selected row to compare, with the schemas of its table.
#[derive(Debug, Clone, Copy)]
pub struct CompareInput<'a> {
    pub record: &'a Record,
    pub table: &'a str,
    pub schemas: &'a [ColumnSchema],
}

/// A source of the comparison and the prefix its columns carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareTable {
    pub table_name: String,
    pub column_prefix: String,
}

/// Result of planning a comparison.
#[derive(Debug, Clone)]
pub struct ComparePlan {
    /// Sources in input order, one per distinct prefix.
    pub tables: Vec<CompareTable>,
    /// Every source column under its prefix.
    pub union_columns: ColumnSet,
}

/// Builds compare plans.
#[derive(Debug, Clone)]
pub struct CompareEngine {
    identity_attribute: String,
}

impl Default for CompareEngine {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_ATTRIBUTE)
    }
}

impl CompareEngine {
    /// An engine labelling rows by `identity_attribute`.
    #[must_use]
    pub fn new(identity_attribute: impl Into<String>) -> Self {
        Self {
            identity_attribute: identity_attribute.into(),
        }
    }

    /// The column prefix for one row: `{label}-{rowId}@`.
    #[must_use]
    pub fn prefix_for(&self, record: &Record, table: &str) -> String {
        let label = record
            .get(&self.identity_attribute)
            .map(Scalar::to_display_string)
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| table.to_string());
        format!("{label}-{}@", record.id)
    }

    /// Plans a comparison. The same inputs always produce the same plan.
    #[must_use]
    pub fn plan(&self, inputs: &[CompareInput<'_>]) -> ComparePlan {
        let mut tables: Vec<CompareTable> = Vec::with_capacity(inputs.len());
        let mut schemas = Vec::new();
        let mut titles = Vec::new();
        for input in inputs {
            let prefix = self.prefix_for(input.record, input.table);
            if tables.iter().any(|t| t.column_prefix == prefix) {
                tracing::debug!(prefix = %prefix, "duplicate compare source collapsed");
                continue;
            }
            for schema in input.schemas {
                let key = format!("{prefix}{}", schema.name);
                titles.push((key.clone(), format!("{prefix}{}", short_name(&schema.name))));
                schemas.push(ColumnSchema {
                    name: key,
                    column_type: schema.column_type.clone(),
                    hint_values: schema.hint_values.clone(),
                });
            }
            tables.push(CompareTable {
                table_name: input.table.to_string(),
                column_prefix: prefix,
            });
        }

        let union_columns = titles
            .into_iter()
            .fold(ColumnSetBuilder::new(&schemas), |builder, (key, title)| {
                builder.with_title(key, title)
            })
            .build();
        ComparePlan {
            tables,
            union_columns,
        }
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

impl ComparePlan {
    /// Merges per-source rows into prefixed rows the union columns can read.
    ///
    /// `sources[i]` holds the rows of `tables[i]`; extra sources are ignored.
    /// With a `join_key`, rows sharing that attribute's value line up (the
    /// n-th occurrence in each source joins the n-th aligned row) and the
    /// aligned row carries the key unprefixed. Rows without the key, or all
    /// rows when there is no join key, line up by position. No input row is
    /// dropped.
    #[must_use]
    pub fn align(&self, sources: &[Vec<Record>], join_key: Option<&str>) -> Vec<Record> {
        let mut alignment = Alignment::default();

        for (table, rows) in self.tables.iter().zip(sources) {
            let mut seen: HashMap<String, usize> = HashMap::new();
            let mut unkeyed = 0usize;
            for record in rows {
                let keyed = join_key.and_then(|k| record.get(k).map(|v| (k, v)));
                let slot = match keyed {
                    Some((attribute, value)) => {
                        // Typed form, so `1` and `"1"` stay apart.
                        let key = serde_json::to_string(value).unwrap_or_default();
                        let occurrence = seen.entry(key.clone()).or_insert(0);
                        let slot = alignment.keyed_slot(key, *occurrence, attribute, value);
                        *occurrence += 1;
                        slot
                    }
                    None => {
                        let slot = alignment.positional_slot(unkeyed, join_key.is_some());
                        unkeyed += 1;
                        slot
                    }
                };
                let target = &mut alignment.rows[slot].values;
                for (attribute, value) in &record.values {
                    target.insert(format!("{}{attribute}", table.column_prefix), value.clone());
                }
            }
        }
        alignment.rows
    }
}

/// Rows being aligned. Joined and positional rows are indexed separately,
/// so their ids never decide which row a source row lands in.
#[derive(Default)]
struct Alignment {
    rows: Vec<Record>,
    ids: HashSet<String>,
    by_key: HashMap<String, Vec<usize>>,
    positional: Vec<usize>,
}

impl Alignment {
    /// Slot of the `occurrence`-th row with join value `key`.
    fn keyed_slot(
        &mut self,
        key: String,
        occurrence: usize,
        attribute: &str,
        value: &Scalar,
    ) -> usize {
        if let Some(&slot) = self.by_key.get(&key).and_then(|slots| slots.get(occurrence)) {
            return slot;
        }
        let slot = self.push(&value.to_display_string());
        self.rows[slot]
            .values
            .insert(attribute.to_string(), value.clone());
        self.by_key.entry(key).or_default().push(slot);
        slot
    }

    /// Slot of the `n`-th positional row of a source.
    fn positional_slot(&mut self, n: usize, joined: bool) -> usize {
        if let Some(&slot) = self.positional.get(n) {
            return slot;
        }
        let slot = self.push(&if joined { format!("#{n}") } else { n.to_string() });
        self.positional.push(slot);
        slot
    }

    /// Appends an empty row; `id` gets a `~k` suffix if already taken.
    fn push(&mut self, id: &str) -> usize {
        let mut unique = id.to_string();
        let mut suffix = 1;
        while !self.ids.insert(unique.clone()) {
            unique = format!("{id}~{suffix}");
            suffix += 1;
        }
        self.rows.push(Record {
            id: RowId(unique),
            table: None,
            values: BTreeMap::new(),
        });
        self.rows.len() - 1
    }
}
