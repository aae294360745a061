//! In-memory backends backed by [`DashMap`].
//!
//! [`InMemoryRecordSource`] answers scans with the same filter, sort and
//! pagination code the grid uses client-side, so a view behaves identically
//! against it and against a conforming remote service.

use async_trait::async_trait;
use dashmap::DashMap;
use viewgrid_core::column::ColumnSetBuilder;
use viewgrid_core::filter::{sort_rows, CompiledQuery};
use viewgrid_core::{ColumnSchema, OperatorRegistry, Record, ScanPage, ScanRequest, SchemaSet};

use crate::traits::{RecordSource, ViewConfigStore};

/// Record source over tables held in memory.
#[derive(Default)]
pub struct InMemoryRecordSource {
    tables: DashMap<String, Vec<Record>>,
    schemas: DashMap<String, Vec<ColumnSchema>>,
    registry: OperatorRegistry,
}

impl InMemoryRecordSource {
    /// Creates a source with no tables and the built-in operators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a table's rows and declared schemas.
    pub fn insert_table(&self, table: &str, schemas: Vec<ColumnSchema>, records: Vec<Record>) {
        self.schemas.insert(table.to_string(), schemas);
        self.tables.insert(table.to_string(), records);
    }

    /// Appends rows to a table, creating it if needed.
    pub fn append(&self, table: &str, records: impl IntoIterator<Item = Record>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(records);
    }

    /// Declared schemas merged with schemas inferred from the rows.
    fn schemas_for(&self, table: &str, rows: &[Record]) -> Vec<ColumnSchema> {
        let mut set = SchemaSet::new();
        if let Some(declared) = self.schemas.get(table) {
            set.merge(declared.iter().cloned());
        }
        for record in rows {
            let inferred: Vec<ColumnSchema> = record
                .values
                .iter()
                .filter(|(name, _)| set.get(name).is_none())
                .map(|(name, value)| ColumnSchema::new(name.clone(), value.column_type()))
                .collect();
            set.merge(inferred);
        }
        set.schemas().to_vec()
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn scan(&self, table: &str, request: &ScanRequest) -> anyhow::Result<ScanPage> {
        let Some(rows) = self.tables.get(table) else {
            anyhow::bail!("unknown table: {table}");
        };
        let column_types = self.schemas_for(table, &rows);
        let columns = ColumnSetBuilder::new(&column_types).build();

        let query = CompiledQuery::compile(&request.filters, &columns, &self.registry);
        let mut matched = query.filter(rows.iter());
        if let Some(sort_by) = &request.sort_by {
            if let Some(column) = columns.get(sort_by) {
                sort_rows(&mut matched, column, request.sort_direction);
            }
        }

        let total = matched.len();
        let start = usize::try_from(request.start).unwrap_or(usize::MAX).min(total);
        let limit = if request.limit == 0 {
            total
        } else {
            request.limit as usize
        };
        let end = start.saturating_add(limit).min(total);
        let records: Vec<Record> = matched[start..end].iter().map(|&r| r.clone()).collect();

        tracing::debug!(table, start, returned = records.len(), total, "in-memory scan");
        Ok(ScanPage {
            records,
            column_types,
            next_cursor: (end < total).then_some(end as u64),
            total: Some(total as u64),
        })
    }
}

/// View config blobs held in memory.
#[derive(Debug, Default)]
pub struct InMemoryViewConfigStore {
    blobs: DashMap<String, String>,
}

impl InMemoryViewConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether no blob is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ViewConfigStore for InMemoryViewConfigStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.blobs.get(key).map(|blob| blob.clone()))
    }

    async fn store(&self, key: &str, content: &str) -> anyhow::Result<()> {
        self.blobs.insert(key.to_string(), content.to_string());
        Ok(())
    }
}
