//! In-memory tables, the reference [`DataSource`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::data::{SourceColumn, Value};
use crate::error::{EngineError, Result};
use crate::sources::{DataSource, Predicate, RowStream};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<Arc<SourceColumn>>,
    rows: Vec<Vec<Value>>,
}

/// A [`DataSource`] over in-memory tables.
///
/// Projection and predicates are applied eagerly at scan time. Cheap to
/// clone and share; scans never observe later mutations because each scan
/// snapshots the rows it returns.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, MemoryTable>,
}

impl MemorySource {
    /// Creates a source with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, builder style. Row value vectors must be aligned with
    /// `columns`.
    pub fn with_table(
        mut self,
        name: impl Into<String>,
        columns: Vec<SourceColumn>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.add_table(name, columns, rows);
        self
    }

    /// Adds a table.
    pub fn add_table(
        &mut self,
        name: impl Into<String>,
        columns: Vec<SourceColumn>,
        rows: Vec<Vec<Value>>,
    ) {
        self.tables.insert(
            name.into(),
            MemoryTable {
                columns: columns.into_iter().map(Arc::new).collect(),
                rows,
            },
        );
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::source_error(format!("No table named '{name}'")))
    }

    fn column_index(table: &MemoryTable, column: &SourceColumn) -> Result<usize> {
        table
            .columns
            .iter()
            .position(|candidate| candidate.as_ref() == column)
            .ok_or_else(|| {
                EngineError::source_error(format!("Table has no column named '{column}'"))
            })
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn scan(
        &self,
        table: &str,
        projection: &[Arc<SourceColumn>],
        predicates: &[Predicate],
    ) -> Result<Box<dyn RowStream>> {
        let table_data = self.table(table)?;

        let projected: Vec<usize> = projection
            .iter()
            .map(|column| Self::column_index(table_data, column))
            .collect::<Result<_>>()?;
        let filters: Vec<(usize, &Predicate)> = predicates
            .iter()
            .map(|predicate| {
                Self::column_index(table_data, predicate.column()).map(|slot| (slot, predicate))
            })
            .collect::<Result<_>>()?;

        let rows: Vec<Vec<Value>> = table_data
            .rows
            .iter()
            .filter(|row| {
                filters
                    .iter()
                    .all(|(slot, predicate)| predicate.matches(&row[*slot]))
            })
            .map(|row| projected.iter().map(|slot| row[*slot].clone()).collect())
            .collect();

        trace!(
            source.table = table,
            scan.rows = rows.len(),
            scan.predicates = predicates.len(),
            "Opened in-memory scan"
        );
        Ok(Box::new(MemoryRowStream {
            rows: rows.into_iter(),
        }))
    }

    async fn row_count(&self, table: &str) -> Result<Option<u64>> {
        Ok(Some(self.table(table)?.rows.len() as u64))
    }

    fn description(&self) -> String {
        format!("in-memory source ({} tables)", self.tables.len())
    }
}

#[derive(Debug)]
struct MemoryRowStream {
    rows: std::vec::IntoIter<Vec<Value>>,
}

#[async_trait]
impl RowStream for MemoryRowStream {
    async fn next_values(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.next())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
