//! The source boundary: how row data enters the engine.
//!
//! The engine is deliberately ignorant of where rows come from. A
//! [`DataSource`] opens one forward-only [`RowStream`] per table scan,
//! honoring a column projection and an optional conjunction of push-down
//! [`Predicate`]s; everything else about drivers, files or connections is
//! the implementor's business. [`MemorySource`] is the reference
//! implementation used throughout the tests and demos.

use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::data::{SourceColumn, Value};
use crate::error::Result;

mod memory;

pub use memory::MemorySource;

/// Comparison operator of a push-down predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn evaluate(&self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            (CompareOp::Eq, Some(Equal)) => true,
            (CompareOp::NotEq, Some(Less | Greater)) => true,
            (CompareOp::Lt, Some(Less)) => true,
            (CompareOp::LtEq, Some(Less | Equal)) => true,
            (CompareOp::Gt, Some(Greater)) => true,
            (CompareOp::GtEq, Some(Greater | Equal)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{symbol}")
    }
}

/// One column comparison a source can apply while scanning, sparing the
/// engine from reading rows a pushed-down filter would discard anyway.
#[derive(Debug, Clone)]
pub struct Predicate {
    column: Arc<SourceColumn>,
    op: CompareOp,
    value: Value,
}

impl Predicate {
    /// Creates a predicate comparing `column` against `value`.
    pub fn new(column: Arc<SourceColumn>, op: CompareOp, value: Value) -> Self {
        Self { column, op, value }
    }

    /// The compared column.
    pub fn column(&self) -> &Arc<SourceColumn> {
        &self.column
    }

    /// The comparison operator.
    pub fn op(&self) -> CompareOp {
        self.op
    }

    /// The comparison value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Evaluates the predicate against a cell value.
    ///
    /// `Null` cells fail every comparison, including `!=`, the way SQL
    /// predicates treat NULL.
    pub fn matches(&self, cell: &Value) -> bool {
        self.op.evaluate(cell.compare(&self.value))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// A table-shaped data source.
///
/// Implementations should apply the projection and predicates as close to
/// the data as they can; a source that cannot evaluate a predicate must
/// not be handed one, which the engine guarantees by only pushing
/// predicates the filter itself derived.
#[async_trait]
pub trait DataSource: Debug + Send + Sync {
    /// Opens a forward-only stream over `table`.
    ///
    /// Returned value vectors are aligned with `projection`. When
    /// `predicates` is non-empty the stream must yield exactly the rows
    /// matching all of them.
    async fn scan(
        &self,
        table: &str,
        projection: &[Arc<SourceColumn>],
        predicates: &[Predicate],
    ) -> Result<Box<dyn RowStream>>;

    /// Number of rows a full scan of `table` would yield, when the source
    /// can answer cheaply. Used for progress reporting only.
    async fn row_count(&self, table: &str) -> Result<Option<u64>> {
        let _ = table;
        Ok(None)
    }

    /// Returns a human-readable description of this data source.
    fn description(&self) -> String;
}

/// A forward-only cursor over one table scan.
///
/// Streams are scoped resources: the engine calls [`RowStream::close`]
/// exactly once, on success and on failure alike.
#[async_trait]
pub trait RowStream: Debug + Send {
    /// The next row's values, or `None` once the scan is exhausted.
    async fn next_values(&mut self) -> Result<Option<Vec<Value>>>;

    /// Releases whatever the scan holds.
    async fn close(&mut self) -> Result<()>;
}
