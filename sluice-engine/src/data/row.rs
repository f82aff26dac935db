//! Rows, row identity and the per-table column layout.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::data::{InputColumn, Value};

/// First id handed out for transformer-emitted rows.
///
/// Physical ids count up from 1, virtual ids from here; the two counter
/// spaces share the u64 range without overlapping.
pub const VIRTUAL_ROW_ID_BASE: u64 = 1 << 62;

/// Identity of a row within one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowId(u64);

impl RowId {
    /// Creates a row id from its numeric value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The numeric value of the id.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Checks if the id was allocated for a transformer-emitted row.
    pub fn is_virtual(&self) -> bool {
        self.0 >= VIRTUAL_ROW_ID_BASE
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates row ids for one table pipeline.
///
/// Physical ids are strictly increasing in stream order; virtual ids come
/// from a disjoint counter so fan-out rows never collide with source rows.
#[derive(Debug)]
pub struct RowIdAllocator {
    physical: AtomicU64,
    synthetic: AtomicU64,
}

impl RowIdAllocator {
    /// Creates a fresh allocator with both counters at their base.
    pub fn new() -> Self {
        Self {
            physical: AtomicU64::new(1),
            synthetic: AtomicU64::new(VIRTUAL_ROW_ID_BASE),
        }
    }

    /// Next id for a row read from the source.
    pub fn next_physical(&self) -> RowId {
        RowId(self.physical.fetch_add(1, Ordering::Relaxed))
    }

    /// Next id for a transformer-emitted row.
    pub fn next_virtual(&self) -> RowId {
        RowId(self.synthetic.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RowIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen column ordering of one table pipeline.
///
/// Projected physical columns come first, followed by the virtual outputs
/// of each transformer in consumer order. Built once per run and shared.
#[derive(Debug)]
pub struct RowLayout {
    columns: Vec<InputColumn>,
    index: HashMap<InputColumn, usize>,
}

impl RowLayout {
    /// Builds a layout from the given column ordering.
    pub fn new(columns: Vec<InputColumn>) -> Self {
        let index = columns
            .iter()
            .cloned()
            .enumerate()
            .map(|(slot, column)| (column, slot))
            .collect();
        Self { columns, index }
    }

    /// Slot of the given column, if it is part of the layout.
    pub fn index_of(&self, column: &InputColumn) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// The columns in slot order.
    pub fn columns(&self) -> &[InputColumn] {
        &self.columns
    }

    /// Number of slots.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// One row in flight, sized to its pipeline's [`RowLayout`].
///
/// Slots of virtual columns hold [`Value::Null`] until their producing
/// transformer has run.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: RowId,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row with the given id and values.
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    /// The row's identity.
    pub fn id(&self) -> RowId {
        self.id
    }

    /// All slot values in layout order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value in the given slot.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the given column under the given layout.
    pub fn get<'a>(&'a self, layout: &RowLayout, column: &InputColumn) -> Option<&'a Value> {
        layout.index_of(column).and_then(|slot| self.value(slot))
    }

    /// A copy of this row under a new identity, as handed to transformer
    /// continuations.
    pub fn branch(&self, id: RowId) -> Row {
        Row {
            id,
            values: self.values.clone(),
        }
    }

    pub(crate) fn set_value(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }
}
