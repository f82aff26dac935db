//! Physical and virtual columns and the `InputColumn` handle components
//! consume them through.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::data::DataType;
use crate::job::ComponentId;

/// A column declared on a source table.
///
/// Identity is the `(table, name)` pair; the declared type and key flag do
/// not participate in equality, so re-declaring a column with a refined type
/// still refers to the same column.
#[derive(Debug, Clone, Serialize)]
pub struct SourceColumn {
    table: String,
    name: String,
    data_type: DataType,
    primary_key: bool,
}

impl SourceColumn {
    /// Creates a new source column on the given table.
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            data_type,
            primary_key: false,
        }
    }

    /// Marks the column as part of the table's primary key.
    pub fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// The table the column belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared value type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Whether the column is part of the table's primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

impl PartialEq for SourceColumn {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Eq for SourceColumn {}

impl Hash for SourceColumn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for SourceColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// A column produced by a transformer rather than read from a table.
///
/// Identity is the `(producer, name)` pair, so two transformers emitting a
/// column of the same name stay distinct.
#[derive(Debug, Clone)]
pub struct VirtualColumn {
    producer: ComponentId,
    name: String,
    data_type: DataType,
}

impl VirtualColumn {
    /// Creates a new virtual column emitted by the given component.
    pub fn new(producer: ComponentId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            producer,
            name: name.into(),
            data_type,
        }
    }

    /// The component that emits this column.
    pub fn producer(&self) -> ComponentId {
        self.producer
    }

    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared value type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

impl PartialEq for VirtualColumn {
    fn eq(&self, other: &Self) -> bool {
        self.producer == other.producer && self.name == other.name
    }
}

impl Eq for VirtualColumn {}

impl Hash for VirtualColumn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.producer.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for VirtualColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.producer)
    }
}

/// A column handle, physical or virtual, as consumed by components.
///
/// Cheap to clone; equality follows the identity rules of the wrapped
/// column, never pointer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputColumn {
    /// A column of a declared source table.
    Physical(Arc<SourceColumn>),
    /// A column emitted by an upstream transformer.
    Virtual(Arc<VirtualColumn>),
}

impl InputColumn {
    /// The column name.
    pub fn name(&self) -> &str {
        match self {
            InputColumn::Physical(column) => column.name(),
            InputColumn::Virtual(column) => column.name(),
        }
    }

    /// The declared value type.
    pub fn data_type(&self) -> DataType {
        match self {
            InputColumn::Physical(column) => column.data_type(),
            InputColumn::Virtual(column) => column.data_type(),
        }
    }

    /// The owning table, for physical columns.
    pub fn table(&self) -> Option<&str> {
        match self {
            InputColumn::Physical(column) => Some(column.table()),
            InputColumn::Virtual(_) => None,
        }
    }

    /// The producing component, for virtual columns.
    pub fn producer(&self) -> Option<ComponentId> {
        match self {
            InputColumn::Physical(_) => None,
            InputColumn::Virtual(column) => Some(column.producer()),
        }
    }

    /// Checks if this is a physical column.
    pub fn is_physical(&self) -> bool {
        matches!(self, InputColumn::Physical(_))
    }

    /// Checks if this is a virtual column.
    pub fn is_virtual(&self) -> bool {
        matches!(self, InputColumn::Virtual(_))
    }
}

impl From<Arc<SourceColumn>> for InputColumn {
    fn from(column: Arc<SourceColumn>) -> Self {
        InputColumn::Physical(column)
    }
}

impl From<Arc<VirtualColumn>> for InputColumn {
    fn from(column: Arc<VirtualColumn>) -> Self {
        InputColumn::Virtual(column)
    }
}

impl fmt::Display for InputColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputColumn::Physical(column) => write!(f, "{column}"),
            InputColumn::Virtual(column) => write!(f, "{column}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_column_identity_ignores_type() {
        let a = SourceColumn::new("people", "age", DataType::Integer);
        let b = SourceColumn::new("people", "age", DataType::Text).with_primary_key();
        assert_eq!(a, b);
    }

    #[test]
    fn test_virtual_columns_distinct_per_producer() {
        let first = VirtualColumn::new(ComponentId::new(1), "token", DataType::Text);
        let second = VirtualColumn::new(ComponentId::new(2), "token", DataType::Text);
        assert_ne!(first, second);
        assert_eq!(
            first,
            VirtualColumn::new(ComponentId::new(1), "token", DataType::Integer)
        );
    }

    #[test]
    fn test_input_column_equality_never_crosses_kinds() {
        let physical = InputColumn::Physical(Arc::new(SourceColumn::new(
            "people",
            "name",
            DataType::Text,
        )));
        let virtual_column = InputColumn::Virtual(Arc::new(VirtualColumn::new(
            ComponentId::new(1),
            "name",
            DataType::Text,
        )));
        assert_ne!(physical, virtual_column);
        assert!(physical.is_physical());
        assert_eq!(virtual_column.producer(), Some(ComponentId::new(1)));
    }
}
