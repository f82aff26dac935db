//! The registry boundary: component descriptors, configured properties and
//! the factory that turns both into runnable instances.
//!
//! The engine consumes component metadata through these traits and never
//! reflects over implementations. How descriptors are discovered, and how a
//! factory injects configured properties into a concrete component, is the
//! host application's business.

use std::fmt;
use std::sync::Arc;

use crate::components::ComponentInstance;
use crate::data::{DataType, InputColumn, Value};
use crate::error::Result;
use crate::job::Category;

/// What a component does with rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Sorts each row into exactly one category.
    Filter,
    /// Emits derived values, fanning rows out or swallowing them.
    Transformer,
    /// Accumulates state across rows and produces a result.
    Analyzer,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Filter => "filter",
            ComponentKind::Transformer => "transformer",
            ComponentKind::Analyzer => "analyzer",
        };
        write!(f, "{name}")
    }
}

/// Declared shape of one configurable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A single value of the given type.
    Scalar(DataType),
    /// A list of values of the given type.
    List(DataType),
    /// A single input column; configuring it wires the component to data.
    Column,
    /// A list of input columns.
    ColumnList,
}

impl PropertyKind {
    /// Checks whether a configured value fits this shape, including the
    /// list-versus-scalar distinction.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (PropertyKind::Scalar(data_type), PropertyValue::Scalar(value)) => {
                data_type.matches(value)
            }
            (PropertyKind::List(data_type), PropertyValue::List(values)) => {
                values.iter().all(|value| data_type.matches(value))
            }
            (PropertyKind::Column, PropertyValue::Column(_)) => true,
            (PropertyKind::ColumnList, PropertyValue::ColumnList(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Scalar(data_type) => write!(f, "a {data_type} value"),
            PropertyKind::List(data_type) => write!(f, "a list of {data_type} values"),
            PropertyKind::Column => write!(f, "an input column"),
            PropertyKind::ColumnList => write!(f, "a list of input columns"),
        }
    }
}

/// One configurable property as declared by a descriptor.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    required: bool,
}

impl PropertyDescriptor {
    /// Declares a property that must be configured before the job freezes.
    pub fn required(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// Declares a property the component can run without.
    pub fn optional(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared shape.
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Whether the property must be configured.
    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// A configured property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A single plain value.
    Scalar(Value),
    /// A list of plain values.
    List(Vec<Value>),
    /// A single input column reference.
    Column(InputColumn),
    /// A list of input column references.
    ColumnList(Vec<InputColumn>),
}

impl PropertyValue {
    /// Short shape description for error messages.
    pub fn describe(&self) -> String {
        match self {
            PropertyValue::Scalar(value) => match value {
                Value::Null => "a Null value".to_string(),
                Value::Boolean(_) => "a Boolean value".to_string(),
                Value::Integer(_) => "an Integer value".to_string(),
                Value::Float(_) => "a Float value".to_string(),
                Value::Text(_) => "a Text value".to_string(),
                Value::Timestamp(_) => "a Timestamp value".to_string(),
                Value::List(_) => "a List value".to_string(),
            },
            PropertyValue::List(values) => format!("a list of {} values", values.len()),
            PropertyValue::Column(_) => "an input column".to_string(),
            PropertyValue::ColumnList(columns) => {
                format!("a list of {} input columns", columns.len())
            }
        }
    }

    /// The input columns this value references, in declared order.
    pub fn input_columns(&self) -> &[InputColumn] {
        match self {
            PropertyValue::Column(column) => std::slice::from_ref(column),
            PropertyValue::ColumnList(columns) => columns,
            _ => &[],
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::Scalar(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Scalar(Value::Integer(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Scalar(Value::Float(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(Value::Boolean(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(Value::Text(value.to_string()))
    }
}

impl From<InputColumn> for PropertyValue {
    fn from(column: InputColumn) -> Self {
        PropertyValue::Column(column)
    }
}

impl From<Vec<InputColumn>> for PropertyValue {
    fn from(columns: Vec<InputColumn>) -> Self {
        PropertyValue::ColumnList(columns)
    }
}

impl From<Vec<Value>> for PropertyValue {
    fn from(values: Vec<Value>) -> Self {
        PropertyValue::List(values)
    }
}

/// Configured properties of one component, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertyMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Removes a property. Returns the removed value, if any.
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        let position = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(position).1)
    }

    /// The configured value of a property.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Checks if the property is configured.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of configured properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every input column referenced by column properties, in
    /// configuration order, duplicates removed.
    pub fn input_columns(&self) -> Vec<InputColumn> {
        let mut columns = Vec::new();
        for (_, value) in &self.entries {
            for column in value.input_columns() {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    /// The configured column of a [`PropertyKind::Column`] property.
    pub fn column(&self, name: &str) -> Option<&InputColumn> {
        match self.get(name)? {
            PropertyValue::Column(column) => Some(column),
            _ => None,
        }
    }

    /// The configured columns of a [`PropertyKind::ColumnList`] property.
    pub fn columns(&self, name: &str) -> Option<&[InputColumn]> {
        match self.get(name)? {
            PropertyValue::ColumnList(columns) => Some(columns),
            _ => None,
        }
    }

    /// The configured value of a scalar property.
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            PropertyValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Integer shortcut for scalar properties.
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.scalar(name).and_then(Value::as_i64)
    }

    /// Float shortcut for scalar properties.
    pub fn float(&self, name: &str) -> Option<f64> {
        self.scalar(name).and_then(Value::as_f64)
    }

    /// Text shortcut for scalar properties.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.scalar(name).and_then(Value::as_str)
    }

    /// Boolean shortcut for scalar properties.
    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.scalar(name).and_then(Value::as_bool)
    }
}

/// A virtual column a transformer descriptor promises to emit.
#[derive(Debug, Clone)]
pub struct OutputColumnSpec {
    name: String,
    data_type: DataType,
}

impl OutputColumnSpec {
    /// Declares an output column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
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

/// Static metadata of a component implementation.
///
/// Descriptors are what the job builder works against: the name, the kind,
/// the configurable properties, and for filters the category vocabulary,
/// for transformers the emitted columns.
pub trait ComponentDescriptor: fmt::Debug + Send + Sync {
    /// Display name; also the default instance name in a job.
    fn name(&self) -> &str;

    /// What the component does with rows.
    fn kind(&self) -> ComponentKind;

    /// Configurable properties, in declared order.
    fn properties(&self) -> &[PropertyDescriptor];

    /// The categories a filter sorts rows into. Empty for other kinds.
    fn categories(&self) -> &[Category] {
        &[]
    }

    /// The columns a transformer emits. Empty for other kinds.
    fn output_columns(&self) -> &[OutputColumnSpec] {
        &[]
    }
}

/// Turns a descriptor plus configured properties into a runnable instance.
///
/// Called once per component per execution; the returned instance's kind
/// must match the descriptor's.
pub trait ComponentFactory: fmt::Debug + Send + Sync {
    /// Instantiates the component behind `descriptor` with the given
    /// configuration.
    fn create(
        &self,
        descriptor: &Arc<dyn ComponentDescriptor>,
        properties: &PropertyMap,
    ) -> Result<ComponentInstance>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SourceColumn;

    fn column(name: &str) -> InputColumn {
        InputColumn::Physical(Arc::new(SourceColumn::new("t", name, DataType::Text)))
    }

    #[test]
    fn test_property_kind_rejects_scalar_list_mismatch() {
        let list_kind = PropertyKind::List(DataType::Integer);
        assert!(!list_kind.accepts(&PropertyValue::from(1i64)));
        assert!(list_kind.accepts(&PropertyValue::from(vec![Value::Integer(1)])));

        let scalar_kind = PropertyKind::Scalar(DataType::Integer);
        assert!(!scalar_kind.accepts(&PropertyValue::from(vec![Value::Integer(1)])));
        assert!(scalar_kind.accepts(&PropertyValue::from(1i64)));
    }

    #[test]
    fn test_property_kind_rejects_wrong_value_type() {
        let kind = PropertyKind::Scalar(DataType::Integer);
        assert!(!kind.accepts(&PropertyValue::from("nope")));
        assert!(kind.accepts(&PropertyValue::Scalar(Value::Null)));
    }

    #[test]
    fn test_column_kind_accepts_only_columns() {
        assert!(PropertyKind::Column.accepts(&PropertyValue::from(column("a"))));
        assert!(!PropertyKind::Column.accepts(&PropertyValue::from(vec![column("a")])));
        assert!(PropertyKind::ColumnList.accepts(&PropertyValue::from(vec![column("a")])));
    }

    #[test]
    fn test_property_map_preserves_order_and_replaces() {
        let mut map = PropertyMap::new();
        map.set("b", PropertyValue::from(1i64));
        map.set("a", PropertyValue::from(column("x")));
        map.set("b", PropertyValue::from(2i64));

        let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(map.integer("b"), Some(2));
        assert_eq!(map.input_columns(), vec![column("x")]);
    }

    #[test]
    fn test_input_columns_deduplicated_across_properties() {
        let mut map = PropertyMap::new();
        map.set("first", PropertyValue::from(column("x")));
        map.set("rest", PropertyValue::from(vec![column("x"), column("y")]));
        assert_eq!(map.input_columns(), vec![column("x"), column("y")]);
    }
}
