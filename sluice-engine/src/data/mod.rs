//! The data plane: values, columns, rows and row identity.
//!
//! Everything a component touches at runtime lives here. Columns come in two
//! flavors with distinct identity rules: physical columns belong to a source
//! table and are identified by `(table, name)`, virtual columns are emitted
//! by a transformer and identified by `(producer, name)`. Rows are flat value
//! vectors laid out by a per-table [`RowLayout`], so component input lookup
//! is a slot index rather than a name probe on the hot path.

mod column;
mod row;
mod value;

pub use column::{InputColumn, SourceColumn, VirtualColumn};
pub use row::{Row, RowId, RowIdAllocator, RowLayout, VIRTUAL_ROW_ID_BASE};
pub use value::{DataType, Value};
