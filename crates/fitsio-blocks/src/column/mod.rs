//! Column-oriented serialization of binary table columns.

mod header;
mod store;
mod value;

pub use header::{BintableColumnHeader, StandardColumnHeader};
pub use store::{ColumnStore, FileColumnStore};
pub use value::{ColumnInfo, ColumnKind, ColumnValue, ScalarType};
