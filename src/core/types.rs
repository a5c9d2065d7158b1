use crate::core::Value;

/// A stored record: one value per registry field, in declaration order.
pub type Row = Vec<Value>;

/// Store-internal row handle, stable for the lifetime of the row.
pub type RowId = u64;
