pub mod memory;
pub mod table;

pub use memory::{MemStore, StoreWriteGuard, TableSet};
pub use table::Table;
