pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, ErrorFormat, ErrorKind, Result};
pub use types::{Row, RowId};
pub use value::{DataType, Value};
