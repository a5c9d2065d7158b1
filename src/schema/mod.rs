pub mod entity;
pub mod field;
pub mod registry;

pub use entity::{EntityDef, RelationDef, RelationKind};
pub use field::{FieldDef, FieldDefault, FieldType};
pub use registry::SchemaRegistry;
