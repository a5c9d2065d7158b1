use crate::core::{DataType, DbError, Result, Value};

/// Declared type of a schema field. `Enum` fields are stored as text and
/// validated against their closed set of variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Text,
    Bool,
    DateTime,
    Json,
    Enum(&'static [&'static str]),
}

impl FieldType {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int => DataType::Integer,
            Self::Float => DataType::Float,
            Self::Text | Self::Enum(_) => DataType::Text,
            Self::Bool => DataType::Boolean,
            Self::DateTime => DataType::DateTime,
            Self::Json => DataType::Json,
        }
    }
}

/// Value generated for a field omitted from a create payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    None,
    /// Fresh v4 UUID, rendered as text.
    Uuid,
    /// Current UTC timestamp.
    Now,
    Text(&'static str),
    Bool(bool),
    Int(i64),
}

impl FieldDefault {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// A scalar field of an entity. Fields are required unless marked
/// [`nullable`](FieldDef::nullable), matching the schema definition
/// language this registry mirrors.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
    pub unique: bool,
    pub id: bool,
    pub default: FieldDefault,
    /// Bumped to the current timestamp on every update.
    pub updated_at: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
            id: false,
            default: FieldDefault::None,
            updated_at: false,
        }
    }

    /// The conventional `id` primary key: unique text, defaulting to a
    /// fresh UUID.
    pub const fn id() -> Self {
        let mut field = Self::new("id", FieldType::Text);
        field.id = true;
        field.unique = true;
        field.default = FieldDefault::Uuid;
        field
    }

    pub const fn created_at() -> Self {
        let mut field = Self::new("createdAt", FieldType::DateTime);
        field.default = FieldDefault::Now;
        field
    }

    pub const fn updated_at() -> Self {
        let mut field = Self::new("updatedAt", FieldType::DateTime);
        field.default = FieldDefault::Now;
        field.updated_at = true;
        field
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.ty.data_type()
    }

    /// Checks a value against nullability, storage type and, for enum
    /// fields, the variant set.
    pub fn validate(&self, entity: &str, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(DbError::Validation(format!(
                    "{}.{} is required and cannot be null",
                    entity, self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type().is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "{}.{} expects {}, got {}",
                entity,
                self.name,
                self.data_type(),
                value.type_name()
            )));
        }

        if let FieldType::Enum(variants) = self.ty {
            let text = value.as_str().unwrap_or_default();
            if !variants.contains(&text) {
                return Err(DbError::Validation(format!(
                    "{}.{} must be one of [{}], got '{}'",
                    entity,
                    self.name,
                    variants.join(", "),
                    text
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_field_rejects_null() {
        let field = FieldDef::new("title", FieldType::Text);
        assert!(field.validate("Project", &Value::Null).is_err());
        assert!(field.validate("Project", &Value::from("ok")).is_ok());
    }

    #[test]
    fn test_enum_field_checks_variants() {
        let field = FieldDef::new("status", FieldType::Enum(&["draft", "published"]));
        assert!(field.validate("Project", &Value::from("draft")).is_ok());
        assert!(field.validate("Project", &Value::from("archived")).is_err());
    }

    #[test]
    fn test_id_field_shape() {
        let field = FieldDef::id();
        assert!(field.id);
        assert!(field.unique);
        assert_eq!(field.default, FieldDefault::Uuid);
    }
}
