use crate::core::{DbError, Result};
use crate::schema::field::FieldDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This entity holds the foreign key (`fk_field` is one of its own
    /// scalar fields).
    ToOne,
    /// The target entity holds the foreign key back to this one.
    ToMany,
}

/// A named relation between two entities, backed by a scalar foreign-key
/// field.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    pub name: &'static str,
    pub target: &'static str,
    pub kind: RelationKind,
    pub fk_field: &'static str,
}

impl RelationDef {
    pub const fn to_one(name: &'static str, target: &'static str, fk_field: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::ToOne,
            fk_field,
        }
    }

    pub const fn to_many(name: &'static str, target: &'static str, fk_field: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::ToMany,
            fk_field,
        }
    }

    pub fn is_to_many(&self) -> bool {
        self.kind == RelationKind::ToMany
    }
}

/// Immutable description of one entity: scalar fields in row order,
/// relations, and whether mutations feed the audit trail.
#[derive(Debug, Clone, Copy)]
pub struct EntityDef {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
    pub relations: &'static [RelationDef],
    pub audited: bool,
}

impl EntityDef {
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DbError::UnknownField {
                entity: self.name.to_string(),
                field: name.to_string(),
            })
    }

    pub fn field(&self, name: &str) -> Result<&FieldDef> {
        self.field_index(name).map(|idx| &self.fields[idx])
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.find_field(name).is_some()
    }

    pub fn relation(&self, name: &str) -> Result<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| DbError::UnknownRelation {
                entity: self.name.to_string(),
                relation: name.to_string(),
            })
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Index of the primary key field. Registry construction guarantees
    /// every entity has exactly one.
    pub fn id_index(&self) -> usize {
        self.fields.iter().position(|f| f.id).unwrap_or(0)
    }

    pub fn id_field(&self) -> &FieldDef {
        &self.fields[self.id_index()]
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = (usize, &FieldDef)> {
        self.fields.iter().enumerate().filter(|(_, f)| f.unique)
    }

    /// Whether a to-one relation may be absent, derived from its
    /// foreign-key field's nullability.
    pub fn relation_is_optional(&self, relation: &RelationDef) -> bool {
        self.find_field(relation.fk_field)
            .map(|f| f.nullable)
            .unwrap_or(false)
    }
}
