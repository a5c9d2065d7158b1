use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::core::{DbError, Result};
use crate::schema::entity::{EntityDef, RelationDef, RelationKind};
use crate::schema::field::{FieldDef, FieldDefault, FieldType};

/// Read-only catalog of every entity the client can address. Built once
/// at startup and shared by reference; operations resolve entity and
/// field names against it before touching the store.
#[derive(Debug)]
pub struct SchemaRegistry {
    entities: Vec<EntityDef>,
    by_name: HashMap<&'static str, usize>,
}

impl SchemaRegistry {
    pub fn new(entities: Vec<EntityDef>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(entities.len());
        for (idx, entity) in entities.iter().enumerate() {
            if by_name.insert(entity.name, idx).is_some() {
                return Err(DbError::Initialization(format!(
                    "duplicate entity '{}' in schema",
                    entity.name
                )));
            }
            if entity.fields.iter().filter(|f| f.id).count() != 1 {
                return Err(DbError::Initialization(format!(
                    "entity '{}' must declare exactly one id field",
                    entity.name
                )));
            }
        }

        let registry = Self { entities, by_name };
        registry.check_relations()?;
        Ok(registry)
    }

    fn check_relations(&self) -> Result<()> {
        for entity in &self.entities {
            for relation in entity.relations {
                let target = self.entity(relation.target)?;
                let fk_owner = match relation.kind {
                    RelationKind::ToOne => entity,
                    RelationKind::ToMany => target,
                };
                if !fk_owner.has_field(relation.fk_field) {
                    return Err(DbError::Initialization(format!(
                        "relation {}.{} names missing foreign key field {}.{}",
                        entity.name, relation.name, fk_owner.name, relation.fk_field
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDef> {
        self.by_name
            .get(name)
            .map(|idx| &self.entities[*idx])
            .ok_or_else(|| DbError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> &[EntityDef] {
        &self.entities
    }

    /// All to-one relations on other entities whose foreign key points at
    /// `target`. Drives referential checks when a `target` row is deleted.
    pub fn incoming_references(&self, target: &str) -> Vec<(&EntityDef, &RelationDef)> {
        let mut refs = Vec::new();
        for entity in &self.entities {
            for relation in entity.relations {
                if relation.kind == RelationKind::ToOne && relation.target == target {
                    refs.push((entity, relation));
                }
            }
        }
        refs
    }

    /// The portfolio schema this crate ships with.
    pub fn portfolio() -> &'static SchemaRegistry {
        &PORTFOLIO
    }
}

// ============================================================
// Portfolio schema definition
// ============================================================

const USER_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("email", FieldType::Text).unique(),
    FieldDef::new("password", FieldType::Text),
    FieldDef::new("name", FieldType::Text).nullable(),
    FieldDef::new("bio", FieldType::Text).nullable(),
    FieldDef::new("avatarUrl", FieldType::Text).nullable(),
    FieldDef::new("githubUrl", FieldType::Text).nullable(),
    FieldDef::new("linkedinUrl", FieldType::Text).nullable(),
    FieldDef::new("websiteUrl", FieldType::Text).nullable(),
    FieldDef::new("role", FieldType::Enum(&["USER", "ADMIN"])).default(FieldDefault::Text("USER")),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const USER_RELATIONS: &[RelationDef] = &[
    RelationDef::to_many("projects", "Project", "userId"),
    RelationDef::to_many("skills", "Skill", "userId"),
    RelationDef::to_many("achievements", "Achievement", "userId"),
    RelationDef::to_many("timeLines", "TimeLine", "userId"),
    RelationDef::to_many("resumes", "Resume", "userId"),
    RelationDef::to_many("categories", "Category", "userId"),
    RelationDef::to_many("technologies", "Technology", "userId"),
    RelationDef::to_many("tags", "Tag", "userId"),
    RelationDef::to_many("auditLogs", "AuditLog", "userId"),
];

const PROJECT_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text),
    FieldDef::new("title", FieldType::Text),
    FieldDef::new("description", FieldType::Text),
    FieldDef::new("imageUrl", FieldType::Text).nullable(),
    FieldDef::new("videoUrl", FieldType::Text).nullable(),
    FieldDef::new("liveUrl", FieldType::Text).nullable(),
    FieldDef::new("repoUrl", FieldType::Text).nullable(),
    FieldDef::new("status", FieldType::Enum(&["draft", "published"]))
        .default(FieldDefault::Text("draft")),
    FieldDef::new("featured", FieldType::Bool).default(FieldDefault::Bool(false)),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const PROJECT_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

const SKILL_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text),
    FieldDef::new("name", FieldType::Text),
    FieldDef::new(
        "category",
        FieldType::Enum(&["frontend", "backend", "tools", "other"]),
    ),
    FieldDef::new("level", FieldType::Int),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const SKILL_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

const ACHIEVEMENT_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text),
    FieldDef::new("title", FieldType::Text),
    FieldDef::new("issuer", FieldType::Text).nullable(),
    FieldDef::new("date", FieldType::DateTime),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const ACHIEVEMENT_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

const TIMELINE_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text),
    FieldDef::new("title", FieldType::Text),
    FieldDef::new("organization", FieldType::Text).nullable(),
    FieldDef::new("period", FieldType::Text).nullable(),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::new(
        "type",
        FieldType::Enum(&["education", "experience", "project", "certification"]),
    ),
    FieldDef::new("current", FieldType::Bool).default(FieldDefault::Bool(false)),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const TIMELINE_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

const RESUME_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text),
    FieldDef::new("fileUrl", FieldType::Text),
    FieldDef::new("fileSize", FieldType::Int).nullable(),
    FieldDef::new("fileType", FieldType::Text).nullable(),
    FieldDef::new("isDefault", FieldType::Bool).default(FieldDefault::Bool(false)),
    FieldDef::new("version", FieldType::Text).nullable(),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const RESUME_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

// Categories carry no timestamps; they are taxonomy rows, not content.
const CATEGORY_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text).nullable(),
    FieldDef::new("slug", FieldType::Text).unique(),
    FieldDef::new("name", FieldType::Text),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::new("icon", FieldType::Text).nullable(),
];

const CATEGORY_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("user", "User", "userId"),
    RelationDef::to_many("technologies", "Technology", "categoryId"),
];

const TECHNOLOGY_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("categoryId", FieldType::Text),
    FieldDef::new("userId", FieldType::Text).nullable(),
    FieldDef::new("slug", FieldType::Text).unique(),
    FieldDef::new("name", FieldType::Text),
    FieldDef::new("icon", FieldType::Text).nullable(),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::new("featured", FieldType::Bool).default(FieldDefault::Bool(false)),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const TECHNOLOGY_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("category", "Category", "categoryId"),
    RelationDef::to_one("user", "User", "userId"),
];

const TAG_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text).nullable(),
    FieldDef::new("name", FieldType::Text).unique(),
    FieldDef::new("slug", FieldType::Text).unique(),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::new("icon", FieldType::Text).nullable(),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const TAG_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

const LABEL_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("slug", FieldType::Text).unique(),
    FieldDef::new("name", FieldType::Text),
    FieldDef::new("description", FieldType::Text).nullable(),
    FieldDef::new("icon", FieldType::Text).nullable(),
    FieldDef::created_at(),
    FieldDef::updated_at(),
];

const AUDIT_LOG_FIELDS: &[FieldDef] = &[
    FieldDef::id(),
    FieldDef::new("userId", FieldType::Text),
    FieldDef::new("action", FieldType::Text),
    FieldDef::new("entity", FieldType::Text),
    FieldDef::new("entityId", FieldType::Text),
    FieldDef::new("oldData", FieldType::Json).nullable(),
    FieldDef::new("newData", FieldType::Json).nullable(),
    FieldDef::new("ipAddress", FieldType::Text).nullable(),
    FieldDef::new("userAgent", FieldType::Text).nullable(),
    FieldDef::created_at(),
];

const AUDIT_LOG_RELATIONS: &[RelationDef] = &[RelationDef::to_one("user", "User", "userId")];

const fn entity(
    name: &'static str,
    fields: &'static [FieldDef],
    relations: &'static [RelationDef],
    audited: bool,
) -> EntityDef {
    EntityDef {
        name,
        fields,
        relations,
        audited,
    }
}

lazy_static! {
    static ref PORTFOLIO: SchemaRegistry = SchemaRegistry::new(vec![
        entity("User", USER_FIELDS, USER_RELATIONS, false),
        entity("Project", PROJECT_FIELDS, PROJECT_RELATIONS, true),
        entity("Skill", SKILL_FIELDS, SKILL_RELATIONS, true),
        entity("Achievement", ACHIEVEMENT_FIELDS, ACHIEVEMENT_RELATIONS, true),
        entity("TimeLine", TIMELINE_FIELDS, TIMELINE_RELATIONS, true),
        entity("Resume", RESUME_FIELDS, RESUME_RELATIONS, true),
        entity("Category", CATEGORY_FIELDS, CATEGORY_RELATIONS, true),
        entity("Technology", TECHNOLOGY_FIELDS, TECHNOLOGY_RELATIONS, true),
        entity("Tag", TAG_FIELDS, TAG_RELATIONS, true),
        entity("Label", LABEL_FIELDS, &[], false),
        entity("AuditLog", AUDIT_LOG_FIELDS, AUDIT_LOG_RELATIONS, false),
    ])
    .expect("portfolio schema is internally consistent");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_registry_builds() {
        let registry = SchemaRegistry::portfolio();
        assert_eq!(registry.entities().len(), 11);
        assert!(registry.entity("User").is_ok());
        assert!(registry.entity("Ghost").is_err());
    }

    #[test]
    fn test_relation_lookup() {
        let registry = SchemaRegistry::portfolio();
        let category = registry.entity("Category").unwrap();
        let technologies = category.relation("technologies").unwrap();
        assert!(technologies.is_to_many());
        assert_eq!(technologies.target, "Technology");
        assert_eq!(technologies.fk_field, "categoryId");
    }

    #[test]
    fn test_optionality_follows_fk_nullability() {
        let registry = SchemaRegistry::portfolio();
        let technology = registry.entity("Technology").unwrap();
        let category_rel = technology.relation("category").unwrap();
        let user_rel = technology.relation("user").unwrap();
        assert!(!technology.relation_is_optional(category_rel));
        assert!(technology.relation_is_optional(user_rel));
    }

    #[test]
    fn test_incoming_references_cover_fk_targets() {
        let registry = SchemaRegistry::portfolio();
        let into_category = registry.incoming_references("Category");
        assert_eq!(into_category.len(), 1);
        assert_eq!(into_category[0].0.name, "Technology");

        let into_user = registry.incoming_references("User");
        assert!(into_user.len() >= 9);
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let result = SchemaRegistry::new(vec![
            entity("Label", LABEL_FIELDS, &[], false),
            entity("Label", LABEL_FIELDS, &[], false),
        ]);
        assert!(matches!(result, Err(DbError::Initialization(_))));
    }
}
