use serde_json::Value as JsonValue;

use crate::core::{DbError, Result, Row, Value};
use crate::filter::pattern::eval_like;
use crate::filter::{Filter, JsonPredicate, RelationCondition, ScalarOp, StringMode};
use crate::schema::{EntityDef, FieldDef, FieldType, RelationKind, SchemaRegistry};
use crate::store::TableSet;

/// Checks a filter tree against the schema before anything touches the
/// store: every field and relation must exist, operators must fit the
/// field's type, and relation conditions must match the relation's
/// cardinality.
pub fn validate(registry: &SchemaRegistry, entity: &EntityDef, filter: &Filter) -> Result<()> {
    match filter {
        Filter::And(filters) | Filter::Or(filters) | Filter::Not(filters) => {
            for sub in filters {
                validate(registry, entity, sub)?;
            }
            Ok(())
        }
        Filter::Scalar(scalar) => {
            let field = entity.field(&scalar.field)?;
            validate_scalar_op(entity, field, &scalar.op)
        }
        Filter::Relation(relation) => {
            let def = entity.relation(&relation.relation)?;
            let target = registry.entity(def.target)?;
            match (&relation.condition, def.kind) {
                (
                    RelationCondition::Some(sub)
                    | RelationCondition::Every(sub)
                    | RelationCondition::None(sub),
                    RelationKind::ToMany,
                ) => validate(registry, target, sub),
                (
                    RelationCondition::Is(sub) | RelationCondition::IsNot(sub),
                    RelationKind::ToOne,
                ) => validate(registry, target, sub),
                (RelationCondition::IsNull, RelationKind::ToOne) => Ok(()),
                (_, RelationKind::ToMany) => Err(DbError::Validation(format!(
                    "{}.{} is a to-many relation; use some/every/none",
                    entity.name, relation.relation
                ))),
                (_, RelationKind::ToOne) => Err(DbError::Validation(format!(
                    "{}.{} is a to-one relation; use is/isNot/isNull",
                    entity.name, relation.relation
                ))),
            }
        }
    }
}

fn validate_scalar_op(entity: &EntityDef, field: &FieldDef, op: &ScalarOp) -> Result<()> {
    let compatible = |value: &Value| -> Result<()> {
        if !value.is_null() && !field.data_type().is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "filter on {}.{} expects {}, got {}",
                entity.name,
                field.name,
                field.data_type(),
                value.type_name()
            )));
        }
        Ok(())
    };

    match op {
        ScalarOp::Equals(value) | ScalarOp::NotEquals(value) => compatible(value),
        ScalarOp::In(values) | ScalarOp::NotIn(values) => {
            for value in values {
                if value.is_null() {
                    return Err(DbError::Validation(format!(
                        "null is not allowed in `in`/`notIn` lists for {}.{}",
                        entity.name, field.name
                    )));
                }
                compatible(value)?;
            }
            Ok(())
        }
        ScalarOp::Lt(value) | ScalarOp::Lte(value) | ScalarOp::Gt(value) | ScalarOp::Gte(value) => {
            if !field.data_type().is_orderable() {
                return Err(DbError::Validation(format!(
                    "{}.{} has no ordering; range filters are not supported on {}",
                    entity.name,
                    field.name,
                    field.data_type()
                )));
            }
            if value.is_null() {
                return Err(DbError::Validation(format!(
                    "range filter on {}.{} requires a non-null bound",
                    entity.name, field.name
                )));
            }
            compatible(value)
        }
        ScalarOp::Contains(..)
        | ScalarOp::StartsWith(..)
        | ScalarOp::EndsWith(..)
        | ScalarOp::Like { .. } => match field.ty {
            FieldType::Text | FieldType::Enum(_) => Ok(()),
            _ => Err(DbError::Validation(format!(
                "string filter on non-text field {}.{}",
                entity.name, field.name
            ))),
        },
        ScalarOp::JsonPath { .. } => match field.ty {
            FieldType::Json => Ok(()),
            _ => Err(DbError::Validation(format!(
                "JSON path filter on non-JSON field {}.{}",
                entity.name, field.name
            ))),
        },
    }
}

/// Evaluates a validated filter against one row. Relation conditions
/// probe sibling tables through the shared `tables` view, so the whole
/// evaluation sees one consistent state.
pub fn matches(tables: &TableSet, entity: &EntityDef, row: &Row, filter: &Filter) -> Result<bool> {
    match filter {
        Filter::And(filters) => {
            for sub in filters {
                if !matches(tables, entity, row, sub)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(filters) => {
            for sub in filters {
                if matches(tables, entity, row, sub)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        // NOT lists conditions that must all fail.
        Filter::Not(filters) => {
            for sub in filters {
                if matches(tables, entity, row, sub)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Scalar(scalar) => {
            let idx = entity.field_index(&scalar.field)?;
            eval_scalar_op(&row[idx], &scalar.op)
        }
        Filter::Relation(relation) => eval_relation(tables, entity, row, relation),
    }
}

pub(crate) fn eval_scalar_op(value: &Value, op: &ScalarOp) -> Result<bool> {
    match op {
        ScalarOp::Equals(target) => Ok(match (value.is_null(), target.is_null()) {
            (true, true) => true,
            (false, false) => value == target,
            _ => false,
        }),
        // `not` never matches null rows unless the operand is null itself,
        // mirroring SQL's <> semantics.
        ScalarOp::NotEquals(target) => Ok(match (value.is_null(), target.is_null()) {
            (true, true) => false,
            (true, false) => false,
            (false, true) => true,
            (false, false) => value != target,
        }),
        ScalarOp::In(targets) => {
            if value.is_null() {
                return Ok(false);
            }
            Ok(targets.iter().any(|t| t == value))
        }
        ScalarOp::NotIn(targets) => {
            if value.is_null() {
                return Ok(false);
            }
            Ok(!targets.iter().any(|t| t == value))
        }
        ScalarOp::Lt(bound) => ordered(value, bound, |o| o == std::cmp::Ordering::Less),
        ScalarOp::Lte(bound) => ordered(value, bound, |o| o != std::cmp::Ordering::Greater),
        ScalarOp::Gt(bound) => ordered(value, bound, |o| o == std::cmp::Ordering::Greater),
        ScalarOp::Gte(bound) => ordered(value, bound, |o| o != std::cmp::Ordering::Less),
        ScalarOp::Contains(needle, mode) => Ok(with_text(value, |text| match mode {
            StringMode::Default => text.contains(needle.as_str()),
            StringMode::Insensitive => text.to_lowercase().contains(&needle.to_lowercase()),
        })),
        ScalarOp::StartsWith(prefix, mode) => Ok(with_text(value, |text| match mode {
            StringMode::Default => text.starts_with(prefix.as_str()),
            StringMode::Insensitive => text.to_lowercase().starts_with(&prefix.to_lowercase()),
        })),
        ScalarOp::EndsWith(suffix, mode) => Ok(with_text(value, |text| match mode {
            StringMode::Default => text.ends_with(suffix.as_str()),
            StringMode::Insensitive => text.to_lowercase().ends_with(&suffix.to_lowercase()),
        })),
        ScalarOp::Like {
            pattern,
            case_insensitive,
        } => match value.as_str() {
            Some(text) => eval_like(text, pattern, !case_insensitive),
            None => Ok(false),
        },
        ScalarOp::JsonPath { path, predicate } => {
            let Some(json) = value.as_json() else {
                return Ok(false);
            };
            let Some(target) = walk_json_path(json, path) else {
                return Ok(false);
            };
            Ok(eval_json_predicate(target, predicate))
        }
    }
}

fn ordered(
    value: &Value,
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<bool> {
    if value.is_null() {
        return Ok(false);
    }
    Ok(accept(value.compare(bound)?))
}

fn with_text(value: &Value, f: impl Fn(&str) -> bool) -> bool {
    value.as_str().map(f).unwrap_or(false)
}

fn walk_json_path<'a>(json: &'a JsonValue, path: &[String]) -> Option<&'a JsonValue> {
    let mut current = json;
    for step in path {
        current = match current {
            JsonValue::Object(map) => map.get(step)?,
            JsonValue::Array(items) => items.get(step.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn eval_json_predicate(target: &JsonValue, predicate: &JsonPredicate) -> bool {
    match predicate {
        JsonPredicate::Equals(expected) => target == expected,
        JsonPredicate::StringContains(needle) => target
            .as_str()
            .map(|s| s.contains(needle.as_str()))
            .unwrap_or(false),
        JsonPredicate::ArrayContains(element) => target
            .as_array()
            .map(|items| items.contains(element))
            .unwrap_or(false),
    }
}

fn eval_relation(
    tables: &TableSet,
    entity: &EntityDef,
    row: &Row,
    relation: &crate::filter::RelationFilter,
) -> Result<bool> {
    let registry = tables.registry();
    let def = entity.relation(&relation.relation)?;
    let target = registry.entity(def.target)?;
    let target_table = tables.table(def.target)?;

    match def.kind {
        RelationKind::ToMany => {
            let fk_idx = target.field_index(def.fk_field)?;
            let parent_id = &row[entity.id_index()];
            let sub = match &relation.condition {
                RelationCondition::Some(sub)
                | RelationCondition::Every(sub)
                | RelationCondition::None(sub) => sub,
                _ => {
                    return Err(DbError::Validation(format!(
                        "{}.{} is a to-many relation; use some/every/none",
                        entity.name, relation.relation
                    )));
                }
            };

            let mut any = false;
            let mut all = true;
            for (_, child) in target_table.iter() {
                if &child[fk_idx] != parent_id {
                    continue;
                }
                if matches(tables, target, child, sub)? {
                    any = true;
                } else {
                    all = false;
                }
            }

            Ok(match relation.condition {
                RelationCondition::Some(_) => any,
                RelationCondition::Every(_) => all,
                RelationCondition::None(_) => !any,
                _ => unreachable!(),
            })
        }
        RelationKind::ToOne => {
            let fk_idx = entity.field_index(def.fk_field)?;
            let fk_value = &row[fk_idx];
            match &relation.condition {
                RelationCondition::IsNull => Ok(fk_value.is_null()),
                RelationCondition::Is(sub) => {
                    if fk_value.is_null() {
                        return Ok(false);
                    }
                    match target_table.find_by_id(fk_value) {
                        Some((_, parent)) => matches(tables, target, parent, sub),
                        None => Ok(false),
                    }
                }
                // An absent relation satisfies isNot.
                RelationCondition::IsNot(sub) => {
                    if fk_value.is_null() {
                        return Ok(true);
                    }
                    match target_table.find_by_id(fk_value) {
                        Some((_, parent)) => Ok(!matches(tables, target, parent, sub)?),
                        None => Ok(true),
                    }
                }
                _ => Err(DbError::Validation(format!(
                    "{}.{} is a to-one relation; use is/isNot/isNull",
                    entity.name, relation.relation
                ))),
            }
        }
    }
}
