use std::collections::{HashMap, HashSet};

use crate::core::{DbError, Result, Row, RowId, Value};
use crate::filter::eval;
use crate::query::paginate;
use crate::query::sort;
use crate::result::{Payload, Record};
use crate::schema::{EntityDef, RelationKind, SchemaRegistry};
use crate::select::{CountSelection, RelationArgs, RelationSelection, Selection};
use crate::store::TableSet;

/// Everything shaping needs: the consistent table view and the client's
/// global per-entity omit lists.
#[derive(Clone, Copy)]
pub struct ShapeContext<'a> {
    pub tables: &'a TableSet,
    pub omit: &'a HashMap<String, Vec<String>>,
}

/// Validates a selection tree against the schema before execution:
/// every named field and relation must exist, relation arguments are
/// checked like a nested query, and `_count` may only target to-many
/// relations. The projection must keep at least one field.
pub fn validate(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    selection: &Selection,
    global_omit: &HashMap<String, Vec<String>>,
) -> Result<()> {
    match selection {
        Selection::Default => Ok(()),
        Selection::Select(spec) => {
            if spec.fields.is_empty() && spec.relations.is_empty() && spec.count.is_none() {
                return Err(DbError::Validation(format!(
                    "select on {} must name at least one field",
                    entity.name
                )));
            }
            for field in &spec.fields {
                entity.field(field)?;
            }
            for (name, rel) in &spec.relations {
                validate_relation(registry, entity, name, rel, global_omit)?;
            }
            if let Some(count) = &spec.count {
                validate_count(registry, entity, count)?;
            }
            Ok(())
        }
        Selection::Include(spec) => {
            for (name, rel) in &spec.relations {
                validate_relation(registry, entity, name, rel, global_omit)?;
            }
            if let Some(count) = &spec.count {
                validate_count(registry, entity, count)?;
            }
            Ok(())
        }
        Selection::Omit(fields) => {
            for field in fields {
                entity.field(field)?;
            }
            let omitted = effective_omit(global_omit, entity, Some(fields));
            if entity.fields.iter().all(|f| omitted.contains(f.name)) {
                return Err(DbError::Validation(format!(
                    "omit on {} would remove every field",
                    entity.name
                )));
            }
            Ok(())
        }
    }
}

fn validate_relation(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    name: &str,
    rel: &RelationSelection,
    global_omit: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let def = entity.relation(name)?;
    let target = registry.entity(def.target)?;

    match def.kind {
        RelationKind::ToOne => {
            if !rel.args.is_default() {
                return Err(DbError::Validation(format!(
                    "{}.{} is a to-one relation and takes no query arguments",
                    entity.name, name
                )));
            }
        }
        RelationKind::ToMany => {
            validate_relation_args(registry, target, &rel.args)?;
        }
    }
    validate(registry, target, &rel.selection, global_omit)
}

fn validate_relation_args(
    registry: &SchemaRegistry,
    target: &EntityDef,
    args: &RelationArgs,
) -> Result<()> {
    if let Some(filter) = &args.filter {
        eval::validate(registry, target, filter)?;
    }
    sort::validate(target, &args.order_by)?;
    if let Some(cursor) = &args.cursor {
        let field = target.field(&cursor.field)?;
        if !field.unique {
            return Err(DbError::Validation(format!(
                "cursor field {}.{} is not unique",
                target.name, cursor.field
            )));
        }
    }
    for field in &args.distinct {
        target.field(field)?;
    }
    Ok(())
}

fn validate_count(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    count: &CountSelection,
) -> Result<()> {
    for (name, filter) in &count.relations {
        let def = entity.relation(name)?;
        if def.kind != RelationKind::ToMany {
            return Err(DbError::Validation(format!(
                "_count targets to-many relations; {}.{} is to-one",
                entity.name, name
            )));
        }
        if let Some(filter) = filter {
            let target = registry.entity(def.target)?;
            eval::validate(registry, target, filter)?;
        }
    }
    Ok(())
}

pub fn shape_rows(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    rows: &[(RowId, Row)],
    selection: &Selection,
) -> Result<Vec<Record>> {
    rows.iter()
        .map(|(_, row)| shape_row(ctx, entity, row, selection))
        .collect()
}

/// Produces the output record for one row under the given selection.
/// Identical inputs always shape identically; nothing here mutates.
pub fn shape_row(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    row: &Row,
    selection: &Selection,
) -> Result<Record> {
    let mut record = Record::new();
    match selection {
        Selection::Default => {
            let omitted = effective_omit(ctx.omit, entity, None);
            push_scalars(&mut record, entity, row, &omitted);
        }
        Selection::Omit(fields) => {
            let omitted = effective_omit(ctx.omit, entity, Some(fields));
            push_scalars(&mut record, entity, row, &omitted);
        }
        Selection::Select(spec) => {
            for field in &spec.fields {
                let idx = entity.field_index(field)?;
                record.push_value(field.clone(), row[idx].clone());
            }
            for (name, rel) in &spec.relations {
                let payload = shape_relation(ctx, entity, row, name, rel)?;
                record.push(name.clone(), payload);
            }
            if let Some(count) = &spec.count {
                record.push("_count", shape_count(ctx, entity, row, count)?);
            }
        }
        Selection::Include(spec) => {
            let omitted = effective_omit(ctx.omit, entity, None);
            push_scalars(&mut record, entity, row, &omitted);
            for (name, rel) in &spec.relations {
                let payload = shape_relation(ctx, entity, row, name, rel)?;
                record.push(name.clone(), payload);
            }
            if let Some(count) = &spec.count {
                record.push("_count", shape_count(ctx, entity, row, count)?);
            }
        }
    }
    Ok(record)
}

fn effective_omit<'a>(
    global: &'a HashMap<String, Vec<String>>,
    entity: &EntityDef,
    local: Option<&'a [String]>,
) -> HashSet<&'a str> {
    let mut omitted: HashSet<&str> = global
        .get(entity.name)
        .map(|fields| fields.iter().map(String::as_str).collect())
        .unwrap_or_default();
    if let Some(local) = local {
        omitted.extend(local.iter().map(String::as_str));
    }
    omitted
}

fn push_scalars(record: &mut Record, entity: &EntityDef, row: &Row, omitted: &HashSet<&str>) {
    for (field, value) in entity.fields.iter().zip(row) {
        if !omitted.contains(field.name) {
            record.push_value(field.name, value.clone());
        }
    }
}

fn shape_relation(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    row: &Row,
    name: &str,
    rel: &RelationSelection,
) -> Result<Payload> {
    let registry = ctx.tables.registry();
    let def = entity.relation(name)?;
    let target = registry.entity(def.target)?;
    let target_table = ctx.tables.table(def.target)?;

    match def.kind {
        RelationKind::ToOne => {
            let fk_idx = entity.field_index(def.fk_field)?;
            let fk_value = &row[fk_idx];
            if fk_value.is_null() {
                return Ok(Payload::Value(Value::Null));
            }
            match target_table.find_by_id(fk_value) {
                Some((_, parent)) => Ok(Payload::Record(shape_row(
                    ctx,
                    target,
                    parent,
                    &rel.selection,
                )?)),
                None => Ok(Payload::Value(Value::Null)),
            }
        }
        RelationKind::ToMany => {
            let fk_idx = target.field_index(def.fk_field)?;
            let parent_id = &row[entity.id_index()];

            let mut children: Vec<(RowId, Row)> = Vec::new();
            for (child_id, child) in target_table.iter() {
                if &child[fk_idx] != parent_id {
                    continue;
                }
                let keep = match &rel.args.filter {
                    Some(filter) => eval::matches(ctx.tables, target, child, filter)?,
                    None => true,
                };
                if keep {
                    children.push((child_id, child.clone()));
                }
            }

            sort::sort_rows(target, &mut children, &rel.args.order_by)?;
            if let Some(cursor) = &rel.args.cursor {
                paginate::apply_cursor(target, &mut children, cursor)?;
            }
            paginate::apply_distinct(target, &mut children, &rel.args.distinct)?;
            paginate::apply_skip_take(&mut children, rel.args.skip, rel.args.take);

            let shaped = shape_rows(ctx, target, &children, &rel.selection)?;
            Ok(Payload::List(shaped))
        }
    }
}

fn shape_count(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    row: &Row,
    count: &CountSelection,
) -> Result<Payload> {
    let registry = ctx.tables.registry();
    let parent_id = &row[entity.id_index()];
    let mut counts = Record::new();

    for (name, filter) in &count.relations {
        let def = entity.relation(name)?;
        let target = registry.entity(def.target)?;
        let target_table = ctx.tables.table(def.target)?;
        let fk_idx = target.field_index(def.fk_field)?;

        let mut total: i64 = 0;
        for (_, child) in target_table.iter() {
            if &child[fk_idx] != parent_id {
                continue;
            }
            let counted = match filter {
                Some(filter) => eval::matches(ctx.tables, target, child, filter)?,
                None => true,
            };
            if counted {
                total += 1;
            }
        }
        counts.push_value(name.clone(), Value::Integer(total));
    }

    Ok(Payload::Record(counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::query::OrderBy;
    use crate::select::{IncludeSpec, SelectSpec};
    use chrono::Utc;

    fn seeded() -> TableSet {
        let registry = SchemaRegistry::portfolio();
        let mut tables = TableSet::for_registry(registry);
        let now = Utc::now();

        tables
            .insert(
                "User",
                vec![
                    Value::from("u1"),
                    Value::from("ana@example.com"),
                    Value::from("hash"),
                    Value::from("Ana"),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::from("USER"),
                    Value::from(now),
                    Value::from(now),
                ],
            )
            .unwrap();

        for (id, title, status) in [
            ("p1", "Beta", "published"),
            ("p2", "Alpha", "published"),
            ("p3", "Gamma", "draft"),
        ] {
            tables
                .insert(
                    "Project",
                    vec![
                        Value::from(id),
                        Value::from("u1"),
                        Value::from(title),
                        Value::from("desc"),
                        Value::Null,
                        Value::Null,
                        Value::Null,
                        Value::Null,
                        Value::from(status),
                        Value::from(false),
                        Value::from(now),
                        Value::from(now),
                    ],
                )
                .unwrap();
        }

        tables
    }

    fn user_row(tables: &TableSet) -> Row {
        tables
            .table("User")
            .unwrap()
            .iter()
            .next()
            .map(|(_, r)| r.clone())
            .unwrap()
    }

    #[test]
    fn test_default_shape_lists_all_scalars() {
        let tables = seeded();
        let omit = HashMap::new();
        let ctx = ShapeContext {
            tables: &tables,
            omit: &omit,
        };
        let entity = tables.registry().entity("User").unwrap();
        let record = shape_row(ctx, entity, &user_row(&tables), &Selection::Default).unwrap();
        assert_eq!(record.len(), entity.fields.len());
        assert!(record.value("password").is_some());
    }

    #[test]
    fn test_global_omit_suppresses_fields() {
        let tables = seeded();
        let mut omit = HashMap::new();
        omit.insert("User".to_string(), vec!["password".to_string()]);
        let ctx = ShapeContext {
            tables: &tables,
            omit: &omit,
        };
        let entity = tables.registry().entity("User").unwrap();
        let record = shape_row(ctx, entity, &user_row(&tables), &Selection::Default).unwrap();
        assert!(record.value("password").is_none());
        assert!(record.value("email").is_some());
    }

    #[test]
    fn test_include_with_relation_args() {
        let tables = seeded();
        let omit = HashMap::new();
        let ctx = ShapeContext {
            tables: &tables,
            omit: &omit,
        };
        let entity = tables.registry().entity("User").unwrap();
        let selection = Selection::include(IncludeSpec::new().relation(
            "projects",
            RelationSelection::new().args(
                RelationArgs::new()
                    .filter(Filter::equals("status", "published"))
                    .order_by(OrderBy::asc("title")),
            ),
        ));
        let record = shape_row(ctx, entity, &user_row(&tables), &selection).unwrap();
        let projects = record.list("projects").unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].value("title"), Some(&Value::from("Alpha")));
        assert_eq!(projects[1].value("title"), Some(&Value::from("Beta")));
    }

    #[test]
    fn test_count_with_child_filter() {
        let tables = seeded();
        let omit = HashMap::new();
        let ctx = ShapeContext {
            tables: &tables,
            omit: &omit,
        };
        let entity = tables.registry().entity("User").unwrap();
        let selection = Selection::select(SelectSpec::fields(["id"]).count(
            CountSelection::new()
                .relation("projects")
                .relation_where("projects", Filter::equals("status", "draft")),
        ));
        let record = shape_row(ctx, entity, &user_row(&tables), &selection).unwrap();
        let counts = record.record("_count").unwrap();
        // Both entries share the relation name; the filtered one is second.
        assert_eq!(counts.entries()[0].1, Payload::Value(Value::Integer(3)));
        assert_eq!(counts.entries()[1].1, Payload::Value(Value::Integer(1)));
    }

    #[test]
    fn test_validate_rejects_unknown_relation_and_empty_select() {
        let registry = SchemaRegistry::portfolio();
        let entity = registry.entity("User").unwrap();
        let omit = HashMap::new();

        let unknown = Selection::include(
            IncludeSpec::new().relation("ghosts", RelationSelection::new()),
        );
        assert!(matches!(
            validate(registry, entity, &unknown, &omit),
            Err(DbError::UnknownRelation { .. })
        ));

        let empty = Selection::select(SelectSpec::default());
        assert!(matches!(
            validate(registry, entity, &empty, &omit),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_args_on_to_one() {
        let registry = SchemaRegistry::portfolio();
        let entity = registry.entity("Project").unwrap();
        let omit = HashMap::new();
        let selection = Selection::include(IncludeSpec::new().relation(
            "user",
            RelationSelection::new().args(RelationArgs::new().take(1)),
        ));
        assert!(matches!(
            validate(registry, entity, &selection, &omit),
            Err(DbError::Validation(_))
        ));
    }
}
