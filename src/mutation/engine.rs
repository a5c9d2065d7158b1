//! The write engine. Every function here runs under the store's
//! exclusive guard for autocommit calls, or against a transaction's
//! working set; either way the `&mut TableSet` is the only writer.
//!
//! Batch operations are atomic: validation failures part-way through
//! roll the touched table back, so callers never observe a partial
//! createMany or updateMany.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{self, ActorContext, AuditEntry};
use crate::core::{DbError, Result, Row, RowId, Value};
use crate::filter::{eval, Filter};
use crate::mutation::{Data, DataValue, DeleteManyArgs, UpdateManyArgs};
use crate::query::UniqueWhere;
use crate::result::Record;
use crate::schema::{EntityDef, FieldDefault, RelationKind};
use crate::select::resolve::{self, ShapeContext};
use crate::select::Selection;
use crate::store::TableSet;

/// Per-call state the engine threads through every mutation: the acting
/// user (no actor, no audit rows) and the client's global omit lists.
#[derive(Clone, Copy)]
pub struct WriteContext<'a> {
    pub actor: Option<&'a ActorContext>,
    pub omit: &'a HashMap<String, Vec<String>>,
}

pub fn create(
    tables: &mut TableSet,
    entity: &EntityDef,
    data: &Data,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(Record, Vec<AuditEntry>)> {
    let row = build_create_row(tables, entity, data)?;
    tables.insert(entity.name, row.clone())?;

    let record = shape(tables, ctx.omit, entity, &row)?;
    let audits = audit_for(entity, ctx, action, &row, None, Some(&row))
        .into_iter()
        .collect();
    Ok((record, audits))
}

/// Inserts a batch of rows. With `skip_duplicates` a unique collision
/// drops the colliding row, including collisions between rows of the
/// batch itself; without it the first collision aborts the whole batch.
pub fn create_many(
    tables: &mut TableSet,
    entity: &EntityDef,
    data: &[Data],
    skip_duplicates: bool,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(Vec<Record>, Vec<AuditEntry>)> {
    let backup = tables.table(entity.name)?.clone();
    let inserted = match create_many_inner(tables, entity, data, skip_duplicates) {
        Ok(rows) => rows,
        Err(err) => {
            *tables.table_mut(entity.name)? = backup;
            return Err(err);
        }
    };

    let mut records = Vec::with_capacity(inserted.len());
    let mut audits = Vec::new();
    for row in &inserted {
        records.push(shape(tables, ctx.omit, entity, row)?);
        audits.extend(audit_for(entity, ctx, action, row, None, Some(row)));
    }
    Ok((records, audits))
}

fn create_many_inner(
    tables: &mut TableSet,
    entity: &EntityDef,
    data: &[Data],
    skip_duplicates: bool,
) -> Result<Vec<Row>> {
    let mut inserted = Vec::new();
    for payload in data {
        let row = build_create_row(tables, entity, payload)?;
        match tables.insert(entity.name, row.clone()) {
            Ok(_) => inserted.push(row),
            Err(DbError::UniqueViolation { .. }) if skip_duplicates => {}
            Err(err) => return Err(err),
        }
    }
    Ok(inserted)
}

pub fn update(
    tables: &mut TableSet,
    entity: &EntityDef,
    by: &UniqueWhere,
    data: &Data,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(Record, Vec<AuditEntry>)> {
    let (row_id, old) = locate_unique(tables, entity, by)?;
    let new_row = build_update_row(tables, entity, &old, data)?;
    tables.update(entity.name, row_id, new_row.clone())?;

    let record = shape(tables, ctx.omit, entity, &new_row)?;
    let audits = audit_for(entity, ctx, action, &new_row, Some(&old), Some(&new_row))
        .into_iter()
        .collect();
    Ok((record, audits))
}

pub fn update_many(
    tables: &mut TableSet,
    entity: &EntityDef,
    args: &UpdateManyArgs,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(Vec<Record>, Vec<AuditEntry>)> {
    if let Some(filter) = &args.filter {
        eval::validate(tables.registry(), entity, filter)?;
    }
    let targets = collect_targets(tables, entity, args.filter.as_ref(), args.limit)?;

    let backup = tables.table(entity.name)?.clone();
    let updated = match update_many_inner(tables, entity, &targets, &args.data) {
        Ok(rows) => rows,
        Err(err) => {
            *tables.table_mut(entity.name)? = backup;
            return Err(err);
        }
    };

    let mut records = Vec::with_capacity(updated.len());
    let mut audits = Vec::new();
    for ((_, old), new_row) in targets.iter().zip(&updated) {
        records.push(shape(tables, ctx.omit, entity, new_row)?);
        audits.extend(audit_for(entity, ctx, action, new_row, Some(old), Some(new_row)));
    }
    Ok((records, audits))
}

fn update_many_inner(
    tables: &mut TableSet,
    entity: &EntityDef,
    targets: &[(RowId, Row)],
    data: &Data,
) -> Result<Vec<Row>> {
    let mut updated = Vec::with_capacity(targets.len());
    for (row_id, old) in targets {
        let new_row = build_update_row(tables, entity, old, data)?;
        tables.update(entity.name, *row_id, new_row.clone())?;
        updated.push(new_row);
    }
    Ok(updated)
}

/// Updates the row matching `by` if it exists, creates it otherwise.
/// Both branches audit under the `upsert` action.
pub fn upsert(
    tables: &mut TableSet,
    entity: &EntityDef,
    by: &UniqueWhere,
    create_data: &Data,
    update_data: &Data,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(Record, Vec<AuditEntry>)> {
    let idx = unique_index(entity, by)?;
    let exists = tables
        .table(entity.name)?
        .find_by_field(idx, &by.value)
        .is_some();
    if exists {
        update(tables, entity, by, update_data, ctx, action)
    } else {
        create(tables, entity, create_data, ctx, action)
    }
}

/// Removes the row matching `by` and returns its last state.
pub fn delete(
    tables: &mut TableSet,
    entity: &EntityDef,
    by: &UniqueWhere,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(Record, Vec<AuditEntry>)> {
    let (row_id, old) = locate_unique(tables, entity, by)?;
    tables.delete(entity.name, row_id)?;

    let record = shape(tables, ctx.omit, entity, &old)?;
    let audits = audit_for(entity, ctx, action, &old, Some(&old), None)
        .into_iter()
        .collect();
    Ok((record, audits))
}

/// Removes every matching row. Restrict checks run for all victims
/// before the first removal, so a blocked row aborts the batch with
/// nothing deleted.
pub fn delete_many(
    tables: &mut TableSet,
    entity: &EntityDef,
    args: &DeleteManyArgs,
    ctx: WriteContext<'_>,
    action: &str,
) -> Result<(u64, Vec<AuditEntry>)> {
    if let Some(filter) = &args.filter {
        eval::validate(tables.registry(), entity, filter)?;
    }
    let targets = collect_targets(tables, entity, args.filter.as_ref(), args.limit)?;

    let id_idx = entity.id_index();
    for (_, row) in &targets {
        tables.check_restrict(entity.name, &row[id_idx])?;
    }

    let mut audits = Vec::new();
    for (row_id, old) in &targets {
        tables.delete(entity.name, *row_id)?;
        audits.extend(audit_for(entity, ctx, action, old, Some(old), None));
    }
    Ok((targets.len() as u64, audits))
}

/// Assembles a full row from a create payload: explicit values win,
/// then field defaults, then null for optional fields. A required field
/// with no value and no default rejects the create.
fn build_create_row(tables: &TableSet, entity: &EntityDef, data: &Data) -> Result<Row> {
    let provided = resolve_payload(tables, entity, data)?;

    let now = Utc::now();
    let mut row = Vec::with_capacity(entity.fields.len());
    for (idx, field) in entity.fields.iter().enumerate() {
        if let Some(value) = provided.get(&idx) {
            row.push(value.clone());
            continue;
        }
        let value = match field.default {
            FieldDefault::Uuid => Value::Text(Uuid::new_v4().to_string()),
            FieldDefault::Now => Value::DateTime(now),
            FieldDefault::Text(text) => Value::Text(text.to_string()),
            FieldDefault::Bool(flag) => Value::Boolean(flag),
            FieldDefault::Int(number) => Value::Integer(number),
            FieldDefault::None if field.updated_at => Value::DateTime(now),
            FieldDefault::None if field.nullable => Value::Null,
            FieldDefault::None => {
                return Err(DbError::Validation(format!(
                    "create on {} is missing required field {}",
                    entity.name, field.name
                )));
            }
        };
        row.push(value);
    }
    Ok(row)
}

/// Applies an update payload over the existing row. `updatedAt` fields
/// bump to now unless the payload set them explicitly.
fn build_update_row(
    tables: &TableSet,
    entity: &EntityDef,
    old: &Row,
    data: &Data,
) -> Result<Row> {
    let provided = resolve_payload(tables, entity, data)?;

    let mut row = old.clone();
    for (idx, value) in &provided {
        row[*idx] = value.clone();
    }
    let now = Utc::now();
    for (idx, field) in entity.fields.iter().enumerate() {
        if field.updated_at && !provided.contains_key(&idx) {
            row[idx] = Value::DateTime(now);
        }
    }
    Ok(row)
}

/// Resolves a payload to field indexes: scalar entries map directly,
/// connect entries become the relation's foreign key. Setting a field
/// both ways, or passing a scalar value under a relation name, rejects
/// the payload.
fn resolve_payload(
    tables: &TableSet,
    entity: &EntityDef,
    data: &Data,
) -> Result<HashMap<usize, Value>> {
    let mut provided: HashMap<usize, Value> = HashMap::new();
    for (name, payload) in data.entries() {
        match payload {
            DataValue::Value(value) => {
                if entity.find_relation(name).is_some() {
                    return Err(DbError::Validation(format!(
                        "{} is a relation on {}; set its foreign key or use connect",
                        name, entity.name
                    )));
                }
                let idx = entity.field_index(name)?;
                if provided.insert(idx, value.clone()).is_some() {
                    return Err(duplicate_assignment(entity, idx));
                }
            }
            DataValue::Connect(by) => {
                let relation = *entity.relation(name)?;
                if relation.kind != RelationKind::ToOne {
                    return Err(DbError::Validation(format!(
                        "connect on {}.{} requires a to-one relation",
                        entity.name, name
                    )));
                }
                let idx = entity.field_index(relation.fk_field)?;
                let target_id = resolve_connect(tables, relation.target, by)?;
                if provided.insert(idx, target_id).is_some() {
                    return Err(duplicate_assignment(entity, idx));
                }
            }
        }
    }
    Ok(provided)
}

fn duplicate_assignment(entity: &EntityDef, idx: usize) -> DbError {
    DbError::Validation(format!(
        "{}.{} is set both directly and through connect",
        entity.name, entity.fields[idx].name
    ))
}

/// Looks up the connect target and returns its primary key value.
fn resolve_connect(tables: &TableSet, target: &str, by: &UniqueWhere) -> Result<Value> {
    let table = tables.table(target)?;
    let target_entity = table.entity();
    let idx = unique_index(target_entity, by)?;
    let (_, row) = table
        .find_by_field(idx, &by.value)
        .ok_or_else(|| DbError::NotFound {
            entity: target.to_string(),
        })?;
    Ok(row[target_entity.id_index()].clone())
}

fn unique_index(entity: &EntityDef, by: &UniqueWhere) -> Result<usize> {
    let field = entity.field(&by.field)?;
    if !field.unique {
        return Err(DbError::Validation(format!(
            "{}.{} is not unique and cannot anchor a unique lookup",
            entity.name, by.field
        )));
    }
    if by.value.is_null() {
        return Err(DbError::Validation(format!(
            "unique lookup on {}.{} cannot use null",
            entity.name, by.field
        )));
    }
    entity.field_index(&by.field)
}

fn locate_unique(tables: &TableSet, entity: &EntityDef, by: &UniqueWhere) -> Result<(RowId, Row)> {
    let idx = unique_index(entity, by)?;
    tables
        .table(entity.name)?
        .find_by_field(idx, &by.value)
        .map(|(id, row)| (id, row.clone()))
        .ok_or_else(|| DbError::NotFound {
            entity: entity.name.to_string(),
        })
}

/// Rows a batch mutation will touch, in insertion order, capped by
/// `limit`. No filter means every row.
pub(crate) fn collect_targets(
    tables: &TableSet,
    entity: &EntityDef,
    filter: Option<&Filter>,
    limit: Option<u64>,
) -> Result<Vec<(RowId, Row)>> {
    let table = tables.table(entity.name)?;
    let mut targets = Vec::new();
    for (row_id, row) in table.iter() {
        if limit.is_some_and(|limit| targets.len() as u64 >= limit) {
            break;
        }
        let keep = match filter {
            Some(filter) => eval::matches(tables, entity, row, filter)?,
            None => true,
        };
        if keep {
            targets.push((row_id, row.clone()));
        }
    }
    Ok(targets)
}

fn shape(
    tables: &TableSet,
    omit: &HashMap<String, Vec<String>>,
    entity: &EntityDef,
    row: &Row,
) -> Result<Record> {
    resolve::shape_row(ShapeContext { tables, omit }, entity, row, &Selection::Default)
}

fn audit_for(
    entity: &EntityDef,
    ctx: WriteContext<'_>,
    action: &str,
    row_with_id: &Row,
    old: Option<&Row>,
    new: Option<&Row>,
) -> Option<AuditEntry> {
    if !entity.audited {
        return None;
    }
    let actor = ctx.actor?;
    let entity_id = row_with_id[entity.id_index()].to_string();
    let mut entry = AuditEntry::new(action, entity.name, entity_id, actor);
    if let Some(row) = old {
        entry = entry.old_data(audit::snapshot(entity, row));
    }
    if let Some(row) = new {
        entry = entry.new_data(audit::snapshot(entity, row));
    }
    Some(entry)
}
