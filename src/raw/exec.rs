use std::collections::HashMap;

use chrono::Utc;

use crate::core::{DbError, Result, Row, RowId, Value};
use crate::filter::eval;
use crate::mutation::engine::collect_targets;
use crate::query::{paginate, sort};
use crate::raw::translate::{
    DeleteStmt, InsertStmt, Projection, RawStatement, SelectStmt, UpdateStmt,
};
use crate::result::QueryResult;
use crate::schema::{EntityDef, FieldDefault};
use crate::store::TableSet;

pub(crate) fn run_query(tables: &TableSet, statement: RawStatement) -> Result<QueryResult> {
    match statement {
        RawStatement::Select(select) => run_select(tables, select),
        _ => Err(DbError::Validation(
            "write statements must go through execute_raw".to_string(),
        )),
    }
}

pub(crate) fn run_execute(tables: &mut TableSet, statement: RawStatement) -> Result<u64> {
    match statement {
        RawStatement::Insert(insert) => run_insert(tables, insert),
        RawStatement::Update(update) => run_update(tables, update),
        RawStatement::Delete(delete) => run_delete(tables, delete),
        RawStatement::Select(_) => Err(DbError::Validation(
            "SELECT must go through query_raw".to_string(),
        )),
    }
}

fn run_select(tables: &TableSet, select: SelectStmt) -> Result<QueryResult> {
    let entity = tables.registry().entity(&select.entity)?;
    if let Some(filter) = &select.filter {
        eval::validate(tables.registry(), entity, filter)?;
    }
    sort::validate(entity, &select.order_by)?;

    let mut rows = collect_targets(tables, entity, select.filter.as_ref(), None)?;
    sort::sort_rows(entity, &mut rows, &select.order_by)?;
    paginate::apply_skip_take(&mut rows, select.offset, select.limit.map(|n| n as i64));

    project(entity, rows, select.projection)
}

fn project(entity: &EntityDef, rows: Vec<(RowId, Row)>, projection: Projection) -> Result<QueryResult> {
    match projection {
        Projection::All => {
            let columns = entity.fields.iter().map(|f| f.name.to_string()).collect();
            let rows = rows.into_iter().map(|(_, row)| row).collect();
            Ok(QueryResult::new(columns, rows))
        }
        Projection::Columns(names) => {
            let indexes = names
                .iter()
                .map(|name| entity.field_index(name))
                .collect::<Result<Vec<_>>>()?;
            let rows = rows
                .into_iter()
                .map(|(_, row)| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect();
            Ok(QueryResult::new(names, rows))
        }
        Projection::CountAll => Ok(QueryResult::new(
            vec!["count".to_string()],
            vec![vec![Value::Integer(rows.len() as i64)]],
        )),
    }
}

/// Multi-row INSERT is atomic: constraint failure on any row restores
/// the table to its pre-statement state.
fn run_insert(tables: &mut TableSet, insert: InsertStmt) -> Result<u64> {
    let entity = tables.registry().entity(&insert.entity)?;
    let backup = tables.table(entity.name)?.clone();

    match insert_rows(tables, entity, &insert) {
        Ok(count) => Ok(count),
        Err(err) => {
            *tables.table_mut(entity.name)? = backup;
            Err(err)
        }
    }
}

fn insert_rows(tables: &mut TableSet, entity: &EntityDef, insert: &InsertStmt) -> Result<u64> {
    let mut count = 0;
    for values in &insert.rows {
        let row = build_insert_row(entity, &insert.columns, values.clone())?;
        tables.insert(entity.name, row)?;
        count += 1;
    }
    Ok(count)
}

fn build_insert_row(entity: &EntityDef, columns: &[String], values: Vec<Value>) -> Result<Row> {
    if columns.is_empty() {
        if values.len() != entity.fields.len() {
            return Err(DbError::Validation(format!(
                "INSERT into {} without a column list expects {} values, got {}",
                entity.name,
                entity.fields.len(),
                values.len()
            )));
        }
        return Ok(values);
    }

    if values.len() != columns.len() {
        return Err(DbError::Validation(format!(
            "INSERT into {} names {} columns but provides {} values",
            entity.name,
            columns.len(),
            values.len()
        )));
    }

    let mut provided: HashMap<usize, Value> = HashMap::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(values) {
        let index = entity.field_index(column)?;
        if provided.insert(index, value).is_some() {
            return Err(DbError::Validation(format!(
                "INSERT into {} names column {} twice",
                entity.name, column
            )));
        }
    }

    let mut row = Vec::with_capacity(entity.fields.len());
    for (index, field) in entity.fields.iter().enumerate() {
        let value = match provided.remove(&index) {
            Some(value) => value,
            // Timestamp and literal defaults behave like column DEFAULTs.
            // Id generation belongs to the typed surface, so omitted ids
            // surface as a required-field error from the store.
            None => match field.default {
                FieldDefault::Now => Value::DateTime(Utc::now()),
                FieldDefault::Text(text) => Value::Text(text.to_string()),
                FieldDefault::Bool(flag) => Value::Boolean(flag),
                FieldDefault::Int(n) => Value::Integer(n),
                FieldDefault::Uuid | FieldDefault::None => Value::Null,
            },
        };
        row.push(value);
    }
    Ok(row)
}

/// UPDATE assigns the given values verbatim: no `updatedAt` bump, which
/// matches a direct statement that bypasses the typed mutation path.
fn run_update(tables: &mut TableSet, update: UpdateStmt) -> Result<u64> {
    let entity = tables.registry().entity(&update.entity)?;
    if let Some(filter) = &update.filter {
        eval::validate(tables.registry(), entity, filter)?;
    }

    let assignments = update
        .assignments
        .iter()
        .map(|(column, value)| Ok((entity.field_index(column)?, value.clone())))
        .collect::<Result<Vec<(usize, Value)>>>()?;

    let targets = collect_targets(tables, entity, update.filter.as_ref(), None)?;
    let backup = tables.table(entity.name)?.clone();

    match apply_updates(tables, entity, &targets, &assignments) {
        Ok(count) => Ok(count),
        Err(err) => {
            *tables.table_mut(entity.name)? = backup;
            Err(err)
        }
    }
}

fn apply_updates(
    tables: &mut TableSet,
    entity: &EntityDef,
    targets: &[(RowId, Row)],
    assignments: &[(usize, Value)],
) -> Result<u64> {
    for (row_id, row) in targets {
        let mut updated = row.clone();
        for (index, value) in assignments {
            updated[*index] = value.clone();
        }
        tables.update(entity.name, *row_id, updated)?;
    }
    Ok(targets.len() as u64)
}

fn run_delete(tables: &mut TableSet, delete: DeleteStmt) -> Result<u64> {
    let entity = tables.registry().entity(&delete.entity)?;
    if let Some(filter) = &delete.filter {
        eval::validate(tables.registry(), entity, filter)?;
    }

    let targets = collect_targets(tables, entity, delete.filter.as_ref(), None)?;

    // Restrict checks run for every victim before the first removal, so
    // a blocked row cannot leave a partial delete behind.
    let id_index = entity.id_index();
    for (_, row) in &targets {
        tables.check_restrict(entity.name, &row[id_index])?;
    }
    for (row_id, _) in &targets {
        tables.delete(entity.name, *row_id)?;
    }
    Ok(targets.len() as u64)
}
