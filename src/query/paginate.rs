use std::collections::HashSet;

use crate::core::{DbError, Result, Row, RowId, Value};
use crate::query::UniqueWhere;
use crate::schema::EntityDef;

/// Positions the window at the row matching the cursor, inclusive.
/// A cursor that matches no row empties the window.
pub fn apply_cursor(
    entity: &EntityDef,
    rows: &mut Vec<(RowId, Row)>,
    cursor: &UniqueWhere,
) -> Result<()> {
    let idx = entity.field_index(&cursor.field)?;
    if !entity.fields[idx].unique {
        return Err(DbError::Validation(format!(
            "cursor field {}.{} is not unique",
            entity.name, cursor.field
        )));
    }
    match rows.iter().position(|(_, row)| row[idx] == cursor.value) {
        Some(pos) => {
            rows.drain(..pos);
        }
        None => rows.clear(),
    }
    Ok(())
}

/// Applies `skip`, then `take`. A negative `take` keeps that many rows
/// from the tail of the window instead of the head, preserving order.
pub fn apply_skip_take(rows: &mut Vec<(RowId, Row)>, skip: u64, take: Option<i64>) {
    let skip = skip.min(rows.len() as u64) as usize;
    rows.drain(..skip);

    if let Some(take) = take {
        if take >= 0 {
            rows.truncate(take as usize);
        } else {
            let keep = take.unsigned_abs().min(rows.len() as u64) as usize;
            let cut = rows.len() - keep;
            rows.drain(..cut);
        }
    }
}

/// Keeps the first row per distinct combination of the listed fields,
/// in the current (already sorted) order.
pub fn apply_distinct(entity: &EntityDef, rows: &mut Vec<(RowId, Row)>, fields: &[String]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let indexes: Vec<usize> = fields
        .iter()
        .map(|f| entity.field_index(f))
        .collect::<Result<_>>()?;

    let mut seen: HashSet<Vec<Value>> = HashSet::new();
    rows.retain(|(_, row)| {
        let key: Vec<Value> = indexes.iter().map(|idx| row[*idx].clone()).collect();
        seen.insert(key)
    });
    Ok(())
}
