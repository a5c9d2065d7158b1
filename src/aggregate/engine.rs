//! Count, aggregate and groupBy execution. All validation runs before
//! any rows are touched, so a malformed request never half-executes.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::aggregate::{AggregateArgs, AggregateSelection, GroupByArgs, GroupOrderBy, Having};
use crate::core::{DbError, Result, Row, Value};
use crate::filter::{eval, Filter};
use crate::query::SortOrder;
use crate::result::{Payload, Record};
use crate::schema::{EntityDef, SchemaRegistry};
use crate::store::TableSet;

/// Number of rows matching `filter`.
pub fn count(tables: &TableSet, entity: &EntityDef, filter: Option<&Filter>) -> Result<u64> {
    if let Some(filter) = filter {
        eval::validate(tables.registry(), entity, filter)?;
    }
    let table = tables.table(entity.name)?;
    let mut total = 0;
    for (_, row) in table.iter() {
        if passes(tables, entity, row, filter)? {
            total += 1;
        }
    }
    Ok(total)
}

/// Per-field count breakdown: `_all` is the matching row count, each
/// named field counts its non-null values.
pub fn count_fields(
    tables: &TableSet,
    entity: &EntityDef,
    filter: Option<&Filter>,
    fields: &[String],
) -> Result<Record> {
    if let Some(filter) = filter {
        eval::validate(tables.registry(), entity, filter)?;
    }
    let indexes: Vec<usize> = fields
        .iter()
        .map(|field| entity.field_index(field))
        .collect::<Result<_>>()?;

    let table = tables.table(entity.name)?;
    let mut total = 0i64;
    let mut counts = vec![0i64; indexes.len()];
    for (_, row) in table.iter() {
        if !passes(tables, entity, row, filter)? {
            continue;
        }
        total += 1;
        for (slot, idx) in counts.iter_mut().zip(&indexes) {
            if !row[*idx].is_null() {
                *slot += 1;
            }
        }
    }

    let mut record = Record::new();
    record.push_value("_all", Value::Integer(total));
    for (field, non_null) in fields.iter().zip(counts) {
        record.push_value(field.clone(), Value::Integer(non_null));
    }
    Ok(record)
}

pub fn aggregate(tables: &TableSet, entity: &EntityDef, args: &AggregateArgs) -> Result<Record> {
    if args.selection.is_empty() {
        return Err(DbError::Validation(format!(
            "aggregate on {} must request at least one of _count, _min or _max",
            entity.name
        )));
    }
    validate_selection(entity, &args.selection)?;
    if let Some(filter) = &args.filter {
        eval::validate(tables.registry(), entity, filter)?;
    }

    let rows = matching_rows(tables, entity, args.filter.as_ref())?;
    shape_aggregates(entity, &rows, &args.selection)
}

/// Buckets matching rows by the `by` fields, keeps buckets passing
/// `having`, orders and windows them, and emits one record per bucket:
/// the grouped values followed by the requested aggregates.
pub fn group_by(tables: &TableSet, entity: &EntityDef, args: &GroupByArgs) -> Result<Vec<Record>> {
    validate_group_by(tables.registry(), entity, args)?;

    let by_indexes: Vec<usize> = args
        .by
        .iter()
        .map(|field| entity.field_index(field))
        .collect::<Result<_>>()?;

    // Buckets in first-seen order, which tracks the table's insertion
    // order and keeps unordered output deterministic.
    let mut seen: Vec<Vec<Value>> = Vec::new();
    let mut buckets: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();
    for row in matching_rows(tables, entity, args.filter.as_ref())? {
        let key: Vec<Value> = by_indexes.iter().map(|idx| row[*idx].clone()).collect();
        if !buckets.contains_key(&key) {
            seen.push(key.clone());
        }
        buckets.entry(key).or_default().push(row);
    }
    let mut groups: Vec<(Vec<Value>, Vec<Row>)> = seen
        .into_iter()
        .filter_map(|key| buckets.remove(&key).map(|rows| (key, rows)))
        .collect();

    if let Some(having) = &args.having {
        let mut kept = Vec::with_capacity(groups.len());
        for (key, rows) in groups {
            if eval_having(entity, &args.by, &key, &rows, having)? {
                kept.push((key, rows));
            }
        }
        groups = kept;
    }

    if !args.order_by.is_empty() {
        sort_groups(&args.by, &args.order_by, &mut groups);
    }

    let skip = args.skip.min(groups.len() as u64) as usize;
    groups.drain(..skip);
    if let Some(take) = args.take {
        if take >= 0 {
            groups.truncate(take as usize);
        } else {
            let keep = take.unsigned_abs().min(groups.len() as u64) as usize;
            let cut = groups.len() - keep;
            groups.drain(..cut);
        }
    }

    groups
        .into_iter()
        .map(|(key, rows)| {
            let mut record = Record::new();
            for (field, value) in args.by.iter().zip(key) {
                record.push_value(field.clone(), value);
            }
            let aggregates = shape_aggregates(entity, &rows, &args.selection)?;
            for (name, payload) in aggregates.entries() {
                record.push(name.clone(), payload.clone());
            }
            Ok(record)
        })
        .collect()
}

fn validate_group_by(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    args: &GroupByArgs,
) -> Result<()> {
    if args.by.is_empty() {
        return Err(DbError::Validation(format!(
            "groupBy on {} requires a non-empty by",
            entity.name
        )));
    }
    for field in &args.by {
        entity.field(field)?;
    }
    if let Some(filter) = &args.filter {
        eval::validate(registry, entity, filter)?;
    }
    validate_selection(entity, &args.selection)?;

    if (args.take.is_some() || args.skip > 0) && args.order_by.is_empty() {
        return Err(DbError::Validation(
            "groupBy take/skip requires orderBy for a deterministic window".to_string(),
        ));
    }
    for order in &args.order_by {
        if let GroupOrderBy::Field(order) = order {
            if !args.by.iter().any(|field| *field == order.field) {
                return Err(DbError::Validation(format!(
                    "groupBy orderBy field {} must appear in by",
                    order.field
                )));
            }
        }
    }
    if let Some(having) = &args.having {
        validate_having(registry, entity, &args.by, having)?;
    }
    Ok(())
}

fn validate_having(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    by: &[String],
    having: &Having,
) -> Result<()> {
    match having {
        Having::And(list) | Having::Or(list) | Having::Not(list) => {
            for sub in list {
                validate_having(registry, entity, by, sub)?;
            }
            Ok(())
        }
        Having::Field(scalar) => {
            eval::validate(registry, entity, &Filter::Scalar(scalar.clone()))?;
            if !by.iter().any(|field| *field == scalar.field) {
                return Err(DbError::Validation(format!(
                    "groupBy having field {} must appear in by",
                    scalar.field
                )));
            }
            Ok(())
        }
        Having::Count(_) => Ok(()),
        Having::Min(field, _) | Having::Max(field, _) => {
            let def = entity.field(field)?;
            if !def.data_type().is_orderable() {
                return Err(DbError::Validation(format!(
                    "_min/_max on {}.{} is not supported for {}",
                    entity.name,
                    field,
                    def.data_type()
                )));
            }
            Ok(())
        }
    }
}

fn validate_selection(entity: &EntityDef, selection: &AggregateSelection) -> Result<()> {
    for field in &selection.count_fields {
        entity.field(field)?;
    }
    for field in selection.min_fields.iter().chain(&selection.max_fields) {
        let def = entity.field(field)?;
        if !def.data_type().is_orderable() {
            return Err(DbError::Validation(format!(
                "_min/_max on {}.{} is not supported for {}",
                entity.name,
                field,
                def.data_type()
            )));
        }
    }
    Ok(())
}

fn eval_having(
    entity: &EntityDef,
    by: &[String],
    key: &[Value],
    rows: &[Row],
    having: &Having,
) -> Result<bool> {
    match having {
        Having::And(list) => {
            for sub in list {
                if !eval_having(entity, by, key, rows, sub)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Having::Or(list) => {
            for sub in list {
                if eval_having(entity, by, key, rows, sub)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Having::Not(list) => {
            for sub in list {
                if eval_having(entity, by, key, rows, sub)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Having::Field(scalar) => {
            let pos = by
                .iter()
                .position(|field| *field == scalar.field)
                .ok_or_else(|| {
                    DbError::Validation(format!(
                        "groupBy having field {} must appear in by",
                        scalar.field
                    ))
                })?;
            eval::eval_scalar_op(&key[pos], &scalar.op)
        }
        Having::Count(op) => eval::eval_scalar_op(&Value::Integer(rows.len() as i64), op),
        Having::Min(field, op) => {
            let idx = entity.field_index(field)?;
            eval::eval_scalar_op(&fold_extreme(rows, idx, Ordering::Less)?, op)
        }
        Having::Max(field, op) => {
            let idx = entity.field_index(field)?;
            eval::eval_scalar_op(&fold_extreme(rows, idx, Ordering::Greater)?, op)
        }
    }
}

fn sort_groups(by: &[String], order_by: &[GroupOrderBy], groups: &mut [(Vec<Value>, Vec<Row>)]) {
    groups.sort_by(|(key_a, rows_a), (key_b, rows_b)| {
        for order in order_by {
            let ordering = match order {
                GroupOrderBy::Field(order) => {
                    let pos = by
                        .iter()
                        .position(|field| *field == order.field)
                        .unwrap_or(0);
                    // Grouped values share the field's type; cross-type
                    // comparison cannot happen here.
                    let cmp = key_a[pos].compare(&key_b[pos]).unwrap_or(Ordering::Equal);
                    directed(cmp, order.order)
                }
                GroupOrderBy::Count(direction) => {
                    directed(rows_a.len().cmp(&rows_b.len()), *direction)
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn shape_aggregates(entity: &EntityDef, rows: &[Row], selection: &AggregateSelection) -> Result<Record> {
    let mut record = Record::new();

    if selection.count_all || !selection.count_fields.is_empty() {
        if selection.count_fields.is_empty() {
            record.push_value("_count", Value::Integer(rows.len() as i64));
        } else {
            let mut counts = Record::new();
            if selection.count_all {
                counts.push_value("_all", Value::Integer(rows.len() as i64));
            }
            for field in &selection.count_fields {
                let idx = entity.field_index(field)?;
                let non_null = rows.iter().filter(|row| !row[idx].is_null()).count();
                counts.push_value(field.clone(), Value::Integer(non_null as i64));
            }
            record.push("_count", Payload::Record(counts));
        }
    }

    if !selection.min_fields.is_empty() {
        let mut mins = Record::new();
        for field in &selection.min_fields {
            let idx = entity.field_index(field)?;
            mins.push_value(field.clone(), fold_extreme(rows, idx, Ordering::Less)?);
        }
        record.push("_min", Payload::Record(mins));
    }
    if !selection.max_fields.is_empty() {
        let mut maxes = Record::new();
        for field in &selection.max_fields {
            let idx = entity.field_index(field)?;
            maxes.push_value(field.clone(), fold_extreme(rows, idx, Ordering::Greater)?);
        }
        record.push("_max", Payload::Record(maxes));
    }
    Ok(record)
}

/// Folds the non-null values of a column to the one that compares
/// `keep` against the rest. Null when every value is null.
fn fold_extreme(rows: &[Row], idx: usize, keep: Ordering) -> Result<Value> {
    let mut best: Option<&Value> = None;
    for row in rows {
        let value = &row[idx];
        if value.is_null() {
            continue;
        }
        best = match best {
            None => Some(value),
            Some(current) => {
                if value.compare(current)? == keep {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn matching_rows(
    tables: &TableSet,
    entity: &EntityDef,
    filter: Option<&Filter>,
) -> Result<Vec<Row>> {
    let table = tables.table(entity.name)?;
    let mut rows = Vec::new();
    for (_, row) in table.iter() {
        if passes(tables, entity, row, filter)? {
            rows.push(row.clone());
        }
    }
    Ok(rows)
}

fn passes(
    tables: &TableSet,
    entity: &EntityDef,
    row: &Row,
    filter: Option<&Filter>,
) -> Result<bool> {
    match filter {
        Some(filter) => eval::matches(tables, entity, row, filter),
        None => Ok(true),
    }
}
