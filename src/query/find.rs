use std::collections::HashMap;

use crate::core::{DbError, Result, Row, RowId};
use crate::filter::eval;
use crate::query::{paginate, sort, FindManyArgs, FindUniqueArgs};
use crate::result::Record;
use crate::schema::{EntityDef, SchemaRegistry};
use crate::select::resolve::{self, ShapeContext};

/// Pre-dispatch validation for `findMany`/`findFirst` arguments.
pub fn validate_many(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    args: &FindManyArgs,
    global_omit: &HashMap<String, Vec<String>>,
) -> Result<()> {
    if let Some(filter) = &args.filter {
        eval::validate(registry, entity, filter)?;
    }
    sort::validate(entity, &args.order_by)?;
    if let Some(cursor) = &args.cursor {
        let field = entity.field(&cursor.field)?;
        if !field.unique {
            return Err(DbError::Validation(format!(
                "cursor field {}.{} is not unique",
                entity.name, cursor.field
            )));
        }
    }
    for field in &args.distinct {
        entity.field(field)?;
    }
    resolve::validate(registry, entity, &args.selection, global_omit)
}

pub fn validate_unique(
    registry: &SchemaRegistry,
    entity: &EntityDef,
    args: &FindUniqueArgs,
    global_omit: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let field = entity.field(&args.by.field)?;
    if !field.unique {
        return Err(DbError::Validation(format!(
            "{}.{} is not a unique field",
            entity.name, args.by.field
        )));
    }
    if args.by.value.is_null() {
        return Err(DbError::Validation(format!(
            "unique lookup on {}.{} requires a non-null value",
            entity.name, args.by.field
        )));
    }
    resolve::validate(registry, entity, &args.selection, global_omit)
}

/// The find pipeline: filter, order, cursor, distinct, then the
/// skip/take window, shaping the survivors.
pub fn find_many(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    args: &FindManyArgs,
) -> Result<Vec<Record>> {
    let table = ctx.tables.table(entity.name)?;

    let mut rows: Vec<(RowId, Row)> = Vec::new();
    for (id, row) in table.iter() {
        let keep = match &args.filter {
            Some(filter) => eval::matches(ctx.tables, entity, row, filter)?,
            None => true,
        };
        if keep {
            rows.push((id, row.clone()));
        }
    }

    sort::sort_rows(entity, &mut rows, &args.order_by)?;
    if let Some(cursor) = &args.cursor {
        paginate::apply_cursor(entity, &mut rows, cursor)?;
    }
    paginate::apply_distinct(entity, &mut rows, &args.distinct)?;
    paginate::apply_skip_take(&mut rows, args.skip, args.take);

    resolve::shape_rows(ctx, entity, &rows, &args.selection)
}

pub fn find_first(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    args: &FindManyArgs,
) -> Result<Option<Record>> {
    let mut records = find_many(ctx, entity, args)?;
    if records.is_empty() {
        Ok(None)
    } else {
        Ok(Some(records.swap_remove(0)))
    }
}

pub fn find_unique(
    ctx: ShapeContext<'_>,
    entity: &EntityDef,
    args: &FindUniqueArgs,
) -> Result<Option<Record>> {
    let table = ctx.tables.table(entity.name)?;
    let idx = entity.field_index(&args.by.field)?;

    match table.find_by_field(idx, &args.by.value) {
        Some((_, row)) => {
            let record = resolve::shape_row(ctx, entity, row, &args.selection)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::query::{OrderBy, UniqueWhere};
    use crate::store::TableSet;
    use chrono::Utc;

    fn seeded() -> TableSet {
        let registry = SchemaRegistry::portfolio();
        let mut tables = TableSet::for_registry(registry);
        let now = Utc::now();
        for (id, slug, name) in [
            ("l1", "alpha", "Alpha"),
            ("l2", "beta", "Beta"),
            ("l3", "gamma", "Alpha"),
            ("l4", "delta", "Delta"),
        ] {
            tables
                .insert(
                    "Label",
                    vec![
                        Value::from(id),
                        Value::from(slug),
                        Value::from(name),
                        Value::Null,
                        Value::Null,
                        Value::from(now),
                        Value::from(now),
                    ],
                )
                .unwrap();
        }
        tables
    }

    #[test]
    fn test_pipeline_order_cursor_then_window() {
        let tables = seeded();
        let omit = HashMap::new();
        let ctx = ShapeContext {
            tables: &tables,
            omit: &omit,
        };
        let entity = tables.registry().entity("Label").unwrap();

        let args = FindManyArgs::new()
            .order_by(OrderBy::asc("slug"))
            .cursor(UniqueWhere::new("slug", "beta"))
            .skip(1)
            .take(2);
        let records = find_many(ctx, entity, &args).unwrap();
        let slugs: Vec<_> = records
            .iter()
            .map(|r| r.value("slug").cloned().unwrap())
            .collect();
        // sorted: alpha beta delta gamma; cursor at beta; skip 1 -> delta gamma
        assert_eq!(slugs, vec![Value::from("delta"), Value::from("gamma")]);
    }

    #[test]
    fn test_find_unique_by_secondary_unique_field() {
        let tables = seeded();
        let omit = HashMap::new();
        let ctx = ShapeContext {
            tables: &tables,
            omit: &omit,
        };
        let entity = tables.registry().entity("Label").unwrap();

        let found = find_unique(
            ctx,
            entity,
            &FindUniqueArgs::new(UniqueWhere::new("slug", "gamma")),
        )
        .unwrap();
        assert_eq!(found.unwrap().value("id"), Some(&Value::from("l3")));

        let missing = find_unique(
            ctx,
            entity,
            &FindUniqueArgs::new(UniqueWhere::new("slug", "nope")),
        )
        .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_validate_rejects_non_unique_lookup() {
        let registry = SchemaRegistry::portfolio();
        let entity = registry.entity("Label").unwrap();
        let omit = HashMap::new();
        let err = validate_unique(
            registry,
            entity,
            &FindUniqueArgs::new(UniqueWhere::new("name", "Alpha")),
            &omit,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}
