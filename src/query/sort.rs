use std::cmp::Ordering;

use crate::core::{DbError, Result, Row, RowId};
use crate::schema::EntityDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One `orderBy` key. Multi-key ordering applies keys left to right.
///
/// Null handling follows SQL: NULLS LAST ascending, NULLS FIRST
/// descending.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

pub fn validate(entity: &EntityDef, order_by: &[OrderBy]) -> Result<()> {
    for key in order_by {
        let field = entity.field(&key.field)?;
        if !field.data_type().is_orderable() {
            return Err(DbError::Validation(format!(
                "cannot order by {}.{}: {} has no ordering",
                entity.name,
                key.field,
                field.data_type()
            )));
        }
    }
    Ok(())
}

/// Stable multi-key sort. Rows arrive in insertion order, so equal keys
/// keep a deterministic relative order across identical calls.
pub fn sort_rows(entity: &EntityDef, rows: &mut [(RowId, Row)], order_by: &[OrderBy]) -> Result<()> {
    if order_by.is_empty() {
        return Ok(());
    }
    validate(entity, order_by)?;

    let keys: Vec<(usize, SortOrder)> = order_by
        .iter()
        .map(|k| entity.field_index(&k.field).map(|idx| (idx, k.order)))
        .collect::<Result<_>>()?;

    rows.sort_by(|(_, a), (_, b)| {
        for (idx, order) in &keys {
            // Types are uniform per column, so comparison cannot fail here.
            let ord = a[*idx].compare(&b[*idx]).unwrap_or(Ordering::Equal);
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}
