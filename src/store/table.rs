use std::collections::BTreeMap;

use crate::core::{DbError, Result, Row, RowId, Value};
use crate::schema::EntityDef;

/// Rows of one entity, keyed by a monotonically increasing handle.
/// Iteration order is insertion order, which keeps unordered scans
/// deterministic.
#[derive(Debug, Clone)]
pub struct Table {
    entity: EntityDef,
    rows: BTreeMap<RowId, Row>,
    next_row_id: RowId,
}

impl Table {
    pub fn new(entity: EntityDef) -> Self {
        Self {
            entity,
            rows: BTreeMap::new(),
            next_row_id: 0,
        }
    }

    pub fn entity(&self) -> &EntityDef {
        &self.entity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    /// Locates a row by its primary key value.
    pub fn find_by_id(&self, id_value: &Value) -> Option<(RowId, &Row)> {
        let idx = self.entity.id_index();
        self.rows
            .iter()
            .find(|(_, row)| &row[idx] == id_value)
            .map(|(id, row)| (*id, row))
    }

    /// First row whose field at `field_idx` equals `value`.
    pub fn find_by_field(&self, field_idx: usize, value: &Value) -> Option<(RowId, &Row)> {
        self.rows
            .iter()
            .find(|(_, row)| &row[field_idx] == value)
            .map(|(id, row)| (*id, row))
    }

    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.entity.fields.len() {
            return Err(DbError::Execution(format!(
                "{} row has {} values, schema defines {} fields",
                self.entity.name,
                row.len(),
                self.entity.fields.len()
            )));
        }
        for (field, value) in self.entity.fields.iter().zip(row) {
            field.validate(self.entity.name, value)?;
        }
        Ok(())
    }

    /// Checks every unique field of `row` against the stored rows.
    /// Null values never collide, and `ignore` excludes the row being
    /// updated from its own check.
    pub fn check_unique(&self, row: &Row, ignore: Option<RowId>) -> Result<()> {
        for (idx, field) in self.entity.unique_fields() {
            let value = &row[idx];
            if value.is_null() {
                continue;
            }
            let taken = self
                .rows
                .iter()
                .any(|(id, existing)| Some(*id) != ignore && &existing[idx] == value);
            if taken {
                return Err(DbError::UniqueViolation {
                    entity: self.entity.name.to_string(),
                    field: field.name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validates and stores a new row. Foreign keys are the caller's
    /// concern; they need visibility across tables.
    pub fn insert(&mut self, row: Row) -> Result<RowId> {
        self.validate_row(&row)?;
        self.check_unique(&row, None)?;

        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        Ok(id)
    }

    pub fn update(&mut self, id: RowId, row: Row) -> Result<()> {
        self.validate_row(&row)?;
        self.check_unique(&row, Some(id))?;

        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(DbError::Execution(format!(
                "{} row {} vanished during update",
                self.entity.name, id
            ))),
        }
    }

    pub fn remove(&mut self, id: RowId) -> Option<Row> {
        self.rows.remove(&id)
    }
}
