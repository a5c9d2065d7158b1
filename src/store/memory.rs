use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::{DbError, Result, Row, RowId, Value};
use crate::schema::{EntityDef, RelationKind, SchemaRegistry};
use crate::store::table::Table;

/// Every table of the schema as one cloneable unit. Transactions clone
/// the whole set, work on the copy, and commit by swapping it back in.
#[derive(Debug, Clone)]
pub struct TableSet {
    registry: &'static SchemaRegistry,
    tables: HashMap<&'static str, Table>,
}

impl TableSet {
    pub fn for_registry(registry: &'static SchemaRegistry) -> Self {
        let tables = registry
            .entities()
            .iter()
            .map(|entity| (entity.name, Table::new(*entity)))
            .collect();
        Self { registry, tables }
    }

    pub fn registry(&self) -> &'static SchemaRegistry {
        self.registry
    }

    pub fn table(&self, entity: &str) -> Result<&Table> {
        self.tables
            .get(entity)
            .ok_or_else(|| DbError::UnknownEntity(entity.to_string()))
    }

    pub fn table_mut(&mut self, entity: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(entity)
            .ok_or_else(|| DbError::UnknownEntity(entity.to_string()))
    }

    /// Inserts a validated row, enforcing foreign keys across tables.
    pub fn insert(&mut self, entity: &str, row: Row) -> Result<RowId> {
        let def = *self.registry.entity(entity)?;
        self.check_foreign_keys(&def, &row)?;
        self.table_mut(entity)?.insert(row)
    }

    pub fn update(&mut self, entity: &str, id: RowId, row: Row) -> Result<()> {
        let def = *self.registry.entity(entity)?;
        self.check_foreign_keys(&def, &row)?;
        self.table_mut(entity)?.update(id, row)
    }

    /// Removes a row, applying referential actions on everything that
    /// points at it: required foreign keys reject the delete, optional
    /// ones are set to null.
    pub fn delete(&mut self, entity: &str, id: RowId) -> Result<Row> {
        let def = *self.registry.entity(entity)?;
        let id_value = {
            let table = self.table(entity)?;
            let row = table.get(id).ok_or_else(|| DbError::NotFound {
                entity: entity.to_string(),
            })?;
            row[def.id_index()].clone()
        };

        // Phase 1: collect referencing rows, rejecting on any required FK.
        let mut detach: Vec<(&'static str, RowId, usize)> = Vec::new();
        for (child, relation) in self.registry.incoming_references(entity) {
            let fk_idx = child.field_index(relation.fk_field)?;
            let nullable = child.fields[fk_idx].nullable;
            let child_table = self.table(child.name)?;
            for (child_id, child_row) in child_table.iter() {
                if child_row[fk_idx] == id_value {
                    if !nullable {
                        return Err(DbError::RestrictViolation {
                            entity: entity.to_string(),
                            child: child.name.to_string(),
                            field: relation.fk_field.to_string(),
                        });
                    }
                    detach.push((child.name, child_id, fk_idx));
                }
            }
        }

        // Phase 2: detach optional references, then drop the row.
        for (child_name, child_id, fk_idx) in detach {
            let table = self.table_mut(child_name)?;
            let mut row = table
                .get(child_id)
                .ok_or_else(|| DbError::Execution(format!("{child_name} row {child_id} vanished")))?
                .clone();
            row[fk_idx] = Value::Null;
            table.update(child_id, row)?;
        }

        self.table_mut(entity)?
            .remove(id)
            .ok_or_else(|| DbError::Execution(format!("{entity} row {id} vanished during delete")))
    }

    /// Errors if any required foreign key still points at `id_value`.
    /// Batch deletes run this for every victim up front.
    pub fn check_restrict(&self, entity: &str, id_value: &Value) -> Result<()> {
        for (child, relation) in self.registry.incoming_references(entity) {
            let fk_idx = child.field_index(relation.fk_field)?;
            if child.fields[fk_idx].nullable {
                continue;
            }
            let child_table = self.table(child.name)?;
            if child_table.iter().any(|(_, row)| &row[fk_idx] == id_value) {
                return Err(DbError::RestrictViolation {
                    entity: entity.to_string(),
                    child: child.name.to_string(),
                    field: relation.fk_field.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_foreign_keys(&self, entity: &EntityDef, row: &Row) -> Result<()> {
        for relation in entity.relations {
            if relation.kind != RelationKind::ToOne {
                continue;
            }
            let fk_idx = entity.field_index(relation.fk_field)?;
            let fk_value = &row[fk_idx];
            if fk_value.is_null() {
                continue;
            }
            let target_table = self.table(relation.target)?;
            if target_table.find_by_id(fk_value).is_none() {
                return Err(DbError::ForeignKeyViolation {
                    entity: entity.name.to_string(),
                    field: relation.fk_field.to_string(),
                    target: relation.target.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The embedded store: all tables behind a read-write lock, plus a
/// single writer slot that serializes mutations and transactions.
///
/// Reads take the lock shared and see a consistent set for as long as
/// the guard lives. Writers queue on the slot, so a running transaction
/// blocks other mutations until it finishes.
#[derive(Debug)]
pub struct MemStore {
    tables: RwLock<TableSet>,
    writer: Arc<Mutex<()>>,
}

impl MemStore {
    pub fn new(registry: &'static SchemaRegistry) -> Self {
        Self {
            tables: RwLock::new(TableSet::for_registry(registry)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Shared view of the current committed state.
    pub async fn snapshot(&self) -> RwLockReadGuard<'_, TableSet> {
        self.tables.read().await
    }

    /// Exclusive access for a single autocommit mutation.
    pub async fn exclusive(&self) -> StoreWriteGuard<'_> {
        let writer = self.writer.lock().await;
        let tables = self.tables.write().await;
        StoreWriteGuard {
            tables,
            _writer: writer,
        }
    }

    /// Claims the writer slot for a transaction, waiting at most
    /// `max_wait`. The slot is held for the transaction's lifetime.
    pub async fn claim_writer(&self, max_wait: std::time::Duration) -> Result<OwnedMutexGuard<()>> {
        tokio::time::timeout(max_wait, Arc::clone(&self.writer).lock_owned())
            .await
            .map_err(|_| {
                DbError::Transaction(format!(
                    "timed out after {}ms waiting for the transaction slot",
                    max_wait.as_millis()
                ))
            })
    }

    /// Clones the committed state as a transaction working set.
    pub async fn working_copy(&self) -> TableSet {
        self.tables.read().await.clone()
    }

    /// Publishes a transaction's working set. The caller must still hold
    /// the writer slot it claimed.
    pub async fn publish(&self, tables: TableSet) {
        let mut guard = self.tables.write().await;
        *guard = tables;
    }
}

pub struct StoreWriteGuard<'a> {
    tables: RwLockWriteGuard<'a, TableSet>,
    _writer: MutexGuard<'a, ()>,
}

impl Deref for StoreWriteGuard<'_> {
    type Target = TableSet;

    fn deref(&self) -> &TableSet {
        &self.tables
    }
}

impl DerefMut for StoreWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut TableSet {
        &mut self.tables
    }
}
