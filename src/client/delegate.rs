//! The per-entity operation surface. One delegate type serves every
//! entity; the schema registry supplies the field layout at call time.

use std::fmt;

use crate::aggregate::engine as aggregates;
use crate::aggregate::{AggregateArgs, GroupByArgs};
use crate::core::{DbError, Result};
use crate::filter::Filter;
use crate::mutation::engine;
use crate::mutation::{Data, DeleteManyArgs, UpdateManyArgs};
use crate::query::{FindManyArgs, FindUniqueArgs, UniqueWhere, find};
use crate::result::Record;
use crate::select::resolve::ShapeContext;

use super::Client;

/// Typed operations on one entity, obtained from the accessors on
/// [`Client`] (`client.user()`, `client.project()`, ...).
///
/// # Examples
///
/// ```
/// use foliodb::{Client, Filter, data};
///
/// # tokio_test::block_on(async {
/// let client = Client::connect("foliodb://localhost/portfolio").unwrap();
/// client
///     .tag()
///     .create(data! { "slug" => "backend", "name" => "Backend" })
///     .await
///     .unwrap();
/// let found = client
///     .tag()
///     .find_first(Filter::equals("slug", "backend"))
///     .await
///     .unwrap();
/// assert!(found.is_some());
/// # });
/// ```
#[derive(Clone, Copy)]
pub struct EntityDelegate<'a> {
    pub(crate) client: &'a Client,
    pub(crate) entity: &'static str,
}

impl fmt::Debug for EntityDelegate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDelegate")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

impl<'a> EntityDelegate<'a> {
    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    /// `findUnique`: at most one row, looked up by a unique field.
    pub async fn find_unique(&self, args: impl Into<FindUniqueArgs>) -> Result<Option<Record>> {
        self.find_unique_op(args.into(), "findUnique").await
    }

    /// `findUniqueOrThrow`: like [`find_unique`](Self::find_unique),
    /// but a missing row is a not-found error.
    pub async fn find_unique_or_throw(&self, args: impl Into<FindUniqueArgs>) -> Result<Record> {
        self.find_unique_op(args.into(), "findUniqueOrThrow")
            .await?
            .ok_or_else(|| self.not_found())
    }

    async fn find_unique_op(
        &self,
        args: FindUniqueArgs,
        operation: &'static str,
    ) -> Result<Option<Record>> {
        let entity = self.client.entity_def(self.entity)?;
        let omit = self.client.global_omit();
        self.client
            .read(self.entity, operation, |tables| {
                find::validate_unique(tables.registry(), entity, &args, omit)?;
                find::find_unique(ShapeContext { tables, omit }, entity, &args)
            })
            .await
    }

    /// `findFirst`: the first row of the ordered, filtered result.
    pub async fn find_first(&self, args: impl Into<FindManyArgs>) -> Result<Option<Record>> {
        self.find_first_op(args.into(), "findFirst").await
    }

    pub async fn find_first_or_throw(&self, args: impl Into<FindManyArgs>) -> Result<Record> {
        self.find_first_op(args.into(), "findFirstOrThrow")
            .await?
            .ok_or_else(|| self.not_found())
    }

    async fn find_first_op(
        &self,
        args: FindManyArgs,
        operation: &'static str,
    ) -> Result<Option<Record>> {
        let entity = self.client.entity_def(self.entity)?;
        let omit = self.client.global_omit();
        self.client
            .read(self.entity, operation, |tables| {
                find::validate_many(tables.registry(), entity, &args, omit)?;
                find::find_first(ShapeContext { tables, omit }, entity, &args)
            })
            .await
    }

    /// `findMany`: filter, order, cursor, distinct and skip/take, in
    /// that order, shaping each surviving row.
    pub async fn find_many(&self, args: impl Into<FindManyArgs>) -> Result<Vec<Record>> {
        let args = args.into();
        let entity = self.client.entity_def(self.entity)?;
        let omit = self.client.global_omit();
        self.client
            .read(self.entity, "findMany", |tables| {
                find::validate_many(tables.registry(), entity, &args, omit)?;
                find::find_many(ShapeContext { tables, omit }, entity, &args)
            })
            .await
    }

    /// Every row of the entity, in insertion order.
    pub async fn all(&self) -> Result<Vec<Record>> {
        self.find_many(FindManyArgs::new()).await
    }

    /// `create`: inserts one row, filling defaults for omitted fields,
    /// and returns it.
    pub async fn create(&self, data: Data) -> Result<Record> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "create", |tables| {
                engine::create(tables, entity, &data, self.client.write_context(), "create")
            })
            .await
    }

    /// `createMany`: inserts a batch and reports how many rows landed.
    /// With `skip_duplicates` rows colliding on a unique field are
    /// dropped instead of aborting the batch.
    pub async fn create_many(&self, data: Vec<Data>, skip_duplicates: bool) -> Result<u64> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "createMany", |tables| {
                engine::create_many(
                    tables,
                    entity,
                    &data,
                    skip_duplicates,
                    self.client.write_context(),
                    "createMany",
                )
                .map(|(records, audits)| (records.len() as u64, audits))
            })
            .await
    }

    /// `createManyAndReturn`: like [`create_many`](Self::create_many),
    /// returning the inserted rows instead of a count.
    pub async fn create_many_and_return(
        &self,
        data: Vec<Data>,
        skip_duplicates: bool,
    ) -> Result<Vec<Record>> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "createManyAndReturn", |tables| {
                engine::create_many(
                    tables,
                    entity,
                    &data,
                    skip_duplicates,
                    self.client.write_context(),
                    "createManyAndReturn",
                )
            })
            .await
    }

    /// `update`: rewrites the row matching `by`. Missing row is an
    /// error; `updatedAt` is bumped when the entity carries one.
    pub async fn update(&self, by: UniqueWhere, data: Data) -> Result<Record> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "update", |tables| {
                engine::update(
                    tables,
                    entity,
                    &by,
                    &data,
                    self.client.write_context(),
                    "update",
                )
            })
            .await
    }

    /// `updateMany`: applies one payload to every matching row and
    /// reports the affected count. `limit` caps the targets.
    pub async fn update_many(&self, args: UpdateManyArgs) -> Result<u64> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "updateMany", |tables| {
                engine::update_many(
                    tables,
                    entity,
                    &args,
                    self.client.write_context(),
                    "updateMany",
                )
                .map(|(records, audits)| (records.len() as u64, audits))
            })
            .await
    }

    pub async fn update_many_and_return(&self, args: UpdateManyArgs) -> Result<Vec<Record>> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "updateManyAndReturn", |tables| {
                engine::update_many(
                    tables,
                    entity,
                    &args,
                    self.client.write_context(),
                    "updateManyAndReturn",
                )
            })
            .await
    }

    /// `upsert`: updates the row matching `by` with `update`, or
    /// inserts `create` when no row matches.
    pub async fn upsert(&self, by: UniqueWhere, create: Data, update: Data) -> Result<Record> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "upsert", |tables| {
                engine::upsert(
                    tables,
                    entity,
                    &by,
                    &create,
                    &update,
                    self.client.write_context(),
                    "upsert",
                )
            })
            .await
    }

    /// `delete`: removes the row matching `by` and returns its last
    /// state. Rows referenced under a restrict relation refuse.
    pub async fn delete(&self, by: UniqueWhere) -> Result<Record> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "delete", |tables| {
                engine::delete(tables, entity, &by, self.client.write_context(), "delete")
            })
            .await
    }

    /// `deleteMany`: removes every matching row, all or nothing, and
    /// reports the count.
    pub async fn delete_many(&self, args: impl Into<DeleteManyArgs>) -> Result<u64> {
        let args = args.into();
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .write(self.entity, "deleteMany", |tables| {
                engine::delete_many(
                    tables,
                    entity,
                    &args,
                    self.client.write_context(),
                    "deleteMany",
                )
            })
            .await
    }

    /// `count`: rows matching `filter`, every row with `None`.
    pub async fn count(&self, filter: impl Into<Option<Filter>>) -> Result<u64> {
        let filter = filter.into();
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .read(self.entity, "count", |tables| {
                aggregates::count(tables, entity, filter.as_ref())
            })
            .await
    }

    /// `count` with a field selection: `_all` plus a non-null count
    /// per named field.
    pub async fn count_fields<I, S>(
        &self,
        filter: impl Into<Option<Filter>>,
        fields: I,
    ) -> Result<Record>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter = filter.into();
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .read(self.entity, "count", |tables| {
                aggregates::count_fields(tables, entity, filter.as_ref(), &fields)
            })
            .await
    }

    /// `aggregate`: `_count`/`_min`/`_max` over the matching rows,
    /// folded into one record.
    pub async fn aggregate(&self, args: AggregateArgs) -> Result<Record> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .read(self.entity, "aggregate", |tables| {
                aggregates::aggregate(tables, entity, &args)
            })
            .await
    }

    /// `groupBy`: buckets rows by the `by` fields and aggregates each
    /// bucket. Ordering and `having` may only reference grouped fields
    /// or requested aggregates.
    pub async fn group_by(&self, args: GroupByArgs) -> Result<Vec<Record>> {
        let entity = self.client.entity_def(self.entity)?;
        self.client
            .read(self.entity, "groupBy", |tables| {
                aggregates::group_by(tables, entity, &args)
            })
            .await
    }

    fn not_found(&self) -> DbError {
        DbError::NotFound {
            entity: self.entity.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::data;
    use crate::query::OrderBy;

    fn client() -> Client {
        Client::connect("foliodb://localhost/portfolio").unwrap()
    }

    #[tokio::test]
    async fn test_create_then_find_unique_round_trip() {
        let client = client();
        let created = client
            .user()
            .create(data! { "email" => "ada@example.com", "password" => "pw" })
            .await
            .unwrap();
        let id = created.value("id").unwrap().clone();

        let found = client
            .user()
            .find_unique(UniqueWhere::new("email", "ada@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.value("id"), Some(&id));
        assert_eq!(found.value("role"), Some(&Value::from("USER")));
    }

    #[tokio::test]
    async fn test_or_throw_reports_the_entity() {
        let client = client();
        let err = client
            .user()
            .find_unique_or_throw(UniqueWhere::id("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity } if entity == "User"));

        let err = client
            .tag()
            .find_first_or_throw(Filter::equals("slug", "none"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity } if entity == "Tag"));
    }

    #[tokio::test]
    async fn test_update_rewrites_and_upsert_branches() {
        let client = client();
        client
            .label()
            .create(data! { "slug" => "rust", "name" => "Rust" })
            .await
            .unwrap();

        let updated = client
            .label()
            .update(
                UniqueWhere::new("slug", "rust"),
                data! { "name" => "Rust Lang" },
            )
            .await
            .unwrap();
        assert_eq!(updated.value("name"), Some(&Value::from("Rust Lang")));

        // First call inserts, second updates the same row.
        client
            .label()
            .upsert(
                UniqueWhere::new("slug", "tokio"),
                data! { "slug" => "tokio", "name" => "Tokio" },
                data! { "name" => "Tokio Runtime" },
            )
            .await
            .unwrap();
        let upserted = client
            .label()
            .upsert(
                UniqueWhere::new("slug", "tokio"),
                data! { "slug" => "tokio", "name" => "Tokio" },
                data! { "name" => "Tokio Runtime" },
            )
            .await
            .unwrap();
        assert_eq!(upserted.value("name"), Some(&Value::from("Tokio Runtime")));
        assert_eq!(client.label().count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_many_skip_duplicates_and_delete_many() {
        let client = client();
        let rows = vec![
            data! { "slug" => "a", "name" => "A" },
            data! { "slug" => "b", "name" => "B" },
            data! { "slug" => "a", "name" => "A again" },
        ];
        let inserted = client.tag().create_many(rows, true).await.unwrap();
        assert_eq!(inserted, 2);

        let removed = client
            .tag()
            .delete_many(Filter::equals("slug", "a"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(client.tag().count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_many_orders_and_windows() {
        let client = client();
        for slug in ["c", "a", "b"] {
            client
                .tag()
                .create(data! { "slug" => slug, "name" => slug })
                .await
                .unwrap();
        }

        let page = client
            .tag()
            .find_many(
                FindManyArgs::new()
                    .order_by(OrderBy::asc("slug"))
                    .skip(1)
                    .take(1),
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].value("slug"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn test_validation_failures_surface_before_any_write() {
        let client = client();
        let err = client
            .tag()
            .find_many(Filter::equals("ghost", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UnknownField { .. }));

        let err = client
            .tag()
            .create(data! { "slug" => "x", "name" => "X", "ghost" => 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UnknownField { .. }));
        assert_eq!(client.tag().count(None).await.unwrap(), 0);
    }
}
