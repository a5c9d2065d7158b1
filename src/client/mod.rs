//! The client facade: connection handling, per-entity delegates,
//! interactive and batch transactions, and the raw SQL entry points.
//!
//! A [`Client`] is cheap to clone; clones share one embedded store and
//! one connection pool. [`Client::transaction`] hands its closure a
//! transaction-scoped clone whose operations run against a private
//! working copy until commit.

mod delegate;

pub use delegate::EntityDelegate;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{Level, event, info_span};

use crate::audit::{ActorContext, AuditEntry, AuditSink, StoreAuditSink};
use crate::connection::{ClientOptions, ConnectionPool, LogLevel, PoolStats};
use crate::core::{DbError, Result};
use crate::mutation::engine::{self, WriteContext};
use crate::raw::{self, Sql};
use crate::result::QueryResult;
use crate::schema::{EntityDef, SchemaRegistry};
use crate::store::{MemStore, TableSet};
use crate::transaction::{BatchOperation, BatchResult, TransactionOptions, TxWork};

/// State shared by every clone of a client: the schema registry, the
/// store, the pool bounding concurrent operations, the resolved
/// options, and the audit sink.
struct Shared {
    registry: &'static SchemaRegistry,
    store: Arc<MemStore>,
    pool: ConnectionPool,
    options: ClientOptions,
    audit_sink: Arc<dyn AuditSink>,
}

/// Where a handle's operations execute: directly against the published
/// store, or inside an open transaction's working copy.
#[derive(Clone)]
enum Session {
    Direct,
    Tx(Arc<Mutex<TxWork>>),
}

/// Handle to the embedded database.
///
/// # Examples
///
/// ```
/// use foliodb::{Client, data};
///
/// # tokio_test::block_on(async {
/// let client = Client::connect("foliodb://localhost/portfolio").unwrap();
/// let user = client
///     .user()
///     .create(data! {
///         "email" => "ada@example.com",
///         "password" => "hunter2",
///     })
///     .await
///     .unwrap();
/// assert!(user.value("id").is_some());
/// # });
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    session: Session,
    actor: Option<ActorContext>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Opens a client from a datasource URL, for example
    /// `foliodb://localhost/portfolio?max_connections=5&log=query,error`.
    pub fn connect(url: &str) -> Result<Self> {
        Self::connect_with_options(ClientOptions::from_url(url)?)
    }

    pub fn connect_with_options(options: ClientOptions) -> Result<Self> {
        Self::build(options, None)
    }

    /// Like [`Client::connect_with_options`] with a replacement audit
    /// sink. Tests use this to observe or fail audit writes.
    pub fn connect_with_audit_sink(
        options: ClientOptions,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        Self::build(options, Some(sink))
    }

    fn build(options: ClientOptions, sink: Option<Arc<dyn AuditSink>>) -> Result<Self> {
        let registry = SchemaRegistry::portfolio();
        let store = Arc::new(MemStore::new(registry));
        let pool = ConnectionPool::new(options.clone(), Arc::clone(&store))?;
        let audit_sink: Arc<dyn AuditSink> = match sink {
            Some(sink) => sink,
            None => Arc::new(StoreAuditSink::new(Arc::clone(&store))),
        };

        if options.logs(LogLevel::Info) {
            event!(
                Level::INFO,
                datasource = %options.datasource_url,
                max_connections = options.max_connections,
                "client connected"
            );
        }

        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                store,
                pool,
                options,
                audit_sink,
            }),
            session: Session::Direct,
            actor: None,
        })
    }

    /// Returns a handle whose writes are audited under `user_id`.
    pub fn as_user(&self, user_id: impl Into<String>) -> Client {
        self.with_actor(ActorContext::new(user_id))
    }

    /// Returns a handle carrying a full actor context, including the
    /// optional request metadata recorded in audit rows.
    pub fn with_actor(&self, actor: ActorContext) -> Client {
        Client {
            shared: Arc::clone(&self.shared),
            session: self.session.clone(),
            actor: Some(actor),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    /// Renders an error for display honoring the configured
    /// [`ErrorFormat`](crate::core::ErrorFormat).
    pub fn format_error(&self, err: &DbError) -> String {
        err.render(self.shared.options.error_format)
    }

    /// Delegate for an entity named at runtime; unknown names fail.
    /// The fixed accessors below cover the schema's entities.
    pub fn entity(&self, name: &str) -> Result<EntityDelegate<'_>> {
        let entity = self.entity_def(name)?;
        Ok(EntityDelegate {
            client: self,
            entity: entity.name,
        })
    }

    pub(crate) fn entity_def(&self, name: &str) -> Result<&'static EntityDef> {
        let registry: &'static SchemaRegistry = self.shared.registry;
        registry.entity(name)
    }

    pub(crate) fn write_context(&self) -> WriteContext<'_> {
        WriteContext {
            actor: self.actor.as_ref(),
            omit: &self.shared.options.omit,
        }
    }

    pub(crate) fn global_omit(&self) -> &std::collections::HashMap<String, Vec<String>> {
        &self.shared.options.omit
    }

    /// Runs a read closure in the handle's session: direct reads take a
    /// pooled connection and a snapshot of the committed state,
    /// transactional reads see the working copy.
    pub(crate) async fn read<T>(
        &self,
        entity: &str,
        operation: &'static str,
        f: impl FnOnce(&TableSet) -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = match &self.session {
            Session::Direct => {
                let _conn = self.shared.pool.acquire().await?;
                let tables = self.shared.store.snapshot().await;
                f(&tables)
            }
            Session::Tx(work) => {
                let work = work.lock().await;
                f(&work.tables)
            }
        };
        self.log_outcome(entity, operation, started, result.as_ref().err());
        result
    }

    /// Runs a write closure in the handle's session. Direct writes hold
    /// the store's writer guard for the closure only; their audit
    /// entries flush after the guard is released. Transactional writes
    /// queue audit entries on the transaction until commit.
    pub(crate) async fn write<T>(
        &self,
        entity: &str,
        operation: &'static str,
        f: impl FnOnce(&mut TableSet) -> Result<(T, Vec<AuditEntry>)>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = match &self.session {
            Session::Direct => {
                let _conn = self.shared.pool.acquire().await?;
                let mut guard = self.shared.store.exclusive().await;
                match f(&mut guard) {
                    Ok((value, audits)) => {
                        drop(guard);
                        self.flush_audits(audits).await;
                        Ok(value)
                    }
                    Err(err) => Err(err),
                }
            }
            Session::Tx(work) => {
                let mut work = work.lock().await;
                match f(&mut work.tables) {
                    Ok((value, audits)) => {
                        work.audits.extend(audits);
                        Ok(value)
                    }
                    Err(err) => Err(err),
                }
            }
        };
        self.log_outcome(entity, operation, started, result.as_ref().err());
        result
    }

    /// Reads rows with a raw SQL `SELECT`.
    ///
    /// ```
    /// use foliodb::{Client, raw::Sql};
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::connect("foliodb://localhost/portfolio").unwrap();
    /// let result = client
    ///     .query_raw(Sql::new("SELECT count(*) FROM \"User\""))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(result.columns, ["count"]);
    /// # });
    /// ```
    pub async fn query_raw(&self, sql: Sql) -> Result<QueryResult> {
        self.read("raw", "queryRaw", |tables| raw::query(tables, &sql))
            .await
    }

    /// Applies a raw SQL `INSERT`, `UPDATE` or `DELETE` and returns the
    /// affected row count. Raw writes bypass client-side defaults and
    /// auditing; constraints still hold.
    pub async fn execute_raw(&self, sql: Sql) -> Result<u64> {
        self.write("raw", "executeRaw", |tables| {
            raw::execute(tables, &sql).map(|count| (count, Vec::new()))
        })
        .await
    }

    /// [`Client::query_raw`] for a literal statement with no
    /// parameters. The caller vouches for the text.
    pub async fn query_raw_unsafe(&self, sql: impl Into<String>) -> Result<QueryResult> {
        self.query_raw(Sql::new(sql)).await
    }

    pub async fn execute_raw_unsafe(&self, sql: impl Into<String>) -> Result<u64> {
        self.execute_raw(Sql::new(sql)).await
    }

    /// Runs `f` inside an interactive transaction with the client's
    /// default [`TransactionOptions`].
    ///
    /// The closure receives a transaction-scoped client. Its writes
    /// land in a private working copy and publish atomically when the
    /// closure returns `Ok`; on error or timeout the copy is dropped.
    ///
    /// ```
    /// use foliodb::{Client, data};
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::connect("foliodb://localhost/portfolio").unwrap();
    /// let slug = client
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             let label = tx
    ///                 .label()
    ///                 .create(data! { "slug" => "rust", "name" => "Rust" })
    ///                 .await?;
    ///             Ok(label.value("slug").cloned())
    ///         })
    ///     })
    ///     .await
    ///     .unwrap();
    /// assert!(slug.is_some());
    /// # });
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c Client) -> BoxFuture<'c, Result<T>>,
    {
        let options = self.shared.options.transaction;
        self.transaction_with(options, f).await
    }

    /// [`Client::transaction`] with explicit bounds: `max_wait` caps
    /// the wait for the store's writer slot, `timeout` caps the
    /// closure body. The isolation level is recorded; the
    /// single-writer store executes every level with serializable
    /// semantics.
    pub async fn transaction_with<T, F>(&self, options: TransactionOptions, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c Client) -> BoxFuture<'c, Result<T>>,
    {
        if matches!(self.session, Session::Tx(_)) {
            return Err(DbError::Transaction(
                "transactions cannot be nested".to_string(),
            ));
        }

        let started = Instant::now();
        let slot = self.shared.store.claim_writer(options.max_wait).await?;
        let work = Arc::new(Mutex::new(TxWork::new(
            self.shared.store.working_copy().await,
        )));
        let tx = Client {
            shared: Arc::clone(&self.shared),
            session: Session::Tx(Arc::clone(&work)),
            actor: self.actor.clone(),
        };

        let outcome = match tokio::time::timeout(options.timeout, f(&tx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DbError::Transaction(format!(
                "transaction timed out after {}ms",
                options.timeout.as_millis()
            ))),
        };

        // The working copy must have no owner left but us; a handle
        // kept alive past the closure would otherwise mutate state
        // nobody will ever publish.
        drop(tx);
        let work = Arc::try_unwrap(work)
            .map_err(|_| {
                DbError::Transaction("transaction handle escaped its closure".to_string())
            })?
            .into_inner();

        match outcome {
            Ok(value) => {
                self.shared.store.publish(work.tables).await;
                drop(slot);
                self.flush_audits(work.audits).await;
                if self.shared.options.logs(LogLevel::Query) {
                    event!(
                        Level::DEBUG,
                        isolation = %options.isolation_level,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "transaction committed"
                    );
                }
                Ok(value)
            }
            Err(err) => {
                drop(slot);
                if self.shared.options.logs(LogLevel::Error) {
                    event!(
                        Level::ERROR,
                        error = %self.format_error(&err),
                        "transaction rolled back"
                    );
                }
                Err(err)
            }
        }
    }

    /// Applies an ordered list of mutations all-or-nothing: the first
    /// failing step discards every previous step's effect. Results come
    /// back in step order.
    pub async fn batch(&self, operations: Vec<BatchOperation>) -> Result<Vec<BatchResult>> {
        if matches!(self.session, Session::Tx(_)) {
            return Err(DbError::Transaction(
                "batch cannot run inside an open transaction".to_string(),
            ));
        }

        let options = self.shared.options.transaction;
        let slot = self.shared.store.claim_writer(options.max_wait).await?;
        let mut tables = self.shared.store.working_copy().await;

        let mut results = Vec::with_capacity(operations.len());
        let mut audits = Vec::new();
        for operation in operations {
            match self.apply_batch_step(&mut tables, operation, &mut audits) {
                Ok(result) => results.push(result),
                Err(err) => {
                    drop(slot);
                    if self.shared.options.logs(LogLevel::Error) {
                        event!(
                            Level::ERROR,
                            error = %self.format_error(&err),
                            "batch rolled back"
                        );
                    }
                    return Err(err);
                }
            }
        }

        self.shared.store.publish(tables).await;
        drop(slot);
        self.flush_audits(audits).await;
        Ok(results)
    }

    fn apply_batch_step(
        &self,
        tables: &mut TableSet,
        operation: BatchOperation,
        audits: &mut Vec<AuditEntry>,
    ) -> Result<BatchResult> {
        let span = info_span!(
            "client.batch.step",
            entity = %operation.entity(),
            action = %operation.action()
        );
        let _enter = span.enter();

        let entity = self.entity_def(operation.entity())?;
        let ctx = self.write_context();
        let action = operation.action();
        match operation {
            BatchOperation::Create { data, .. } => {
                let (record, entries) = engine::create(tables, entity, &data, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Record(record))
            }
            BatchOperation::CreateMany {
                data,
                skip_duplicates,
                ..
            } => {
                let (records, entries) =
                    engine::create_many(tables, entity, &data, skip_duplicates, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Count(records.len() as u64))
            }
            BatchOperation::Update { by, data, .. } => {
                let (record, entries) = engine::update(tables, entity, &by, &data, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Record(record))
            }
            BatchOperation::UpdateMany { args, .. } => {
                let (records, entries) = engine::update_many(tables, entity, &args, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Count(records.len() as u64))
            }
            BatchOperation::Upsert {
                by, create, update, ..
            } => {
                let (record, entries) =
                    engine::upsert(tables, entity, &by, &create, &update, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Record(record))
            }
            BatchOperation::Delete { by, .. } => {
                let (record, entries) = engine::delete(tables, entity, &by, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Record(record))
            }
            BatchOperation::DeleteMany { args, .. } => {
                let (count, entries) = engine::delete_many(tables, entity, &args, ctx, action)?;
                audits.extend(entries);
                Ok(BatchResult::Count(count))
            }
        }
    }

    /// Writes queued audit entries once the mutation that produced them
    /// has committed. A failing sink is logged and swallowed: the
    /// mutation already succeeded.
    async fn flush_audits(&self, audits: Vec<AuditEntry>) {
        if audits.is_empty() {
            return;
        }
        if let Err(err) = self.shared.audit_sink.record(&audits).await {
            event!(Level::WARN, error = %err, "audit write failed after commit");
        }
    }

    fn log_outcome(
        &self,
        entity: &str,
        operation: &str,
        started: Instant,
        error: Option<&DbError>,
    ) {
        match error {
            Some(err) if self.shared.options.logs(LogLevel::Error) => {
                event!(
                    Level::ERROR,
                    entity = %entity,
                    operation = %operation,
                    error = %self.format_error(err),
                    "operation failed"
                );
            }
            None if self.shared.options.logs(LogLevel::Query) => {
                event!(
                    Level::DEBUG,
                    entity = %entity,
                    operation = %operation,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "operation completed"
                );
            }
            _ => {}
        }
    }
}

macro_rules! entity_accessors {
    ($( $name:ident ),* $(,)?) => {
        paste::paste! {
            impl Client {
                $(
                    #[doc = "Operations on the `" [<$name:camel>] "` entity."]
                    pub fn $name(&self) -> EntityDelegate<'_> {
                        EntityDelegate {
                            client: self,
                            entity: stringify!([<$name:camel>]),
                        }
                    }
                )*
            }
        }
    };
}

entity_accessors!(
    user, project, skill, achievement, time_line, resume, category, technology, tag, label,
    audit_log,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data;

    #[tokio::test]
    async fn test_accessors_name_registry_entities() {
        let client = Client::connect("foliodb://localhost/portfolio").unwrap();
        assert_eq!(client.user().entity_name(), "User");
        assert_eq!(client.time_line().entity_name(), "TimeLine");
        assert_eq!(client.audit_log().entity_name(), "AuditLog");
        assert_eq!(client.entity("Project").unwrap().entity_name(), "Project");
        assert!(client.entity("Ghost").is_err());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let client = Client::connect("foliodb://localhost/portfolio").unwrap();
        let clone = client.clone();
        clone
            .label()
            .create(data! { "slug" => "rust", "name" => "Rust" })
            .await
            .unwrap();
        assert_eq!(client.label().count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_nested_transactions_are_rejected() {
        let client = Client::connect("foliodb://localhost/portfolio").unwrap();
        let err = client
            .transaction(|tx| {
                Box::pin(async move {
                    tx.transaction(|inner| {
                        Box::pin(async move { inner.label().count(None).await })
                    })
                    .await
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Transaction(_)));
    }
}
