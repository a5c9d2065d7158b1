// ============================================================================
// FolioDB Library
// ============================================================================

pub mod aggregate;
pub mod audit;
pub mod client;
pub mod connection;
pub mod core;
pub mod filter;
pub mod mutation;
pub mod query;
pub mod raw;
pub mod result;
pub mod schema;
pub mod select;
pub mod store;
pub mod transaction;

// Re-export main types for convenience
pub use client::{Client, EntityDelegate};
pub use core::{DataType, DbError, ErrorFormat, ErrorKind, Result, Value};
pub use result::{Payload, QueryResult, Record};

// Re-export connection API
pub use connection::{ClientOptions, Connection, ConnectionPool, LogLevel, PoolGuard, PoolStats};

// Re-export the query-building vocabulary
pub use aggregate::{AggregateArgs, GroupByArgs, GroupOrderBy, Having};
pub use filter::{Filter, StringMode};
pub use mutation::{Data, DeleteManyArgs, UpdateManyArgs};
pub use query::{FindManyArgs, FindUniqueArgs, OrderBy, SortOrder, UniqueWhere};
pub use raw::Sql;
pub use select::{IncludeSpec, SelectSpec, Selection};

// Re-export audit and transaction surfaces
pub use audit::{ActorContext, AuditEntry, AuditSink};
pub use transaction::{BatchOperation, BatchResult, IsolationLevel, TransactionOptions};
