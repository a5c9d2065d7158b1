//! Transaction types: isolation levels, the `maxWait`/`timeout` option
//! bundle, the private working state of an open transaction, and the
//! batch operation list.
//!
//! The execution paths live on [`Client`](crate::client::Client):
//! `transaction` runs a closure against a working copy of the store and
//! publishes it on success; `batch` applies an ordered operation list
//! all-or-nothing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::audit::AuditEntry;
use crate::core::DbError;
use crate::mutation::{Data, DeleteManyArgs, UpdateManyArgs};
use crate::query::UniqueWhere;
use crate::result::Record;
use crate::store::TableSet;

/// Requested consistency guarantee for a transaction. The embedded
/// store serializes writers regardless, so every level is honored; the
/// level is recorded and reported for parity with SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "readuncommitted" => Ok(Self::ReadUncommitted),
            "readcommitted" => Ok(Self::ReadCommitted),
            "repeatableread" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(DbError::Parse(format!("unknown isolation level: {s}"))),
        }
    }
}

/// Bounds for an interactive transaction: `max_wait` caps the wait for
/// the writer slot, `timeout` caps the closure body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    pub max_wait: Duration,
    pub timeout: Duration,
    pub isolation_level: IsolationLevel,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
            isolation_level: IsolationLevel::default(),
        }
    }
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }
}

/// Private state of an open transaction: the working copy of every
/// table plus the audit entries queued until commit.
#[derive(Debug)]
pub struct TxWork {
    pub tables: TableSet,
    pub audits: Vec<AuditEntry>,
}

impl TxWork {
    pub fn new(tables: TableSet) -> Self {
        Self {
            tables,
            audits: Vec::new(),
        }
    }
}

/// One step of an all-or-nothing batch.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Create {
        entity: String,
        data: Data,
    },
    CreateMany {
        entity: String,
        data: Vec<Data>,
        skip_duplicates: bool,
    },
    Update {
        entity: String,
        by: UniqueWhere,
        data: Data,
    },
    UpdateMany {
        entity: String,
        args: UpdateManyArgs,
    },
    Upsert {
        entity: String,
        by: UniqueWhere,
        create: Data,
        update: Data,
    },
    Delete {
        entity: String,
        by: UniqueWhere,
    },
    DeleteMany {
        entity: String,
        args: DeleteManyArgs,
    },
}

impl BatchOperation {
    /// The mutation name recorded in audit rows for this step.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::CreateMany { .. } => "createMany",
            Self::Update { .. } => "update",
            Self::UpdateMany { .. } => "updateMany",
            Self::Upsert { .. } => "upsert",
            Self::Delete { .. } => "delete",
            Self::DeleteMany { .. } => "deleteMany",
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            Self::Create { entity, .. }
            | Self::CreateMany { entity, .. }
            | Self::Update { entity, .. }
            | Self::UpdateMany { entity, .. }
            | Self::Upsert { entity, .. }
            | Self::Delete { entity, .. }
            | Self::DeleteMany { entity, .. } => entity,
        }
    }
}

/// Outcome of one batch step, in step order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Record(Record),
    Records(Vec<Record>),
    Count(u64),
}

impl BatchResult {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Self::Records(records) => Some(records),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }
}
