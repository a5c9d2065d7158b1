//! Raw SQL escape hatch. Statements are parsed with `sqlparser` and
//! lowered onto the same filter and store machinery as the typed
//! surface, so schema validation and constraint enforcement still apply.

mod exec;
pub(crate) mod translate;

use crate::core::{Result, Value};
use crate::result::QueryResult;
use crate::store::TableSet;

use translate::SqlTranslator;

/// A SQL string with positional parameters.
///
/// Parameters are referenced as `$1`, `$2`, ... and bound in order:
///
/// ```
/// use foliodb::raw::Sql;
///
/// let sql = Sql::new("SELECT * FROM \"User\" WHERE role = $1 AND email LIKE $2")
///     .bind("ADMIN")
///     .bind("%@dev.io");
/// assert_eq!(sql.params().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Sql {
    text: String,
    params: Vec<Value>,
}

impl Sql {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Binds the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Runs a parameterized SELECT and returns its rows as a table.
pub(crate) fn query(tables: &TableSet, sql: &Sql) -> Result<QueryResult> {
    let statement = SqlTranslator::new(&sql.params).translate(&sql.text)?;
    exec::run_query(tables, statement)
}

/// Runs a parameterized INSERT, UPDATE or DELETE and returns the number
/// of affected rows.
pub(crate) fn execute(tables: &mut TableSet, sql: &Sql) -> Result<u64> {
    let statement = SqlTranslator::new(&sql.params).translate(&sql.text)?;
    exec::run_execute(tables, statement)
}
