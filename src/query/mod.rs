pub mod find;
pub mod paginate;
pub mod sort;

pub use sort::{OrderBy, SortOrder};

use crate::core::Value;
use crate::filter::Filter;
use crate::select::Selection;

/// A unique lookup criterion: one unique field and the value to match.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueWhere {
    pub field: String,
    pub value: Value,
}

impl UniqueWhere {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Lookup by primary key.
    pub fn id(value: impl Into<Value>) -> Self {
        Self::new("id", value)
    }
}

/// Arguments for `findMany`/`findFirst`. The pipeline applies them as
/// filter, then orderBy, then cursor, then distinct, then skip/take.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindManyArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<UniqueWhere>,
    pub take: Option<i64>,
    pub skip: u64,
    pub distinct: Vec<String>,
    pub selection: Selection,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, key: OrderBy) -> Self {
        self.order_by.push(key);
        self
    }

    pub fn cursor(mut self, cursor: UniqueWhere) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn distinct<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.distinct = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

impl From<Filter> for FindManyArgs {
    fn from(filter: Filter) -> Self {
        Self::new().filter(filter)
    }
}

/// Arguments for `findUnique`: the unique criterion plus an optional
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FindUniqueArgs {
    pub by: UniqueWhere,
    pub selection: Selection,
}

impl FindUniqueArgs {
    pub fn new(by: UniqueWhere) -> Self {
        Self {
            by,
            selection: Selection::Default,
        }
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

impl From<UniqueWhere> for FindUniqueArgs {
    fn from(by: UniqueWhere) -> Self {
        Self::new(by)
    }
}
