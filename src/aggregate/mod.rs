//! Aggregation argument types: field selections for `aggregate`, bucket
//! conditions and ordering for `groupBy`.

pub mod engine;

use crate::filter::{Filter, ScalarFilter, ScalarOp};
use crate::query::{OrderBy, SortOrder};

/// Which aggregates to compute. `count_all` is the plain row count;
/// `count_fields` counts non-null values per field; `_min`/`_max` fold
/// over non-null values and yield null for all-null columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSelection {
    pub count_all: bool,
    pub count_fields: Vec<String>,
    pub min_fields: Vec<String>,
    pub max_fields: Vec<String>,
}

impl AggregateSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_all(mut self) -> Self {
        self.count_all = true;
        self
    }

    pub fn count(mut self, field: impl Into<String>) -> Self {
        self.count_fields.push(field.into());
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.min_fields.push(field.into());
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.max_fields.push(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.count_all
            && self.count_fields.is_empty()
            && self.min_fields.is_empty()
            && self.max_fields.is_empty()
    }
}

/// Arguments for `aggregate`: an optional pre-filter plus the requested
/// aggregate selection. At least one aggregate must be requested.
#[derive(Debug, Clone, Default)]
pub struct AggregateArgs {
    pub filter: Option<Filter>,
    pub selection: AggregateSelection,
}

impl AggregateArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn count_all(mut self) -> Self {
        self.selection = self.selection.count_all();
        self
    }

    pub fn count(mut self, field: impl Into<String>) -> Self {
        self.selection = self.selection.count(field);
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.selection = self.selection.min(field);
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.selection = self.selection.max(field);
        self
    }
}

/// Post-aggregation condition on a `groupBy` bucket. `Field` tests a
/// grouped field's value and must name a field that appears in `by`;
/// the aggregate variants test the bucket's computed aggregates.
#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Vec<Having>),
    Field(ScalarFilter),
    Count(ScalarOp),
    Min(String, ScalarOp),
    Max(String, ScalarOp),
}

impl Having {
    pub fn and(conditions: impl IntoIterator<Item = Having>) -> Self {
        Self::And(conditions.into_iter().collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Having>) -> Self {
        Self::Or(conditions.into_iter().collect())
    }

    pub fn not(conditions: impl IntoIterator<Item = Having>) -> Self {
        Self::Not(conditions.into_iter().collect())
    }

    pub fn field(field: impl Into<String>, op: ScalarOp) -> Self {
        Self::Field(ScalarFilter {
            field: field.into(),
            op,
        })
    }

    pub fn count(op: ScalarOp) -> Self {
        Self::Count(op)
    }

    pub fn min(field: impl Into<String>, op: ScalarOp) -> Self {
        Self::Min(field.into(), op)
    }

    pub fn max(field: impl Into<String>, op: ScalarOp) -> Self {
        Self::Max(field.into(), op)
    }
}

/// Bucket ordering for `groupBy`: by a grouped field's value or by the
/// bucket's row count.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrderBy {
    Field(OrderBy),
    Count(SortOrder),
}

impl GroupOrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::Field(OrderBy::asc(field))
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::Field(OrderBy::desc(field))
    }

    pub fn count(order: SortOrder) -> Self {
        Self::Count(order)
    }
}

/// Arguments for `groupBy`. `filter` runs before bucketing, `having`
/// after; `take`/`skip` window the bucket list and require `order_by`.
#[derive(Debug, Clone, Default)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub having: Option<Having>,
    pub order_by: Vec<GroupOrderBy>,
    pub take: Option<i64>,
    pub skip: u64,
    pub selection: AggregateSelection,
}

impl GroupByArgs {
    pub fn by<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            by: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    pub fn order_by(mut self, order: GroupOrderBy) -> Self {
        self.order_by.push(order);
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

    pub fn count_all(mut self) -> Self {
        self.selection = self.selection.count_all();
        self
    }

    pub fn count(mut self, field: impl Into<String>) -> Self {
        self.selection = self.selection.count(field);
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.selection = self.selection.min(field);
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.selection = self.selection.max(field);
        self
    }
}
