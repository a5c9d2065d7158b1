pub mod resolve;

use crate::filter::Filter;
use crate::query::{OrderBy, UniqueWhere};

/// Query arguments for one to-many relation inside a selection: its own
/// filter, ordering and pagination window, independent of the parent
/// query's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<UniqueWhere>,
    pub take: Option<i64>,
    pub skip: u64,
    pub distinct: Vec<String>,
}

impl RelationArgs {
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

    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// How one requested relation is fetched and shaped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationSelection {
    pub args: RelationArgs,
    pub selection: Selection,
}

impl RelationSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn args(mut self, args: RelationArgs) -> Self {
        self.args = args;
        self
    }

    pub fn shape(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

/// `_count` over one or more to-many relations, each optionally
/// restricted by a filter on the child rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountSelection {
    pub relations: Vec<(String, Option<Filter>)>,
}

impl CountSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, name: impl Into<String>) -> Self {
        self.relations.push((name.into(), None));
        self
    }

    pub fn relation_where(mut self, name: impl Into<String>, filter: Filter) -> Self {
        self.relations.push((name.into(), Some(filter)));
        self
    }
}

/// Explicit allow-list projection: named scalars, plus relations and
/// `_count` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectSpec {
    pub fields: Vec<String>,
    pub relations: Vec<(String, RelationSelection)>,
    pub count: Option<CountSelection>,
}

impl SelectSpec {
    pub fn fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            relations: Vec::new(),
            count: None,
        }
    }

    pub fn relation(mut self, name: impl Into<String>, rel: RelationSelection) -> Self {
        self.relations.push((name.into(), rel));
        self
    }

    pub fn count(mut self, count: CountSelection) -> Self {
        self.count = Some(count);
        self
    }
}

/// Default scalar projection plus the named relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeSpec {
    pub relations: Vec<(String, RelationSelection)>,
    pub count: Option<CountSelection>,
}

impl IncludeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, name: impl Into<String>, rel: RelationSelection) -> Self {
        self.relations.push((name.into(), rel));
        self
    }

    pub fn count(mut self, count: CountSelection) -> Self {
        self.count = Some(count);
        self
    }
}

/// The requested output shape, as a tagged union: exactly one of the
/// four modes per level, which rules out the select/include and
/// select/omit conflicts by construction.
///
/// ```
/// use foliodb::select::{IncludeSpec, RelationSelection, Selection};
///
/// // All Technology scalars plus its category record.
/// let shape = Selection::include(
///     IncludeSpec::new().relation("category", RelationSelection::new()),
/// );
/// # let _ = shape;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Selection {
    /// Every scalar field, minus the client's global omit list.
    #[default]
    Default,
    Select(SelectSpec),
    Include(IncludeSpec),
    /// Default projection minus the listed fields.
    Omit(Vec<String>),
}

impl Selection {
    pub fn select(spec: SelectSpec) -> Self {
        Self::Select(spec)
    }

    pub fn include(spec: IncludeSpec) -> Self {
        Self::Include(spec)
    }

    pub fn omit<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::Omit(fields.into_iter().map(Into::into).collect())
    }
}
