pub mod eval;
pub mod pattern;

use serde_json::Value as JsonValue;

use crate::core::Value;

/// Case handling for the string-matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMode {
    #[default]
    Default,
    Insensitive,
}

/// Predicate against one JSON field, addressed by a path of object keys
/// and array indices (indices are decimal strings).
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPredicate {
    Equals(JsonValue),
    StringContains(String),
    ArrayContains(JsonValue),
}

/// Operator applied to a single scalar field.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarOp {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String, StringMode),
    StartsWith(String, StringMode),
    EndsWith(String, StringMode),
    /// SQL `LIKE` with `%`/`_` wildcards. The raw-query surface lowers
    /// into this; the typed builders favor the dedicated string ops.
    Like {
        pattern: String,
        case_insensitive: bool,
    },
    JsonPath {
        path: Vec<String>,
        predicate: JsonPredicate,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFilter {
    pub field: String,
    pub op: ScalarOp,
}

/// Condition over a named relation. `Some`/`Every`/`None` apply to
/// to-many relations, `Is`/`IsNot`/`IsNull` to to-one.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationCondition {
    Some(Box<Filter>),
    Every(Box<Filter>),
    None(Box<Filter>),
    Is(Box<Filter>),
    IsNot(Box<Filter>),
    IsNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationFilter {
    pub relation: String,
    pub condition: RelationCondition,
}

/// A declarative predicate tree over one entity's rows.
///
/// Logical nodes compose sub-filters: `And` of nothing accepts
/// everything, `Or` of nothing accepts nothing, and `Not` requires every
/// listed condition to fail.
///
/// ```
/// use foliodb::filter::Filter;
///
/// let published_rust = Filter::and([
///     Filter::equals("status", "published"),
///     Filter::contains_insensitive("title", "rust"),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Vec<Filter>),
    Scalar(ScalarFilter),
    Relation(RelationFilter),
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    pub fn not(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Not(filters.into_iter().collect())
    }

    fn scalar(field: impl Into<String>, op: ScalarOp) -> Self {
        Self::Scalar(ScalarFilter {
            field: field.into(),
            op,
        })
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, ScalarOp::Equals(value.into()))
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, ScalarOp::NotEquals(value.into()))
    }

    /// Matches rows whose field is null.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::Equals(Value::Null))
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::NotEquals(Value::Null))
    }

    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::scalar(
            field,
            ScalarOp::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::scalar(
            field,
            ScalarOp::NotIn(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, ScalarOp::Lt(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, ScalarOp::Lte(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, ScalarOp::Gt(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, ScalarOp::Gte(value.into()))
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::Contains(needle.into(), StringMode::Default))
    }

    pub fn contains_insensitive(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::Contains(needle.into(), StringMode::Insensitive),
        )
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::StartsWith(prefix.into(), StringMode::Default),
        )
    }

    pub fn starts_with_insensitive(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::StartsWith(prefix.into(), StringMode::Insensitive),
        )
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::scalar(field, ScalarOp::EndsWith(suffix.into(), StringMode::Default))
    }

    pub fn ends_with_insensitive(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::EndsWith(suffix.into(), StringMode::Insensitive),
        )
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::scalar(
            field,
            ScalarOp::Like {
                pattern: pattern.into(),
                case_insensitive: false,
            },
        )
    }

    pub fn json_equals<P, S>(field: impl Into<String>, path: P, value: JsonValue) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scalar(
            field,
            ScalarOp::JsonPath {
                path: path.into_iter().map(Into::into).collect(),
                predicate: JsonPredicate::Equals(value),
            },
        )
    }

    pub fn json_string_contains<P, S>(
        field: impl Into<String>,
        path: P,
        needle: impl Into<String>,
    ) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scalar(
            field,
            ScalarOp::JsonPath {
                path: path.into_iter().map(Into::into).collect(),
                predicate: JsonPredicate::StringContains(needle.into()),
            },
        )
    }

    pub fn json_array_contains<P, S>(field: impl Into<String>, path: P, value: JsonValue) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scalar(
            field,
            ScalarOp::JsonPath {
                path: path.into_iter().map(Into::into).collect(),
                predicate: JsonPredicate::ArrayContains(value),
            },
        )
    }

    fn relation(relation: impl Into<String>, condition: RelationCondition) -> Self {
        Self::Relation(RelationFilter {
            relation: relation.into(),
            condition,
        })
    }

    /// At least one related row matches.
    pub fn some(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationCondition::Some(Box::new(filter)))
    }

    /// Every related row matches (vacuously true with no related rows).
    pub fn every(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationCondition::Every(Box::new(filter)))
    }

    /// No related row matches.
    pub fn none(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationCondition::None(Box::new(filter)))
    }

    /// The to-one related row exists and matches.
    pub fn relation_is(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationCondition::Is(Box::new(filter)))
    }

    /// The to-one related row is absent or does not match.
    pub fn relation_is_not(relation: impl Into<String>, filter: Filter) -> Self {
        Self::relation(relation, RelationCondition::IsNot(Box::new(filter)))
    }

    /// The optional to-one relation is unset.
    pub fn relation_is_null(relation: impl Into<String>) -> Self {
        Self::relation(relation, RelationCondition::IsNull)
    }
}
