//! Write-path argument types: field payloads for create/update, plus
//! the batch argument bundles for updateMany/deleteMany.

pub mod engine;

use crate::core::Value;
use crate::filter::Filter;
use crate::query::UniqueWhere;

/// One entry in a [`Data`] payload. Scalar fields carry a [`Value`];
/// to-one relations can be linked by a unique criterion on the target
/// instead of spelling out the foreign key.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Value(Value),
    Connect(UniqueWhere),
}

/// Field payload for create and update operations, in insertion order.
///
/// ```
/// use foliodb::mutation::Data;
///
/// let data = Data::new()
///     .set("email", "ada@example.com")
///     .set("password", "hunter2");
/// assert_eq!(data.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    entries: Vec<(String, DataValue)>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a scalar field. A later `set` for the same field wins.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.entries.retain(|(name, _)| *name != field);
        self.entries.push((field, DataValue::Value(value.into())));
        self
    }

    /// Links a to-one relation to the target row matching `by`.
    pub fn connect(mut self, relation: impl Into<String>, by: UniqueWhere) -> Self {
        let relation = relation.into();
        self.entries.retain(|(name, _)| *name != relation);
        self.entries.push((relation, DataValue::Connect(by)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
    }

    pub fn entries(&self) -> &[(String, DataValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a [`Data`] payload from `"field" => value` pairs.
///
/// ```
/// use foliodb::data;
///
/// let payload = data! {
///     "title" => "Portfolio v2",
///     "featured" => true,
/// };
/// assert_eq!(payload.len(), 2);
/// ```
#[macro_export]
macro_rules! data {
    ( $( $field:expr => $value:expr ),* $(,)? ) => {{
        #[allow(unused_mut)]
        let mut payload = $crate::mutation::Data::new();
        $( payload = payload.set($field, $value); )*
        payload
    }};
}

/// Arguments for updateMany. Without a filter every row is updated;
/// `limit` caps the number of affected rows after filtering.
#[derive(Debug, Clone)]
pub struct UpdateManyArgs {
    pub filter: Option<Filter>,
    pub data: Data,
    pub limit: Option<u64>,
}

impl UpdateManyArgs {
    pub fn new(data: Data) -> Self {
        Self {
            filter: None,
            data,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Arguments for deleteMany. Without a filter every row is deleted.
#[derive(Debug, Clone, Default)]
pub struct DeleteManyArgs {
    pub filter: Option<Filter>,
    pub limit: Option<u64>,
}

impl DeleteManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Filter> for DeleteManyArgs {
    fn from(filter: Filter) -> Self {
        Self::new().filter(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_set_replaces_earlier() {
        let data = Data::new().set("name", "a").set("name", "b");
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("name"), Some(&DataValue::Value(Value::from("b"))));
    }

    #[test]
    fn test_data_macro_collects_pairs() {
        let payload = data! {
            "slug" => "rust",
            "name" => "Rust",
        };
        assert_eq!(payload.len(), 2);
        assert_eq!(
            payload.get("slug"),
            Some(&DataValue::Value(Value::from("rust")))
        );
    }
}
