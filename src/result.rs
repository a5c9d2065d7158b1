use std::fmt;

use serde_json::Value as JsonValue;

use crate::core::{Row, Value};

/// One entry of a shaped result: a scalar, a nested record (to-one
/// relation), or a list of records (to-many relation).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Value(Value),
    Record(Record),
    List(Vec<Record>),
}

impl Payload {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Value(v) => v.to_json(),
            Self::Record(r) => r.to_json(),
            Self::List(l) => JsonValue::Array(l.iter().map(Record::to_json).collect()),
        }
    }
}

/// The shaped form every typed operation returns: named entries in
/// selection order. Nested relations appear as nested records or lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    entries: Vec<(String, Payload)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, payload: Payload) {
        self.entries.push((name.into(), payload));
    }

    pub fn push_value(&mut self, name: impl Into<String>, value: Value) {
        self.push(name, Payload::Value(value));
    }

    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Scalar entry by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Payload::as_value)
    }

    /// Nested to-one record by name. `None` both when the entry is
    /// missing and when the relation resolved to null.
    pub fn record(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Payload::as_record)
    }

    /// Nested to-many list by name.
    pub fn list(&self, name: &str) -> Option<&[Record]> {
        self.get(name).and_then(Payload::as_list)
    }

    pub fn entries(&self) -> &[(String, Payload)] {
        &self.entries
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (name, payload) in &self.entries {
            map.insert(name.clone(), payload.to_json());
        }
        JsonValue::Object(map)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Tabular output of the raw SQL surface.
#[derive(Debug)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
