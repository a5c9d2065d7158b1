use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::core::{Result, Row, Value};
use crate::schema::EntityDef;
use crate::store::MemStore;

/// The acting user attached to a client handle via
/// [`Client::as_user`](crate::client::Client::as_user), plus optional
/// request metadata carried into every audit row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorContext {
    pub user_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActorContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}

/// One recorded mutation: who did what to which row, with before/after
/// images. `old_data` is null for creates, `new_data` for deletes.
/// Serializes with the `AuditLog` field names for export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub entity: &'static str,
    pub entity_id: String,
    pub user_id: String,
    pub old_data: Option<JsonValue>,
    pub new_data: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity: &'static str,
        entity_id: impl Into<String>,
        actor: &ActorContext,
    ) -> Self {
        Self {
            action: action.into(),
            entity,
            entity_id: entity_id.into(),
            user_id: actor.user_id.clone(),
            old_data: None,
            new_data: None,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn old_data(mut self, image: JsonValue) -> Self {
        self.old_data = Some(image);
        self
    }

    pub fn new_data(mut self, image: JsonValue) -> Self {
        self.new_data = Some(image);
        self
    }

    /// Renders the entry as an `AuditLog` row in registry field order.
    pub fn to_row(&self) -> Row {
        vec![
            Value::from(Uuid::new_v4()),
            Value::from(self.user_id.as_str()),
            Value::from(self.action.as_str()),
            Value::from(self.entity),
            Value::from(self.entity_id.as_str()),
            self.old_data
                .clone()
                .map(Value::Json)
                .unwrap_or(Value::Null),
            self.new_data
                .clone()
                .map(Value::Json)
                .unwrap_or(Value::Null),
            Value::from(self.ip_address.clone()),
            Value::from(self.user_agent.clone()),
            Value::from(self.created_at),
        ]
    }
}

/// Full scalar image of a row, field name to JSON value. Audit images
/// are faithful: omit lists do not apply here.
pub(crate) fn snapshot(entity: &EntityDef, row: &Row) -> JsonValue {
    let mut map = serde_json::Map::with_capacity(entity.fields.len());
    for (field, value) in entity.fields.iter().zip(row) {
        map.insert(field.name.to_string(), value.to_json());
    }
    JsonValue::Object(map)
}

/// Destination for audit entries. The default sink writes `AuditLog`
/// rows back into the store; tests swap in recording or failing sinks.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entries: &[AuditEntry]) -> Result<()>;
}

/// Writes entries as `AuditLog` rows. Runs strictly after the mutation
/// that produced the entries has committed.
pub struct StoreAuditSink {
    store: Arc<MemStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, entries: &[AuditEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tables = self.store.exclusive().await;
        for entry in entries {
            tables.insert("AuditLog", entry.to_row())?;
        }
        Ok(())
    }
}
