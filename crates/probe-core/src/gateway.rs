use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::InvocationRecord;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("gateway returned status {code}")]
    Status { code: u16 },
    #[error("decode error: {0}")]
    Decode(String),
}

/// Reply to a remote invocation: the raw result body plus the time the
/// collaborator spent executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeReply {
    pub result: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRecord {
    pub port: u16,
    pub service: String,
    pub method: String,
    pub name: String,
    pub json_params: String,
}

/// Partial update of a stored record. Any field other than `id`/`name`
/// that is `None` is omitted from the wire entirely and the collaborator
/// leaves the stored value unmodified. Rename depends on this: it submits
/// only `id` and `name`. An explicit null is unrepresentable here, so the
/// omitted-vs-null distinction cannot be lost in serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_params: Option<String>,
}

impl UpdateRecord {
    /// A rename: everything except the display name stays untouched
    /// server-side.
    pub fn rename(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            port: None,
            service: None,
            method: None,
            json_params: None,
        }
    }
}

/// Contract consumed by the session core. All calls are asynchronous and
/// may fail; the session layer converts failures into empty lists and a
/// notification rather than propagating them.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn list_services(&self, port: u16) -> Result<Vec<String>, GatewayError>;

    async fn list_methods(&self, port: u16, service: &str) -> Result<Vec<String>, GatewayError>;

    async fn invoke(
        &self,
        port: u16,
        service: &str,
        method: &str,
        json_params: &str,
    ) -> Result<InvokeReply, GatewayError>;

    async fn list_records(&self, port: u16) -> Result<Vec<InvocationRecord>, GatewayError>;

    async fn insert_record(&self, req: &InsertRecord) -> Result<i64, GatewayError>;

    async fn update_record(&self, req: &UpdateRecord) -> Result<(), GatewayError>;

    async fn delete_record(&self, id: i64) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_payload_carries_only_id_and_name() {
        let payload = serde_json::to_value(UpdateRecord::rename(42, "renamed case")).unwrap();
        let object = payload.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["id"], 42);
        assert_eq!(object["name"], "renamed case");
    }

    #[test]
    fn full_update_spells_fields_the_collaborator_way() {
        let payload = serde_json::to_value(UpdateRecord {
            id: 9,
            name: "case".to_string(),
            port: Some(31802),
            service: Some("OrderService".to_string()),
            method: Some("createOrder".to_string()),
            json_params: Some("{}".to_string()),
        })
        .unwrap();
        assert_eq!(payload["jsonParams"], "{}");
        assert_eq!(payload["service"], "OrderService");
        assert_eq!(payload["port"], 31802);
    }

    #[test]
    fn insert_payload_uses_camel_case_params() {
        let payload = serde_json::to_value(InsertRecord {
            port: 9999,
            service: "UserService".to_string(),
            method: "getUserById".to_string(),
            name: "case".to_string(),
            json_params: "{\"userId\":1}".to_string(),
        })
        .unwrap();
        assert_eq!(payload["jsonParams"], "{\"userId\":1}");
        assert!(payload.get("json_params").is_none());
    }
}
