use derive_more::with_trait::Display;
use derive_more::{Deref, DerefMut, From};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of an entity, as owned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Deref, DerefMut, From)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Display)]
#[display("items={} count={count:?} status={status:?}", items.len())]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<Record>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ListResponse {
    pub fn is_rejected(&self) -> bool {
        self.items.is_empty() && self.status.as_deref().is_some_and(|s| s != "success")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Display)]
#[display("status={status:?} message={message:?}")]
pub struct MutationResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl MutationResponse {
    pub fn success() -> Self {
        Self {
            status: Some("success".to_string()),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Display)]
#[display("connected={connected} models={}", models.len())]
pub struct SdStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub models: Vec<String>,
}

/// What happened to a create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum MutationOutcome {
    #[display("applied")]
    Applied,
    #[display("rejected: {_0}")]
    Rejected(String),
    #[display("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_reads_id_and_name() {
        let record: Record = serde_json::from_value(json!({"id": 7, "name": "Loft"})).unwrap();
        assert_eq!(record.id(), Some(7));
        assert_eq!(record.name(), Some("Loft"));
    }

    #[test]
    fn list_response_tolerates_missing_fields() {
        let list: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(list.items.is_empty());
        assert_eq!(list.count, None);
        assert!(!list.is_rejected());

        let list: ListResponse =
            serde_json::from_str(r#"{"status":"error","message":"unknown table"}"#).unwrap();
        assert!(list.is_rejected());
    }

    #[test]
    fn mutation_success_needs_exact_status() {
        assert!(MutationResponse::success().is_success());
        assert!(!MutationResponse::error("nope").is_success());
        assert!(!MutationResponse::default().is_success());
    }
}
