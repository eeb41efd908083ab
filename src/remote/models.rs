// ABOUTME: Upstream catalog entities and raw history records as the REST API returns them
// ABOUTME: Every history field is optional so shape drift across API versions does not fail a page

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reads a text field whatever JSON type the service put there. Scalars keep
/// their textual form, objects and arrays their JSON text, null stays absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Attempts that are not objects still count, as empty attempts.
fn lenient_attempts<'de, D>(deserializer: D) -> Result<Option<Vec<RefreshAttempt>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A dataset the service reports as refreshable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataflow {
    #[serde(rename = "objectId")]
    pub object_id: String,
    #[serde(default)]
    pub name: String,
}

/// OData collection envelope: one page of items plus the continuation link.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshAttempt {
    pub attempt_id: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub start_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub end_time: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub service_exception_json: Option<String>,
}

impl RefreshAttempt {
    /// The upstream sends attempt ids as numbers; tolerate strings too.
    pub fn is_first(&self) -> bool {
        match &self.attempt_id {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => s.trim() == "1",
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRefreshEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub request_id: Option<String>,
    pub id: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub refresh_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub start_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub end_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(alias = "attempts", deserialize_with = "lenient_attempts")]
    pub refresh_attempts: Option<Vec<RefreshAttempt>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTransactionEntry {
    pub transaction_id: Option<Value>,
    // Current API versions name the transaction id plain `id`.
    pub id: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub request_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub refresh_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub start_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub end_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

/// One history record, tagged by the kind of resource it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RawHistoryEntry {
    Refresh(RawRefreshEntry),
    Transaction(RawTransactionEntry),
}
