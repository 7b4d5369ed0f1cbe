use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Answer returned by a read-only query task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Whether the generated query code ran to completion.
    #[serde(default)]
    pub success: bool,
    /// Fields returned by the query.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Error text when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Successful result carrying `data`.
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Names from `required` missing in `data`, in order.
    pub fn missing_fields<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|field| !self.data.contains_key(*field))
            .collect()
    }
}
