//! Endpoint data model, mirroring the backend's endpoint-management API.
//!
//! Field names follow the backend wire format verbatim (including the
//! `keyValue` row key) so payloads pass through to the UI untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One key/value row of a header/query-param/path-param table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub row_id: i64,
    #[serde(rename = "keyValue")]
    pub key_value: String,
    pub value: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RequestSpec {
    #[serde(default)]
    pub headers: Option<Vec<Row>>,
    #[serde(default)]
    pub query_params: Option<Vec<Row>>,
    #[serde(default)]
    pub path_params: Option<Vec<Row>>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResponseSpec {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub headers: Option<Vec<Row>>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// A labeled request/expected-response pair under an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request: Option<RequestSpec>,
    #[serde(default)]
    pub response: Option<ResponseSpec>,
}

/// An HTTP endpoint registered in the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    #[serde(default)]
    pub id: Option<i64>,
    pub operation_id: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub method: String,
    pub path: String,
    pub base_url: String,
    #[serde(default)]
    pub cases: Vec<Case>,
}
