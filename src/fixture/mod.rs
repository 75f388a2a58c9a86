//! Stub server and client used to exercise the harness end to end.
//!
//! Neither is needed by the harness itself; they back the `stub-server` and
//! `stub-client` binaries.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body returned by the stub server's `/get` and `/post` routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub method: String,
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_data: Option<Value>,
}
