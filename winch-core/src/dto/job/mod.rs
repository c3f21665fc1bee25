//! Job DTOs for the HTTP API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to create a new queued job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env_overrides: HashMap<String, String>,
}

/// Request to attach a result payload to a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachResult {
    pub result: serde_json::Value,
}
