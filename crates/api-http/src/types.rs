//! HTTP Response Types

use finsight_core::domain::RunState;
use serde::Serialize;

/// Body of every failed response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub run_state: RunState,
}
