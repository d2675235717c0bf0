//! Tool handlers
//!
//! Each handler forwards to the registry and renders the result as pretty
//! JSON. Registry errors become MCP errors tagged with their kind.

use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;
use serde_json::json;

use crate::error::K6Error;
use crate::params::*;
use crate::registry::TestRegistry;

// ============================================================================
// Helper Functions
// ============================================================================

pub fn k6_error_to_mcp(err: K6Error) -> McpError {
    let data = Some(json!({ "kind": err.kind() }));
    match &err {
        K6Error::ScriptNotFound(_) | K6Error::TestNotFound(_) => {
            McpError::invalid_params(err.to_string(), data)
        }
        K6Error::InvalidState { .. } => McpError::invalid_request(err.to_string(), data),
        _ => McpError::internal_error(err.to_string(), data),
    }
}

/// Pretty-printed JSON tool result
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ============================================================================
// Handler Functions
// ============================================================================

pub async fn start_test(
    registry: &TestRegistry,
    params: StartTestParams,
) -> Result<CallToolResult, McpError> {
    let started = registry
        .start_test(&params.script_path)
        .await
        .map_err(k6_error_to_mcp)?;
    json_success(&started)
}

pub async fn list_tests(registry: &TestRegistry) -> Result<CallToolResult, McpError> {
    let tests = registry.list_tests().await;
    if tests.is_empty() {
        return json_success(&json!({ "message": "No tests are currently tracked." }));
    }
    json_success(&tests)
}

pub async fn get_test(
    registry: &TestRegistry,
    params: TestIdParams,
) -> Result<CallToolResult, McpError> {
    let details = registry
        .get_test(&params.test_id)
        .await
        .map_err(k6_error_to_mcp)?;
    json_success(&details)
}

pub async fn pause_test(
    registry: &TestRegistry,
    params: TestIdParams,
) -> Result<CallToolResult, McpError> {
    let change = registry
        .pause_test(&params.test_id)
        .await
        .map_err(k6_error_to_mcp)?;
    json_success(&change)
}

pub async fn resume_test(
    registry: &TestRegistry,
    params: TestIdParams,
) -> Result<CallToolResult, McpError> {
    let change = registry
        .resume_test(&params.test_id)
        .await
        .map_err(k6_error_to_mcp)?;
    json_success(&change)
}

pub async fn stop_test(
    registry: &TestRegistry,
    params: TestIdParams,
) -> Result<CallToolResult, McpError> {
    let report = registry
        .stop_test(&params.test_id)
        .await
        .map_err(k6_error_to_mcp)?;
    json_success(&report)
}

pub async fn reap_tests(registry: &TestRegistry) -> Result<CallToolResult, McpError> {
    json_success(&registry.reap_tests().await)
}
