//! Type definitions for k6 MCP

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

// ============================================================================
// Test State
// ============================================================================

/// Lifecycle state of a tracked test
///
/// `Paused <-> Running` via the control API. Either may become `Finished`
/// when the process exits on its own, or `Stopped` via `stop_test`.
/// `Finished` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Paused,
    Running,
    Finished,
    Stopped,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Finished | TestStatus::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Paused => "paused",
            TestStatus::Running => "running",
            TestStatus::Finished => "finished",
            TestStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Snapshot of one tracked test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestView {
    pub pid: u32,
    pub script: String,
    pub port: u16,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Response for `start_test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedTest {
    pub test_id: String,
    pub pid: u32,
    pub port: u16,
    pub script: String,
    pub status: TestStatus,
    pub message: String,
}

/// Response for `pause_test` / `resume_test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub test_id: String,
    pub status: TestStatus,
    pub message: String,
}

/// Response for `stop_test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReport {
    pub test_id: String,
    pub status: TestStatus,
    /// True when the grace period ran out and the process was killed
    pub escalated: bool,
    /// `termination_timeout` when escalated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub message: String,
}

/// Response for `reap_tests`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReapReport {
    pub removed: Vec<String>,
    pub message: String,
}

/// Live view reported by the k6 REST API (`GET /v1/status`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tainted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,
    #[serde(
        default,
        rename(deserialize = "vus-max"),
        skip_serializing_if = "Option::is_none"
    )]
    pub vus_max: Option<u64>,
}

/// Response for `get_test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDetails {
    pub test_id: String,
    #[serde(flatten)]
    pub view: TestView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TestStatus::Paused.is_terminal());
        assert!(!TestStatus::Running.is_terminal());
        assert!(TestStatus::Finished.is_terminal());
        assert!(TestStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TestStatus::Running).unwrap(),
            serde_json::json!("running")
        );
        assert_eq!(TestStatus::Finished.to_string(), "finished");
    }

    #[test]
    fn test_engine_status_reads_k6_attributes() {
        let status: EngineStatus = serde_json::from_value(serde_json::json!({
            "paused": true,
            "vus": 1,
            "vus-max": 10,
            "stopped": false,
            "running": true,
            "tainted": false
        }))
        .unwrap();

        assert_eq!(status.paused, Some(true));
        assert_eq!(status.vus_max, Some(10));
        assert_eq!(status.tainted, Some(false));
    }
}
