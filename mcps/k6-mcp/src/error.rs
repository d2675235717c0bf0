//! Error types for k6 test lifecycle operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the registry and its collaborators
#[derive(Error, Debug)]
pub enum K6Error {
    #[error("Test script not found at '{0}'")]
    ScriptNotFound(String),

    #[error("Test with ID '{0}' not found")]
    TestNotFound(String),

    #[error("The '{0}' command was not found - ensure k6 is installed and in PATH")]
    ExecutableMissing(String),

    #[error("Failed to launch test: {0}")]
    LaunchFailed(String),

    #[error("Control API on port {port} did not become reachable within {waited_ms}ms")]
    StartupTimeout { port: u16, waited_ms: u64 },

    #[error("Error communicating with k6 API for test '{test_id}': {detail}")]
    ControlPlane { test_id: String, detail: String },

    #[error("Test '{test_id}' is {status}: {reason}")]
    InvalidState {
        test_id: String,
        status: String,
        reason: String,
    },

    #[error("No free control port among {limit} ports starting at {base}")]
    ResourceExhausted { base: u16, limit: u16 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable error category, attached to every tool error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ExecutableMissing,
    LaunchFailed,
    StartupTimeout,
    ControlPlaneError,
    InvalidState,
    ResourceExhausted,
    TerminationTimeout,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ExecutableMissing => "executable_missing",
            ErrorKind::LaunchFailed => "launch_failed",
            ErrorKind::StartupTimeout => "startup_timeout",
            ErrorKind::ControlPlaneError => "control_plane_error",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::TerminationTimeout => "termination_timeout",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl K6Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            K6Error::ScriptNotFound(_) | K6Error::TestNotFound(_) => ErrorKind::NotFound,
            K6Error::ExecutableMissing(_) => ErrorKind::ExecutableMissing,
            K6Error::LaunchFailed(_) => ErrorKind::LaunchFailed,
            K6Error::StartupTimeout { .. } => ErrorKind::StartupTimeout,
            K6Error::ControlPlane { .. } => ErrorKind::ControlPlaneError,
            K6Error::InvalidState { .. } => ErrorKind::InvalidState,
            K6Error::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            K6Error::Config(_) => ErrorKind::Config,
            K6Error::Io(_) => ErrorKind::Io,
        }
    }
}

pub type K6Result<T> = Result<T, K6Error>;
