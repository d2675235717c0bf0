//! MCP Server implementation for k6 test lifecycle management
//!
//! Tools delegate to the handlers module; the registry holds all state.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::error::K6Result;
use crate::handlers;
use crate::params::*;
use crate::registry::TestRegistry;

const INSTRUCTIONS: &str = "k6 load test manager. Tests start PAUSED: call start_test with a \
    script path, then resume_test to begin generating load. Use list_tests or get_test to see \
    status, pause_test/resume_test to control a running test, stop_test to terminate it, and \
    reap_tests to clear finished or stopped tests.";

/// Errors from in-process tool dispatch
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error("{}", .0.message)]
    Tool(McpError),
}

impl From<McpError> for DispatchError {
    fn from(err: McpError) -> Self {
        DispatchError::Tool(err)
    }
}

/// The k6 MCP Server
#[derive(Clone)]
pub struct K6McpServer {
    registry: TestRegistry,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl K6McpServer {
    pub fn new(config: Config) -> K6Result<Self> {
        Ok(Self::with_registry(TestRegistry::new(config)?))
    }

    pub fn with_registry(registry: TestRegistry) -> Self {
        Self {
            registry,
            tool_router: Self::tool_router(),
        }
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    #[tool(
        description = "Start a k6 load test in the background. The test starts PAUSED; use resume_test to begin."
    )]
    async fn start_test(
        &self,
        Parameters(params): Parameters<StartTestParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::start_test(&self.registry, params).await
    }

    #[tool(description = "List all tracked k6 tests with their pid, script, control port, and status")]
    async fn list_tests(&self) -> Result<CallToolResult, McpError> {
        handlers::list_tests(&self.registry).await
    }

    #[tool(description = "Show one k6 test, including the engine's live status when it is running or paused")]
    async fn get_test(
        &self,
        Parameters(params): Parameters<TestIdParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::get_test(&self.registry, params).await
    }

    #[tool(description = "Pause a k6 test via its REST API")]
    async fn pause_test(
        &self,
        Parameters(params): Parameters<TestIdParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::pause_test(&self.registry, params).await
    }

    #[tool(description = "Resume a paused k6 test via its REST API")]
    async fn resume_test(
        &self,
        Parameters(params): Parameters<TestIdParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::resume_test(&self.registry, params).await
    }

    #[tool(
        description = "Stop a k6 test (SIGTERM, then kill after the grace period). The test stays listed as stopped until reaped: stopping it again fails with kind invalid_state, and only after reap_tests does the id report not_found."
    )]
    async fn stop_test(
        &self,
        Parameters(params): Parameters<TestIdParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::stop_test(&self.registry, params).await
    }

    #[tool(description = "Remove all finished and stopped tests from the list")]
    async fn reap_tests(&self) -> Result<CallToolResult, McpError> {
        handlers::reap_tests(&self.registry).await
    }
}

// ============================================================================
// In-process Dispatch
// ============================================================================

impl K6McpServer {
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    /// Call a tool by name without going through a transport
    pub async fn call_tool(&self, name: &str, params: Value) -> Result<CallToolResult, DispatchError> {
        let result = match name {
            "start_test" => {
                let params: StartTestParams = serde_json::from_value(params)?;
                self.start_test(Parameters(params)).await
            }
            "list_tests" => self.list_tests().await,
            "get_test" => {
                let params: TestIdParams = serde_json::from_value(params)?;
                self.get_test(Parameters(params)).await
            }
            "pause_test" => {
                let params: TestIdParams = serde_json::from_value(params)?;
                self.pause_test(Parameters(params)).await
            }
            "resume_test" => {
                let params: TestIdParams = serde_json::from_value(params)?;
                self.resume_test(Parameters(params)).await
            }
            "stop_test" => {
                let params: TestIdParams = serde_json::from_value(params)?;
                self.stop_test(Parameters(params)).await
            }
            "reap_tests" => self.reap_tests().await,
            _ => return Err(DispatchError::ToolNotFound(name.to_string())),
        };
        result.map_err(Into::into)
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for K6McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
