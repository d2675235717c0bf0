//! k6 MCP Library
//!
//! Lifecycle management for k6 load tests: start scripts paused on their
//! own control port, pause and resume them through the k6 REST API, watch
//! for exit, and stop them with a bounded grace period.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use k6_mcp::{Config, K6McpServer};
//!
//! let server = K6McpServer::new(Config::default())?;
//! let started = server
//!     .call_tool("start_test", serde_json::json!({ "script_path": "load.js" }))
//!     .await?;
//! ```
//!
//! # Usage as Binary
//!
//! Run directly: `k6-mcp`
//!
//! Or configure in `.mcp.json`:
//! ```json
//! { "mcpServers": { "k6": { "command": "./k6-mcp" } } }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod handlers;
pub mod launcher;
pub mod params;
pub mod ports;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod terminate;
pub mod types;

pub use config::Config;
pub use error::{ErrorKind, K6Error, K6Result};
pub use registry::TestRegistry;
pub use server::{DispatchError, K6McpServer};
pub use types::*;

pub use params::*;
