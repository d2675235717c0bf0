//! Parameter types for k6 MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StartTestParams {
    #[schemars(description = "Local path to the k6 test script (e.g. 'sample_test.js')")]
    pub script_path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TestIdParams {
    #[schemars(description = "The test ID returned by start_test (e.g. 'test_1a2b3c4d')")]
    pub test_id: String,
}
