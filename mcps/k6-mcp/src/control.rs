//! Client for the k6 REST control API
//!
//! Each running test exposes `/v1/status` on its own control port.
//! See: https://grafana.com/docs/k6/latest/reference/k6-rest-api/

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::ControlConfig;
use crate::error::{K6Error, K6Result};
use crate::types::EngineStatus;

/// HTTP client for per-test control endpoints
#[derive(Clone)]
pub struct ControlClient {
    client: Client,
    host: String,
}

// k6 API envelope: {"data": {"attributes": {...}}}
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    data: StatusData,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(default)]
    attributes: EngineStatus,
}

impl ControlClient {
    pub fn new(config: &ControlConfig) -> K6Result<Self> {
        let client = Client::builder()
            .user_agent("k6-mcp/0.1")
            .no_proxy()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| K6Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: "127.0.0.1".to_string(),
        })
    }

    pub fn status_url(&self, port: u16) -> String {
        format!("http://{}:{}/v1/status", self.host, port)
    }

    /// Flip the paused flag of the test listening on `port`
    ///
    /// Any 2xx counts as success; the response body is not inspected.
    pub async fn set_paused(&self, test_id: &str, port: u16, paused: bool) -> K6Result<()> {
        let body = paused_body(paused);

        let response = self
            .client
            .patch(self.status_url(port))
            .json(&body)
            .send()
            .await
            .map_err(|e| control_error(test_id, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(control_error(test_id, format!("HTTP {}: {}", status, text)));
        }

        Ok(())
    }

    /// Read the engine's own view of the test
    pub async fn status(&self, test_id: &str, port: u16) -> K6Result<EngineStatus> {
        let response = self
            .client
            .get(self.status_url(port))
            .send()
            .await
            .map_err(|e| control_error(test_id, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(control_error(test_id, format!("HTTP {}: {}", status, text)));
        }

        let envelope: StatusEnvelope = response
            .json()
            .await
            .map_err(|e| control_error(test_id, format!("invalid status body: {}", e)))?;

        Ok(envelope.data.attributes)
    }
}

fn paused_body(paused: bool) -> serde_json::Value {
    json!({ "data": { "attributes": { "paused": paused } } })
}

fn control_error(test_id: &str, detail: String) -> K6Error {
    tracing::warn!(test_id, "control API request failed: {}", detail);
    K6Error::ControlPlane {
        test_id: test_id.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_url() {
        let client = ControlClient::new(&ControlConfig::default()).unwrap();
        assert_eq!(client.status_url(6565), "http://127.0.0.1:6565/v1/status");
    }

    #[test]
    fn test_patch_body_shape() {
        assert_eq!(
            paused_body(false),
            json!({ "data": { "attributes": { "paused": false } } })
        );
    }

    #[test]
    fn test_status_envelope_parses() {
        let envelope: StatusEnvelope = serde_json::from_value(json!({
            "data": {
                "type": "status",
                "id": "default",
                "attributes": { "paused": false, "running": true, "vus": 5 }
            }
        }))
        .unwrap();

        assert_eq!(envelope.data.attributes.running, Some(true));
        assert_eq!(envelope.data.attributes.vus, Some(5));
    }

    #[tokio::test]
    async fn test_unreachable_port_is_control_plane_error() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = ControlClient::new(&ControlConfig::default()).unwrap();
        let err = client.set_paused("test_x", port, true).await.unwrap_err();
        assert!(matches!(err, K6Error::ControlPlane { .. }));
    }
}
