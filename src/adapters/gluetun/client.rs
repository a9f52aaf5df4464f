//! Implements PortSource against the gluetun control server.

use crate::adapters::http;
use crate::domain::{ForwardedPort, GlueforwardError};
use crate::ports::PortSource;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

const SERVICE: &str = "gluetun";
const PORT_FORWARDED_PATH: &str = "/v1/openvpn/portforwarded";

#[derive(Deserialize)]
struct PortForwardedResponse {
    port: u32,
}

/// gluetun control-server client. Optionally presents an API key.
pub struct GluetunClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GluetunClient {
    /// # Arguments
    /// * `client` - HTTP client (carries the request timeout)
    /// * `base_url` - gluetun control server, e.g. `http://gluetun:8000`
    /// * `api_key` - sent as `X-API-Key` when present
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl PortSource for GluetunClient {
    async fn get_forwarded_port(&self) -> Result<ForwardedPort, GlueforwardError> {
        let mut request = self
            .client
            .get(http::endpoint(&self.base_url, PORT_FORWARDED_PATH));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| http::transport_error(SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(GlueforwardError::AuthFailed {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: http::error_body(response).await,
            });
        }
        if !status.is_success() {
            return Err(GlueforwardError::GetPortFailed {
                status: status.as_u16(),
                body: http::error_body(response).await,
            });
        }

        let text = http::read_text(SERVICE, response).await?;
        let data: PortForwardedResponse =
            serde_json::from_str(&text).map_err(|e| GlueforwardError::MalformedResponse {
                service: SERVICE.to_string(),
                reason: format!("expected {{\"port\": <int>}}: {}", e),
            })?;

        debug!(port = data.port, "gluetun reported forwarded port");
        Ok(ForwardedPort::new(data.port))
    }
}
