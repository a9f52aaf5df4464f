//! Implements ServiceClient for the slskd REST API.
//!
//! Authentication is a bearer token from `POST /api/v0/session`. The port is changed
//! by a read-modify-write of the YAML options document; a concurrent edit between the
//! GET and the POST is overwritten.

use crate::adapters::http;
use crate::adapters::slskd::options;
use crate::domain::{Credentials, ForwardedPort, GlueforwardError};
use crate::ports::ServiceClient;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

const SERVICE: &str = "slskd";
const SESSION_PATH: &str = "/api/v0/session";
const OPTIONS_YAML_PATH: &str = "/api/v0/options/yaml";

/// Ports slskd accepts as a listen port.
pub const VALID_PORTS: RangeInclusive<u32> = 1024..=65535;

#[derive(Deserialize)]
struct SessionResponse {
    token: Option<String>,
}

/// slskd API client.
pub struct SlskdClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    /// Bearer token from the last successful login. `None` = unauthenticated.
    token: Option<String>,
}

impl SlskdClient {
    pub fn new(client: Client, base_url: impl Into<String>, credentials: Credentials) -> Self {
        debug!(service = SERVICE, "client created");
        Self {
            client,
            base_url: base_url.into(),
            credentials,
            token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Unauthenticated -> Authenticated. A rejected login is fatal.
    async fn ensure_authenticated(&mut self) -> Result<String, GlueforwardError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        self.token = Some(token.clone());
        info!(service = SERVICE, "authenticated");
        Ok(token)
    }

    /// Authenticated -> Unauthenticated, after slskd rejected the token.
    fn invalidate_session(&mut self) {
        self.token = None;
        debug!(service = SERVICE, "session cleared");
    }

    async fn login(&self) -> Result<String, GlueforwardError> {
        debug!(service = SERVICE, username = %self.credentials.username, "logging in");
        let request = self
            .client
            .post(http::endpoint(&self.base_url, SESSION_PATH))
            .json(&self.credentials);
        let response = http::send(SERVICE, request).await?;
        let text = http::read_text(SERVICE, response).await?;
        let session: SessionResponse =
            serde_json::from_str(&text).map_err(|e| GlueforwardError::MalformedResponse {
                service: SERVICE.to_string(),
                reason: format!("session response: {}", e),
            })?;
        session
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GlueforwardError::MalformedResponse {
                service: SERVICE.to_string(),
                reason: "session response carries no token".to_string(),
            })
    }

    async fn fetch_options(&self, token: &str) -> Result<String, GlueforwardError> {
        let request = self
            .client
            .get(http::endpoint(&self.base_url, OPTIONS_YAML_PATH))
            .header(AUTHORIZATION, format!("Bearer {}", token));
        let response = http::send(SERVICE, request).await?;
        let body = http::read_text(SERVICE, response).await?;
        Ok(options::extract_yaml(&body))
    }

    async fn update_options(&self, token: &str, yaml: &str) -> Result<(), GlueforwardError> {
        // The API takes the YAML document as a JSON string.
        let payload = serde_json::to_string(yaml).map_err(|e| GlueforwardError::Http {
            service: SERVICE.to_string(),
            reason: format!("encode options: {}", e),
        })?;
        let request = self
            .client
            .post(http::endpoint(&self.base_url, OPTIONS_YAML_PATH))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        http::send(SERVICE, request).await?;
        Ok(())
    }

    async fn write_listen_port(
        &self,
        token: &str,
        port: ForwardedPort,
    ) -> Result<(), GlueforwardError> {
        let current = self.fetch_options(token).await?;
        let updated = options::set_listen_port(&current, port.get())?;
        self.update_options(token, &updated).await
    }
}

#[async_trait::async_trait]
impl ServiceClient for SlskdClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn set_port(&mut self, port: ForwardedPort) -> Result<(), GlueforwardError> {
        if !VALID_PORTS.contains(&port.get()) {
            return Err(GlueforwardError::IllegalPort { port: port.get() });
        }

        let token = self.ensure_authenticated().await?;

        match self.write_listen_port(&token, port).await {
            Ok(()) => {
                info!(service = SERVICE, %port, "listening port updated");
                Ok(())
            }
            Err(GlueforwardError::AuthFailed { status, .. }) => {
                warn!(service = SERVICE, status, "token rejected; will log in again");
                self.invalidate_session();
                Err(GlueforwardError::ReauthNeeded {
                    service: SERVICE.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorClass;
    use mockito::Matcher;
    use std::time::Duration;

    const CURRENT: &str = "web:\n  port: 5030\nsoulseek:\n  listen_port: 50300\n  username: someone\nshares:\n  directories:\n  - /music\n";

    fn slskd(url: String) -> SlskdClient {
        let client = http::build_client(Duration::from_secs(2)).unwrap();
        SlskdClient::new(client, url, Credentials::new("slskd", "slskd"))
    }

    async fn mock_session(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
        server
            .mock("POST", SESSION_PATH)
            .match_body(Matcher::Json(serde_json::json!({
                "username": "slskd",
                "password": "slskd",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"expires":1700000000,"name":"slskd","token":"tok"}"#)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_illegal_ports_make_no_requests() {
        let mut server = mockito::Server::new_async().await;
        let session = mock_session(&mut server, 0).await;
        let get = server
            .mock("GET", OPTIONS_YAML_PATH)
            .expect(0)
            .create_async()
            .await;
        let post = server
            .mock("POST", OPTIONS_YAML_PATH)
            .expect(0)
            .create_async()
            .await;

        let mut client = slskd(server.url());
        for port in [80, 1023, 65536, 70000] {
            let err = client.set_port(ForwardedPort::new(port)).await.unwrap_err();
            assert!(matches!(err, GlueforwardError::IllegalPort { port: p } if p == port));
            assert_eq!(err.class(), ErrorClass::RetryableDelayed);
        }
        assert!(!client.is_authenticated());
        session.assert_async().await;
        get.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_port_reads_then_writes_options() {
        let mut server = mockito::Server::new_async().await;
        let session = mock_session(&mut server, 1).await;
        let get = server
            .mock("GET", OPTIONS_YAML_PATH)
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(CURRENT).unwrap())
            .expect(1)
            .create_async()
            .await;
        let expected = options::set_listen_port(CURRENT, 51413).unwrap();
        let post = server
            .mock("POST", OPTIONS_YAML_PATH)
            .match_header("authorization", "Bearer tok")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::Value::String(expected)))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut client = slskd(server.url());
        client.set_port(ForwardedPort::new(51413)).await.unwrap();

        assert!(client.is_authenticated());
        session.assert_async().await;
        get.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_port_accepts_wrapped_document() {
        let mut server = mockito::Server::new_async().await;
        let _session = mock_session(&mut server, 1).await;
        let _get = server
            .mock("GET", OPTIONS_YAML_PATH)
            .with_status(200)
            .with_body(serde_json::json!({ "yaml": CURRENT }).to_string())
            .create_async()
            .await;
        let post = server
            .mock("POST", OPTIONS_YAML_PATH)
            .match_body(Matcher::Regex("listen_port: 51413".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut client = slskd(server.url());
        client.set_port(ForwardedPort::new(51413)).await.unwrap();
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_login_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _session = server
            .mock("POST", SESSION_PATH)
            .with_status(401)
            .create_async()
            .await;
        let get = server
            .mock("GET", OPTIONS_YAML_PATH)
            .expect(0)
            .create_async()
            .await;

        let mut client = slskd(server.url());
        let err = client.set_port(ForwardedPort::new(51413)).await.unwrap_err();

        assert!(matches!(err, GlueforwardError::AuthFailed { status: 401, .. }));
        assert_eq!(err.class(), ErrorClass::Fatal);
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_needs_reauth() {
        let mut server = mockito::Server::new_async().await;
        let session = mock_session(&mut server, 2).await;
        let expired = server
            .mock("GET", OPTIONS_YAML_PATH)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let mut client = slskd(server.url());
        let err = client.set_port(ForwardedPort::new(51413)).await.unwrap_err();

        assert!(matches!(err, GlueforwardError::ReauthNeeded { .. }));
        assert_eq!(err.class(), ErrorClass::RetryableImmediate);
        assert!(!client.is_authenticated());
        expired.assert_async().await;
        expired.remove_async().await;

        let get = server
            .mock("GET", OPTIONS_YAML_PATH)
            .with_status(200)
            .with_body(serde_json::to_string(CURRENT).unwrap())
            .expect(1)
            .create_async()
            .await;
        let post = server
            .mock("POST", OPTIONS_YAML_PATH)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        client.set_port(ForwardedPort::new(51413)).await.unwrap();
        session.assert_async().await;
        get.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_on_write_is_delayed_retry() {
        let mut server = mockito::Server::new_async().await;
        let _session = mock_session(&mut server, 1).await;
        let _get = server
            .mock("GET", OPTIONS_YAML_PATH)
            .with_status(200)
            .with_body(serde_json::to_string(CURRENT).unwrap())
            .create_async()
            .await;
        let _post = server
            .mock("POST", OPTIONS_YAML_PATH)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let mut client = slskd(server.url());
        let err = client.set_port(ForwardedPort::new(51413)).await.unwrap_err();

        assert!(matches!(err, GlueforwardError::SetPortFailed { status: 500, .. }));
        assert_eq!(err.class(), ErrorClass::RetryableDelayed);
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_session_without_token_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _session = server
            .mock("POST", SESSION_PATH)
            .with_status(200)
            .with_body(r#"{"name":"slskd"}"#)
            .create_async()
            .await;

        let mut client = slskd(server.url());
        let err = client.set_port(ForwardedPort::new(51413)).await.unwrap_err();

        assert!(matches!(err, GlueforwardError::MalformedResponse { .. }));
        assert!(!client.is_authenticated());
    }
}
