//! Implements ServiceClient for the qBittorrent WebUI API.
//!
//! Authentication is a cookie session: login once, replay the cookie, drop it when
//! the WebUI starts answering 403.

use crate::adapters::http;
use crate::domain::{Credentials, ForwardedPort, GlueforwardError};
use crate::ports::ServiceClient;
use reqwest::Client;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Serialize;
use tracing::{debug, info, warn};

const SERVICE: &str = "qBittorrent";
const LOGIN_PATH: &str = "/api/v2/auth/login";
const SET_PREFERENCES_PATH: &str = "/api/v2/app/setPreferences";

/// Body of the `json` form field sent to setPreferences.
#[derive(Serialize)]
struct Preferences {
    listen_port: u32,
    random_port: bool,
    upnp: bool,
}

/// qBittorrent WebUI client.
pub struct QBittorrentClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    /// `Cookie` header value from the last successful login. `None` = unauthenticated.
    session: Option<String>,
}

impl QBittorrentClient {
    pub fn new(client: Client, base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            credentials,
            session: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Unauthenticated -> Authenticated. A rejected login is fatal.
    /// Returns the cookie to replay.
    async fn ensure_authenticated(&mut self) -> Result<String, GlueforwardError> {
        if let Some(cookie) = &self.session {
            return Ok(cookie.clone());
        }
        let cookie = self.login().await?;
        self.session = Some(cookie.clone());
        info!(service = SERVICE, "authenticated");
        Ok(cookie)
    }

    /// Authenticated -> Unauthenticated, after the WebUI rejected the session.
    fn invalidate_session(&mut self) {
        self.session = None;
        debug!(service = SERVICE, "session cleared");
    }

    async fn login(&self) -> Result<String, GlueforwardError> {
        debug!(service = SERVICE, username = %self.credentials.username, "logging in");
        let request = self
            .client
            .post(http::endpoint(&self.base_url, LOGIN_PATH))
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ]);
        let response = http::send(SERVICE, request).await?;

        let cookie = session_cookie(&response);
        let status = response.status().as_u16();
        match cookie {
            Some(cookie) => Ok(cookie),
            // Bad credentials come back as `200 Fails.` without a cookie.
            None => Err(GlueforwardError::AuthFailed {
                service: SERVICE.to_string(),
                status,
                body: http::error_body(response).await,
            }),
        }
    }

    async fn submit_preferences(
        &self,
        session: &str,
        port: ForwardedPort,
    ) -> Result<(), GlueforwardError> {
        let preferences = serde_json::to_string(&Preferences {
            listen_port: port.get(),
            random_port: false,
            upnp: false,
        })
        .map_err(|e| GlueforwardError::Http {
            service: SERVICE.to_string(),
            reason: format!("encode preferences: {}", e),
        })?;

        let request = self
            .client
            .post(http::endpoint(&self.base_url, SET_PREFERENCES_PATH))
            .header(COOKIE, session)
            .form(&[("json", preferences.as_str())]);
        http::send(SERVICE, request).await?;
        Ok(())
    }
}

/// Collect `name=value` pairs from the response's `Set-Cookie` headers into a
/// single `Cookie` header value.
fn session_cookie(response: &reqwest::Response) -> Option<String> {
    let pairs: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[async_trait::async_trait]
impl ServiceClient for QBittorrentClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn set_port(&mut self, port: ForwardedPort) -> Result<(), GlueforwardError> {
        let session = self.ensure_authenticated().await?;

        match self.submit_preferences(&session, port).await {
            Ok(()) => {
                info!(service = SERVICE, %port, "listening port updated");
                Ok(())
            }
            Err(GlueforwardError::AuthFailed { status, .. }) => {
                warn!(service = SERVICE, status, "session rejected; will log in again");
                self.invalidate_session();
                Err(GlueforwardError::ReauthNeeded {
                    service: SERVICE.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}
