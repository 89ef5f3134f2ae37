//! Shared construction for the backend clients: pooled connections,
//! identification headers, and access-token sourcing.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tracing::warn;

use conveyor_common::workspace::AuthConfig;

use crate::error::{ClientError, Result};

const DEFAULT_TIMEOUT: f64 = 15.0;
const MIN_TIMEOUT: f64 = 0.5;
const MAX_TIMEOUT: f64 = 60.0;

/// Environment variables consulted for an access token, first hit wins.
const TOKEN_VARS: [&str; 4] = [
    "WORKFLOW_HTTP_TOKEN",
    "WORKFLOW_TOKEN",
    "GITHUB_TOKEN",
    "GITHUB_PAT",
];

/// Per-client configuration: baseurl, request timeout, and auth.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub baseurl: String,
    pub timeout: Duration,
    pub token: Option<String>,
    pub auth: Option<AuthConfig>,
}

impl ClientConfig {
    pub fn new(baseurl: impl Into<String>) -> Self {
        Self {
            baseurl: baseurl.into(),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT),
            token: token_from_env(),
            auth: None,
        }
    }

    /// Request timeout in seconds, clamped to [0.5, 60].
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Duration::from_secs_f64(seconds.clamp(MIN_TIMEOUT, MAX_TIMEOUT));
        self
    }

    /// Explicit token, overriding the environment chain.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_auth(mut self, auth: Option<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    /// Build the pooled HTTP client with identification headers attached.
    pub fn build(&self) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("workflow-client"));
        headers.insert(
            "x-client-version",
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        );
        headers.insert("x-client-os", HeaderValue::from_static(std::env::consts::OS));
        headers.insert(
            "x-client-arch",
            HeaderValue::from_static(std::env::consts::ARCH),
        );
        match (&self.token, &self.auth) {
            (Some(token), Some(auth)) if auth.is_github_token() => {
                let value = HeaderValue::from_str(token)
                    .map_err(|err| ClientError::Config(err.to_string()))?;
                headers.insert("x-access-token", value);
            }
            (None, _) => {
                warn!(baseurl = %self.baseurl, "no access token found, requests are unauthenticated");
            }
            _ => {}
        }
        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|err| ClientError::Config(err.to_string()))
    }
}

/// Source an access token from the environment, in precedence order.
pub fn token_from_env() -> Option<String> {
    TOKEN_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|value| !value.is_empty()))
}

/// Map a non-success response into the client error taxonomy.
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(ClientError::InvalidRequest {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_clamped() {
        let config = ClientConfig::new("http://localhost:8004").with_timeout(0.1);
        assert_eq!(config.timeout, Duration::from_secs_f64(0.5));
        let config = ClientConfig::new("http://localhost:8004").with_timeout(120.0);
        assert_eq!(config.timeout, Duration::from_secs_f64(60.0));
        let config = ClientConfig::new("http://localhost:8004").with_timeout(15.0);
        assert_eq!(config.timeout, Duration::from_secs_f64(15.0));
    }

    #[test]
    fn explicit_token_wins() {
        let config = ClientConfig::new("http://localhost:8004").with_token("abc123");
        assert_eq!(config.token.as_deref(), Some("abc123"));
    }
}
