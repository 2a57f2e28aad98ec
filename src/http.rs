//! HTTP transport
//!
//! Every check is a single blocking request. The [`Transport`] trait is the
//! seam between the harness and the network: [`UreqTransport`] talks to the
//! real server, tests substitute a scripted implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP methods used by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => Err(format!("Unsupported method '{}'. Supported: GET, POST", s)),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A request as the harness describes it
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub token: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: Method::Get,
            url,
            token: None,
            body: None,
        }
    }

    pub fn post(url: String, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url,
            token: None,
            body: Some(body),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Raw result of one request, before any classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// HTTP status code, 0 when no response was received
    pub status: u16,
    pub body: String,
    pub transport_error: Option<String>,
    pub url: String,
}

impl RequestOutcome {
    pub fn response(url: &str, status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            transport_error: None,
            url: url.to_string(),
        }
    }

    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: String::new(),
            transport_error: Some(error.into()),
            url: url.to_string(),
        }
    }
}

/// Sends requests to the API
///
/// Implementations never fail: transport problems are reported through
/// [`RequestOutcome::transport_error`].
pub trait Transport: Sync {
    fn send(&self, request: &ApiRequest) -> RequestOutcome;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &ApiRequest) -> RequestOutcome {
        (**self).send(request)
    }
}

/// Options for building the real transport
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub timeout: Duration,
    /// Skip TLS certificate and hostname verification
    pub insecure: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure: false,
        }
    }
}

/// Blocking transport backed by a `ureq` agent
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(options: TransportOptions) -> Self {
        let mut builder = ureq::Agent::config_builder()
            .timeout_global(Some(options.timeout))
            .http_status_as_error(false);

        if options.insecure {
            tracing::warn!("TLS certificate verification is DISABLED for this run");
            builder = builder.tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            );
        }

        let agent: ureq::Agent = builder.build().into();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> RequestOutcome {
        let url = request.url.as_str();
        let auth = request.token.as_ref().map(|t| format!("Bearer {}", t));
        tracing::debug!(method = %request.method, url, authenticated = auth.is_some(), "sending request");

        let result = match request.method {
            Method::Get => {
                let mut req = self
                    .agent
                    .get(url)
                    .header("Content-Type", "application/json")
                    .header("Accept", "application/json");
                if let Some(auth) = &auth {
                    req = req.header("Authorization", auth.as_str());
                }
                req.call()
            }
            Method::Post => {
                let mut req = self
                    .agent
                    .post(url)
                    .header("Content-Type", "application/json")
                    .header("Accept", "application/json");
                if let Some(auth) = &auth {
                    req = req.header("Authorization", auth.as_str());
                }
                let payload = request
                    .body
                    .as_ref()
                    .map(|b| b.to_string())
                    .unwrap_or_default();
                req.send(payload)
            }
        };

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.into_body().read_to_string() {
                    Ok(body) => {
                        tracing::debug!(url, status, bytes = body.len(), "received response");
                        RequestOutcome::response(url, status, body)
                    }
                    Err(e) => {
                        tracing::info!(url, status, error = %e, "failed to read response body");
                        RequestOutcome {
                            status,
                            body: String::new(),
                            transport_error: Some(format!("Failed to read response: {}", e)),
                            url: url.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::info!(url, error = %e, "request failed");
                RequestOutcome::failed(url, e.to_string())
            }
        }
    }
}

/// Joins the base URL and an endpoint path with exactly one slash
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
