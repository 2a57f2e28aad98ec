//! Test harness
//!
//! Drives the fixed sequence for every account: log in, and when that yields a
//! token, probe each configured endpoint with it. Every check is classified
//! into a result record; no failure aborts the run.

use crate::account::TestAccount;
use crate::endpoints::{EndpointSpec, LOGIN_PATH, default_endpoints};
use crate::http::{ApiRequest, Method, RequestOutcome, Transport, join_url};
use crate::output;
use crate::report::{AccountReport, EndpointEntry, EndpointResult, LoginResult, Report, UserProfile};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default pause between accounts in sequential mode
pub const DEFAULT_PACE: Duration = Duration::from_millis(1000);

/// Why a single check failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}{}", body_suffix(.body))]
    Http { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Protocol(String),

    #[error("Server reported failure: {0}")]
    Logic(String),
}

fn body_suffix(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

/// Rule deciding whether an endpoint probe passed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessCriterion {
    /// HTTP 200 without transport error; the body's `success` flag is only reported
    #[default]
    HttpStatus,
    /// HTTP 200 and a JSON body with `success: true`, the same rule as login
    HttpAndBody,
}

impl fmt::Display for SuccessCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessCriterion::HttpStatus => write!(f, "http-status"),
            SuccessCriterion::HttpAndBody => write!(f, "http-and-body"),
        }
    }
}

/// How accounts are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One account at a time, pausing between accounts
    Sequential { pace: Duration },
    /// All accounts at once; each still logs in before probing
    Parallel,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Sequential { pace: DEFAULT_PACE }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Sequential { pace } => write!(f, "sequential ({} ms pause)", pace.as_millis()),
            RunMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Classify a login response
///
/// Success needs HTTP 200, a JSON body with `success: true` and a non-empty
/// `token`. The `user` object is optional and parsed leniently.
pub fn classify_login(
    outcome: &RequestOutcome,
) -> Result<(String, Option<UserProfile>), CheckError> {
    if let Some(error) = &outcome.transport_error {
        return Err(CheckError::Transport(error.clone()));
    }
    if outcome.status != 200 {
        return Err(CheckError::Http {
            status: outcome.status,
            body: outcome.body.clone(),
        });
    }

    let value: serde_json::Value = serde_json::from_str(&outcome.body)
        .map_err(|e| CheckError::Protocol(format!("login body is not JSON ({}): {}", e, outcome.body)))?;

    if value.get("success").and_then(serde_json::Value::as_bool) != Some(true) {
        let message = value
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| outcome.body.clone());
        return Err(CheckError::Logic(message));
    }

    let token = value
        .get("token")
        .and_then(serde_json::Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CheckError::Protocol("login response has no token".to_string()))?;

    let user = value
        .get("user")
        .filter(|u| u.is_object())
        .and_then(|u| serde_json::from_value::<UserProfile>(u.clone()).ok());

    Ok((token.to_string(), user))
}

/// Classify an endpoint response under `criterion`
pub fn classify_probe(outcome: &RequestOutcome, criterion: SuccessCriterion) -> EndpointResult {
    let decoded: Option<serde_json::Value> = serde_json::from_str(&outcome.body).ok();
    let body_success = decoded
        .as_ref()
        .and_then(|v| v.get("success"))
        .and_then(serde_json::Value::as_bool);

    let verdict = if let Some(error) = &outcome.transport_error {
        Err(CheckError::Transport(error.clone()))
    } else if outcome.status != 200 {
        Err(CheckError::Http {
            status: outcome.status,
            body: outcome.body.clone(),
        })
    } else {
        match criterion {
            SuccessCriterion::HttpStatus => Ok(()),
            SuccessCriterion::HttpAndBody => match (&decoded, body_success) {
                (None, _) => Err(CheckError::Protocol("body is not JSON".to_string())),
                (Some(_), Some(true)) => Ok(()),
                (Some(v), _) => Err(CheckError::Logic(
                    v.get("message")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("success flag is not true")
                        .to_string(),
                )),
            },
        }
    };

    let error = verdict.err().map(|e| e.to_string());
    EndpointResult {
        succeeded: error.is_none(),
        http_status: outcome.status,
        body_success,
        decoded_body: decoded,
        raw_body: (error.is_some() && !outcome.body.is_empty()).then(|| outcome.body.clone()),
        error,
    }
}

/// Runs logins and endpoint probes against one API
pub struct TestHarness<T: Transport> {
    base_url: String,
    transport: T,
    endpoints: Vec<EndpointSpec>,
    criterion: SuccessCriterion,
    mode: RunMode,
    run_date: NaiveDate,
    console: bool,
}

impl<T: Transport> TestHarness<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            endpoints: default_endpoints(),
            criterion: SuccessCriterion::default(),
            mode: RunMode::default(),
            run_date: chrono::Local::now().date_naive(),
            console: false,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<EndpointSpec>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_criterion(mut self, criterion: SuccessCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Date substituted into request bodies
    pub fn with_run_date(mut self, date: NaiveDate) -> Self {
        self.run_date = date;
        self
    }

    /// Print each account's detail block to stdout as soon as it completes
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn criterion(&self) -> SuccessCriterion {
        self.criterion
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    /// Log in one account; never retries
    pub fn login(&self, account: &TestAccount) -> LoginResult {
        let body = serde_json::json!({
            "email": account.email,
            "password": account.password,
        });
        let request = ApiRequest::post(join_url(&self.base_url, LOGIN_PATH), body);
        let outcome = self.transport.send(&request);

        match classify_login(&outcome) {
            Ok((token, user)) => {
                tracing::debug!(email = %account.email, "login succeeded");
                LoginResult::success(outcome.status, token, user)
                    .with_expected_role(account.expected_role_id)
            }
            Err(e) => {
                tracing::info!(email = %account.email, status = outcome.status, error = %e, "login failed");
                LoginResult::failure(outcome.status, e.to_string(), &outcome.body)
            }
        }
    }

    /// Send one authenticated request and classify it
    pub fn probe_endpoint(&self, endpoint: &EndpointSpec, token: &str) -> EndpointResult {
        let url = join_url(&self.base_url, &endpoint.path);
        // a POST without a configured body goes out with an empty body
        let request = match (endpoint.method, endpoint.body_for(self.run_date)) {
            (Method::Post, Some(body)) => ApiRequest::post(url, body),
            (Method::Post, None) => ApiRequest {
                method: Method::Post,
                url,
                token: None,
                body: None,
            },
            (Method::Get, _) => ApiRequest::get(url),
        }
        .with_token(token);

        let result = classify_probe(&self.transport.send(&request), self.criterion);
        if let Some(error) = &result.error {
            tracing::info!(endpoint = %endpoint.path, status = result.http_status, error = %error, "probe failed");
        }
        result
    }

    /// Probe every configured endpoint in order
    pub fn probe_all_endpoints(&self, account: &TestAccount, token: &str) -> Vec<EndpointEntry> {
        tracing::debug!(email = %account.email, count = self.endpoints.len(), "probing endpoints");
        self.endpoints
            .iter()
            .map(|endpoint| EndpointEntry {
                endpoint: endpoint.path.clone(),
                method: endpoint.method.to_string(),
                result: self.probe_endpoint(endpoint, token),
            })
            .collect()
    }

    /// Log in, then probe only if the login produced a token
    pub fn check_account(&self, account: &TestAccount) -> AccountReport {
        let login = self.login(account);
        let endpoints = login
            .usable_token()
            .map(|token| self.probe_all_endpoints(account, token));

        let entry = AccountReport {
            email: account.email.clone(),
            role_name: account.role_name.clone(),
            login,
            endpoints,
        };
        if self.console {
            print!("{}", output::render_account_detail(&entry));
        }
        entry
    }

    /// Check every account; the report keeps the order of `accounts`
    pub fn run(&self, accounts: &[TestAccount]) -> Report {
        tracing::info!(accounts = accounts.len(), mode = %self.mode, base_url = %self.base_url, "starting run");
        let mut report = Report::default();

        match self.mode {
            RunMode::Sequential { pace } => {
                for (i, account) in accounts.iter().enumerate() {
                    if i > 0 && !pace.is_zero() {
                        std::thread::sleep(pace);
                    }
                    report.push(self.check_account(account));
                }
            }
            RunMode::Parallel => {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = accounts
                        .iter()
                        .map(|account| scope.spawn(move || self.check_account(account)))
                        .collect();

                    for (account, handle) in accounts.iter().zip(handles) {
                        let entry = handle.join().unwrap_or_else(|_| AccountReport {
                            email: account.email.clone(),
                            role_name: account.role_name.clone(),
                            login: LoginResult::failure(0, "worker thread panicked".to_string(), ""),
                            endpoints: None,
                        });
                        report.push(entry);
                    }
                });
            }
        }

        let summary = report.summary();
        tracing::info!(
            logins = summary.successful_logins,
            endpoints = summary.successful_endpoints,
            total_endpoints = summary.total_endpoints,
            "run finished"
        );
        report
    }
}
