//! Run results and aggregate statistics

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// User profile returned by a successful login
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    /// Explicit role identifier, when the server sends one
    #[serde(
        default,
        deserialize_with = "lenient_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub role_id: Option<u32>,
    /// User type column (1=ADMIN, 2=MANAGER, ...)
    #[serde(
        default,
        rename = "type",
        deserialize_with = "lenient_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_type: Option<u32>,
}

// PHP backends send numeric columns as either numbers or strings
fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl UserProfile {
    /// Role reported by the server, preferring `role_id` over `type`
    pub fn reported_role(&self) -> Option<u32> {
        self.role_id.or(self.user_type)
    }

    pub fn display_name(&self) -> String {
        let first = self.firstname.as_deref().unwrap_or_default();
        let last = self.lastname.as_deref().unwrap_or_default();
        format!("{} {}", first, last).trim().to_string()
    }
}

/// Expected vs reported role for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleCheck {
    pub expected: u32,
    pub actual: u32,
}

impl RoleCheck {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// Result of logging in one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResult {
    pub succeeded: bool,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw body of a failed login, kept for the console detail
    #[serde(skip)]
    pub raw_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_check: Option<RoleCheck>,
}

impl LoginResult {
    pub fn success(http_status: u16, token: String, user: Option<UserProfile>) -> Self {
        Self {
            succeeded: true,
            http_status,
            token: Some(token),
            user,
            error: None,
            raw_body: None,
            role_check: None,
        }
    }

    pub fn failure(http_status: u16, error: String, raw_body: &str) -> Self {
        Self {
            succeeded: false,
            http_status,
            token: None,
            user: None,
            error: Some(error),
            raw_body: (!raw_body.is_empty()).then(|| raw_body.to_string()),
            role_check: None,
        }
    }

    pub fn with_expected_role(mut self, expected: Option<u32>) -> Self {
        let actual = self.user.as_ref().and_then(UserProfile::reported_role);
        self.role_check = match (expected, actual) {
            (Some(expected), Some(actual)) => Some(RoleCheck { expected, actual }),
            _ => None,
        };
        self
    }

    /// Token to probe with, present only after a successful login
    pub fn usable_token(&self) -> Option<&str> {
        if !self.succeeded {
            return None;
        }
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Result of probing one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointResult {
    pub succeeded: bool,
    pub http_status: u16,
    /// The body's own `success` flag, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw body of a failed probe, kept for the console detail
    #[serde(skip)]
    pub raw_body: Option<String>,
}

/// One endpoint's result in report order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointEntry {
    pub endpoint: String,
    pub method: String,
    #[serde(flatten)]
    pub result: EndpointResult,
}

/// Everything recorded for one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReport {
    pub email: String,
    pub role_name: String,
    pub login: LoginResult,
    /// `None` when the login failed and no probe ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<EndpointEntry>>,
}

impl AccountReport {
    pub fn endpoint(&self, path: &str) -> Option<&EndpointResult> {
        self.endpoints
            .as_ref()?
            .iter()
            .find(|e| e.endpoint == path)
            .map(|e| &e.result)
    }
}

/// Results of a whole run, in account order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub accounts: Vec<AccountReport>,
}

impl Report {
    pub fn push(&mut self, account: AccountReport) {
        self.accounts.push(account);
    }

    pub fn get(&self, email: &str) -> Option<&AccountReport> {
        self.accounts.iter().find(|a| a.email == email)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for account in &self.accounts {
            summary.total_accounts += 1;
            if account.login.succeeded {
                summary.successful_logins += 1;
            }
            if account.login.role_check.is_some_and(|c| !c.matches()) {
                summary.role_mismatches += 1;
            }
            for entry in account.endpoints.iter().flatten() {
                summary.total_endpoints += 1;
                if entry.result.succeeded {
                    summary.successful_endpoints += 1;
                }
            }
        }
        summary
    }
}

/// Aggregate counters over a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_accounts: usize,
    pub successful_logins: usize,
    pub total_endpoints: usize,
    pub successful_endpoints: usize,
    pub role_mismatches: usize,
}

impl Summary {
    pub fn login_rate(&self) -> f64 {
        percentage(self.successful_logins, self.total_accounts)
    }

    pub fn endpoint_rate(&self) -> f64 {
        percentage(self.successful_endpoints, self.total_endpoints)
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_rates(self.login_rate(), self.endpoint_rate())
    }
}

/// Percentage rounded to one decimal place, 0 when there is nothing to count
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = part as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

/// Overall assessment of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Excellent,
    Acceptable,
    SignificantProblems,
}

impl Verdict {
    pub fn from_rates(login_rate: f64, endpoint_rate: f64) -> Self {
        if login_rate >= 90.0 && endpoint_rate >= 90.0 {
            Verdict::Excellent
        } else if login_rate >= 70.0 && endpoint_rate >= 70.0 {
            Verdict::Acceptable
        } else {
            Verdict::SignificantProblems
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Excellent => write!(f, "excellent"),
            Verdict::Acceptable => write!(f, "acceptable concerns"),
            Verdict::SignificantProblems => write!(f, "significant problems"),
        }
    }
}

/// Minimum rates a run must reach to exit successfully
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub min_login_rate: f64,
    pub min_endpoint_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_login_rate: 90.0,
            min_endpoint_rate: 90.0,
        }
    }
}

impl Thresholds {
    pub fn passed(&self, summary: &Summary) -> bool {
        summary.login_rate() >= self.min_login_rate
            && summary.endpoint_rate() >= self.min_endpoint_rate
    }
}
