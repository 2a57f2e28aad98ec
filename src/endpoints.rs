//! Endpoint catalogue
//!
//! The endpoints probed for every account once it has a token. The default
//! list covers the calls the mobile client makes after login; the config file
//! may replace it.

use crate::http::Method;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Login endpoint, relative to the base URL
pub const LOGIN_PATH: &str = "login.php";

/// Optional status endpoint
pub const SYSTEM_STATUS_PATH: &str = "system/status";

/// Placeholder in a configured body replaced with the run date
pub const TODAY_PLACEHOLDER: &str = "{today}";

/// One authenticated endpoint to probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

fn default_method() -> Method {
    Method::Get
}

impl EndpointSpec {
    pub fn get(path: &str) -> Self {
        Self {
            path: path.to_string(),
            method: Method::Get,
            body: None,
        }
    }

    pub fn post(path: &str, body: serde_json::Value) -> Self {
        Self {
            path: path.to_string(),
            method: Method::Post,
            body: Some(body),
        }
    }

    /// Body with every `{today}` string replaced by `date` (YYYY-MM-DD)
    pub fn body_for(&self, date: NaiveDate) -> Option<serde_json::Value> {
        self.body.as_ref().map(|body| substitute_today(body, date))
    }
}

fn substitute_today(value: &serde_json::Value, date: NaiveDate) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(s) if s == TODAY_PLACEHOLDER => Value::String(format_date(date)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_today(v, date)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_today(v, date)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Synthetic time entry posted by every account
pub fn time_entry_payload() -> serde_json::Value {
    serde_json::json!({
        "project_id": 1,
        "work_type_id": 1,
        "date": TODAY_PLACEHOLDER,
        "hours": 8.0,
        "description": "Test API Android",
    })
}

/// Projects, work types, reports, profile, then a time entry
pub fn default_endpoints() -> Vec<EndpointSpec> {
    vec![
        EndpointSpec::get("projects.php"),
        EndpointSpec::get("work-types.php"),
        EndpointSpec::get("reports.php"),
        EndpointSpec::get("profile.php"),
        EndpointSpec::post("time-entry.php", time_entry_payload()),
    ]
}
