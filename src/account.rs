//! Test account fixtures
//!
//! An account is one credential set that drives a login followed by the
//! endpoint probes. The built-in fixtures mirror the four roles seeded on the
//! PTMS test server; the list can be replaced from the config file or with
//! repeated `--account` flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixture credential set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAccount {
    pub email: String,
    pub password: String,
    /// Role identifier the server is expected to report for this user
    #[serde(default)]
    pub expected_role_id: Option<u32>,
    /// Human-readable role label used in the report
    #[serde(default = "default_role_name")]
    pub role_name: String,
}

fn default_role_name() -> String {
    "UNKNOWN".to_string()
}

impl TestAccount {
    pub fn new(email: &str, password: &str, expected_role_id: u32, role_name: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            expected_role_id: Some(expected_role_id),
            role_name: role_name.to_string(),
        }
    }
}

impl fmt::Display for TestAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.email, self.role_name)
    }
}

/// Parses `email:password[:role_id[:role_name]]`
///
/// The password may itself contain `:`. Role fields are taken from the right,
/// and only when the role id segment is numeric or empty.
impl FromStr for TestAccount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((email, rest)) = s.split_once(':') else {
            return Err(format!(
                "Invalid account '{}'. Expected: <email>:<password>[:<role_id>[:<role_name>]]",
                s
            ));
        };
        let email = email.trim();

        if email.is_empty() || !email.contains('@') {
            return Err(format!("Invalid email in account '{}'", s));
        }

        let (password, role_id, role_name) = split_role_fields(rest);
        if password.is_empty() {
            return Err(format!("Password cannot be empty for '{}'", email));
        }

        let expected_role_id = match role_id {
            Some(id) if !id.is_empty() => Some(
                id.parse::<u32>()
                    .map_err(|_| format!("Invalid role id '{}' for '{}'", id, email))?,
            ),
            _ => None,
        };

        let role_name = role_name
            .filter(|name| !name.is_empty())
            .map(|name| name.to_uppercase())
            .unwrap_or_else(default_role_name);

        Ok(TestAccount {
            email: email.to_string(),
            password: password.to_string(),
            expected_role_id,
            role_name,
        })
    }
}

fn is_role_id(segment: &str) -> bool {
    segment.chars().all(|c| c.is_ascii_digit())
}

/// Splits `password[:role_id[:role_name]]` into its parts
fn split_role_fields(rest: &str) -> (&str, Option<&str>, Option<&str>) {
    let with_name = rest
        .rsplit_once(':')
        .and_then(|(head, role_name)| head.rsplit_once(':').map(|(pw, id)| (pw, id, role_name)))
        .filter(|(_, role_id, _)| is_role_id(role_id));
    if let Some((password, role_id, role_name)) = with_name {
        return (password, Some(role_id), Some(role_name));
    }

    match rest.rsplit_once(':') {
        Some((password, role_id)) if is_role_id(role_id) => (password, Some(role_id), None),
        _ => (rest, None, None),
    }
}

/// The accounts seeded on the PTMS test server, one per role
pub fn default_accounts() -> Vec<TestAccount> {
    vec![
        TestAccount::new("admin@ptms.com", "admin123", 1, "ADMIN"),
        TestAccount::new("manager@ptms.com", "manager123", 2, "MANAGER"),
        TestAccount::new("employee@ptms.com", "employee123", 3, "EMPLOYEE"),
        TestAccount::new("viewer@ptms.com", "viewer123", 4, "VIEWER"),
    ]
}
