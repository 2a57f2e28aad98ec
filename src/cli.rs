use crate::account::TestAccount;
use crate::config::Overrides;
use crate::harness::SuccessCriterion;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Checks that every test role can log into the PTMS API and reach its endpoints
#[derive(Parser, Debug)]
#[command(name = "rolecheck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, short = 'c', env = "ROLECHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// API base URL, e.g. https://192.168.188.28/api/
    #[arg(long, env = "ROLECHECK_BASE_URL")]
    pub base_url: Option<String>,

    /// Disable TLS certificate and hostname verification
    #[arg(
        long,
        env = "ROLECHECK_INSECURE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub insecure: bool,

    /// Check all accounts concurrently instead of one after another
    #[arg(long)]
    pub parallel: bool,

    /// Pause between accounts in sequential mode, in milliseconds
    #[arg(long, value_name = "MS")]
    pub pace_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Rule deciding whether an endpoint probe passed
    #[arg(long, value_enum)]
    pub success_criterion: Option<SuccessCriterion>,

    /// Exit non-zero when the login success rate is below this percentage
    #[arg(long, value_name = "PERCENT")]
    pub min_login_rate: Option<f64>,

    /// Exit non-zero when the endpoint success rate is below this percentage
    #[arg(long, value_name = "PERCENT")]
    pub min_endpoint_rate: Option<f64>,

    /// Test account: <email>:<password>[:<role_id>[:<role_name>]] (repeatable, replaces the configured list).
    /// The password may contain ':'; trailing fields count as role fields only when the role id is numeric or empty
    #[arg(long = "account", short = 'a', value_name = "ACCOUNT")]
    pub accounts: Vec<TestAccount>,

    /// Also probe the system/status endpoint
    #[arg(long)]
    pub include_system_status: bool,

    /// Print the report as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            insecure: self.insecure,
            timeout_secs: self.timeout_secs,
            pace_ms: self.pace_ms,
            parallel: self.parallel,
            success_criterion: self.success_criterion,
            min_login_rate: self.min_login_rate,
            min_endpoint_rate: self.min_endpoint_rate,
            accounts: self.accounts.clone(),
            include_system_status: self.include_system_status,
        }
    }
}
