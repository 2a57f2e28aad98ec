//! Output formatting for JSON and text modes
//!
//! The text renderers return strings so the harness can print an account's
//! block in one write, and so tests can inspect them.

use crate::harness::{RunMode, SuccessCriterion};
use crate::report::{AccountReport, Report, Summary, Thresholds, Verdict};
use serde::Serialize;
use std::fmt::Write;

const WIDE: usize = 80;
const NARROW: usize = 60;
const TOKEN_PREVIEW_CHARS: usize = 20;

/// Settings of a run, echoed in the report
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub base_url: String,
    pub criterion: SuccessCriterion,
    #[serde(serialize_with = "serialize_display")]
    pub mode: RunMode,
    pub thresholds: Thresholds,
    pub insecure: bool,
}

fn serialize_display<S: serde::Serializer>(mode: &RunMode, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(mode)
}

/// Machine-readable report for `--json`
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub context: &'a RunContext,
    pub started_at: String,
    pub finished_at: String,
    pub accounts: &'a [AccountReport],
    pub summary: Summary,
    pub login_rate: f64,
    pub endpoint_rate: f64,
    pub verdict: Verdict,
    pub passed: bool,
}

impl<'a> JsonReport<'a> {
    pub fn new(
        context: &'a RunContext,
        report: &'a Report,
        started_at: String,
        finished_at: String,
    ) -> Self {
        let summary = report.summary();
        Self {
            context,
            started_at,
            finished_at,
            accounts: &report.accounts,
            summary,
            login_rate: summary.login_rate(),
            endpoint_rate: summary.endpoint_rate(),
            verdict: summary.verdict(),
            passed: context.thresholds.passed(&summary),
        }
    }
}

fn rule(out: &mut String, ch: char, width: usize) {
    let _ = writeln!(out, "{}", ch.to_string().repeat(width));
}

fn token_preview(token: &str) -> String {
    token.chars().take(TOKEN_PREVIEW_CHARS).collect()
}

/// Banner printed before the first account
pub fn render_banner(context: &RunContext, started_at: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🚀 Starting PTMS API role communication tests");
    let _ = writeln!(out, "🕐 {}", started_at);
    let _ = writeln!(out, "🌐 {}", context.base_url);
    if context.insecure {
        let _ = writeln!(out, "⚠️  TLS certificate verification is DISABLED (--insecure)");
    }
    rule(&mut out, '=', WIDE);
    out
}

/// Per-account detail: login outcome, then every probe
pub fn render_account_detail(entry: &AccountReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    rule(&mut out, '=', WIDE);
    let _ = writeln!(out, "🧪 ACCOUNT: {} (role: {})", entry.email, entry.role_name);
    rule(&mut out, '=', WIDE);

    let login = &entry.login;
    let _ = writeln!(out, "🔐 Login for {}...", entry.email);
    if login.succeeded {
        let _ = writeln!(out, "✅ Login succeeded");
        if let Some(token) = &login.token {
            let _ = writeln!(out, "   Token: {}...", token_preview(token));
        }
        if let Some(user) = &login.user {
            let _ = writeln!(out, "   User: {}", user.display_name());
            let _ = writeln!(
                out,
                "   Department: {}",
                user.department.as_deref().unwrap_or_default()
            );
            let _ = writeln!(
                out,
                "   Position: {}",
                user.position.as_deref().unwrap_or_default()
            );
        }
        if let Some(check) = login.role_check {
            if check.matches() {
                let _ = writeln!(out, "   Role: {} as expected", check.actual);
            } else {
                let _ = writeln!(
                    out,
                    "   ⚠️  Role mismatch: expected {}, server reported {}",
                    check.expected, check.actual
                );
            }
        }
    } else {
        let _ = writeln!(out, "❌ Login failed");
        let _ = writeln!(out, "   HTTP code: {}", login.http_status);
        let _ = writeln!(out, "   Error: {}", login.error.as_deref().unwrap_or_default());
        if let Some(body) = &login.raw_body {
            let _ = writeln!(out, "   Response: {}", body);
        }
    }

    if let Some(endpoints) = &entry.endpoints {
        let _ = writeln!(
            out,
            "\n🧪 Endpoints for {} (role: {})",
            entry.email, entry.role_name
        );
        rule(&mut out, '-', NARROW);
        for probe in endpoints {
            let result = &probe.result;
            let _ = writeln!(out, "   📡 {} ({})...", probe.endpoint, probe.method);
            if result.succeeded {
                let _ = writeln!(out, "     ✅ Success (HTTP {})", result.http_status);
                if let Some(flag) = result.body_success {
                    let _ = writeln!(out, "     📊 success: {}", flag);
                }
            } else {
                let _ = writeln!(out, "     ❌ Failed (HTTP {})", result.http_status);
                if let Some(error) = &result.error {
                    let _ = writeln!(out, "     🔴 Error: {}", error);
                }
                if let Some(body) = &result.raw_body {
                    let _ = writeln!(out, "     📄 Response: {}", body);
                }
            }
        }
    }
    out
}

/// Verdict line for the summary
pub fn verdict_line(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Excellent => "🎉 EXCELLENT! API communication works for every role.",
        Verdict::Acceptable => "⚠️  ACCEPTABLE CONCERNS: a few minor problems were detected.",
        Verdict::SignificantProblems => "🚨 WARNING! Significant problems were detected.",
    }
}

/// Remediation hints for rates below 100%
pub fn recommendations(summary: &Summary) -> Vec<&'static str> {
    let mut hints = Vec::new();
    if summary.login_rate() < 100.0 {
        hints.push("Check the test user accounts");
    }
    if summary.endpoint_rate() < 100.0 {
        hints.push("Check the role permissions");
        hints.push("Check the API configuration");
    }
    if summary.role_mismatches > 0 {
        hints.push("Check the role assigned to each test account");
    }
    hints
}

/// Final report: per-account recap, counters, rates, verdict and hints
pub fn render_report(report: &Report, context: &RunContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    rule(&mut out, '=', WIDE);
    let _ = writeln!(out, "📋 TEST REPORT - PTMS API role communication");
    rule(&mut out, '=', WIDE);
    let _ = writeln!(out, "   Base URL: {}", context.base_url);
    let _ = writeln!(out, "   Success criterion: {}", context.criterion);
    let _ = writeln!(out, "   Mode: {}", context.mode);

    for entry in &report.accounts {
        let _ = writeln!(out, "\n👤 Account: {}", entry.email);
        let _ = writeln!(out, "   Role: {}", entry.role_name);
        if entry.login.succeeded {
            let _ = writeln!(out, "   🔐 Login: ✅ OK");
            if let Some(check) = entry.login.role_check.filter(|c| !c.matches()) {
                let _ = writeln!(
                    out,
                    "   🎭 Role: ⚠️  expected {}, got {}",
                    check.expected, check.actual
                );
            }
            for probe in entry.endpoints.iter().flatten() {
                if probe.result.succeeded {
                    let _ = writeln!(out, "   📡 {}: ✅ OK", probe.endpoint);
                } else {
                    let _ = writeln!(
                        out,
                        "   📡 {}: ❌ Failed (HTTP {})",
                        probe.endpoint, probe.result.http_status
                    );
                }
            }
        } else {
            let _ = writeln!(out, "   🔐 Login: ❌ Failed");
            let _ = writeln!(
                out,
                "   📄 Error: {}",
                entry.login.error.as_deref().unwrap_or_default()
            );
        }
    }

    let summary = report.summary();
    let _ = writeln!(out);
    rule(&mut out, '-', WIDE);
    let _ = writeln!(out, "📊 OVERALL SUMMARY:");
    let _ = writeln!(out, "   👥 Accounts tested: {}", summary.total_accounts);
    let _ = writeln!(
        out,
        "   🔐 Successful logins: {}/{}",
        summary.successful_logins, summary.total_accounts
    );
    let _ = writeln!(out, "   📡 Endpoints tested: {}", summary.total_endpoints);
    let _ = writeln!(
        out,
        "   ✅ Successful endpoints: {}/{}",
        summary.successful_endpoints, summary.total_endpoints
    );
    if summary.role_mismatches > 0 {
        let _ = writeln!(out, "   🎭 Role mismatches: {}", summary.role_mismatches);
    }
    let _ = writeln!(out, "   📈 Login success rate: {:.1}%", summary.login_rate());
    let _ = writeln!(
        out,
        "   📈 Endpoint success rate: {:.1}%",
        summary.endpoint_rate()
    );

    let _ = writeln!(out, "\n{}", verdict_line(summary.verdict()));

    let thresholds = &context.thresholds;
    let _ = writeln!(
        out,
        "🎯 Thresholds: logins >= {:.1}%, endpoints >= {:.1}% -> {}",
        thresholds.min_login_rate,
        thresholds.min_endpoint_rate,
        if thresholds.passed(&summary) { "PASSED" } else { "FAILED" }
    );

    let _ = writeln!(out, "\n💡 Recommendations:");
    for hint in recommendations(&summary) {
        let _ = writeln!(out, "   - {}", hint);
    }
    rule(&mut out, '=', WIDE);
    out
}

/// Print JSON output to stdout
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing JSON: {}", e);
            std::process::exit(2);
        }
    }
}
