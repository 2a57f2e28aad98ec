use clap::Parser;
use rolecheck::cli::Cli;
use rolecheck::config::{Config, ConfigError};
use rolecheck::harness::TestHarness;
use rolecheck::http::UreqTransport;
use rolecheck::logging;
use rolecheck::output::{self, JsonReport, RunContext};
use std::io::Write;

/// A success rate fell below its threshold
const EXIT_BELOW_THRESHOLD: i32 = 1;
/// Configuration or usage error, nothing was checked
const EXIT_CONFIG_ERROR: i32 = 2;

fn main() {
    let cli = Cli::parse();
    logging::init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let passed = run_checks(&config, cli.json);
    let _ = std::io::stdout().flush();
    if !passed {
        std::process::exit(EXIT_BELOW_THRESHOLD);
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(cli.overrides());
    config.validate()?;
    Ok(config)
}

/// Run every account and print the report; returns whether thresholds were met
fn run_checks(config: &Config, json_output: bool) -> bool {
    if config.insecure {
        eprintln!(
            "WARNING: TLS certificate verification is disabled (--insecure). \
             Only use this against test servers you control."
        );
    }

    let transport = UreqTransport::new(config.transport_options());
    let harness = TestHarness::new(&config.base_url, transport)
        .with_endpoints(config.endpoint_list())
        .with_criterion(config.success_criterion)
        .with_mode(config.run_mode())
        .with_console(!json_output);

    let context = RunContext {
        base_url: harness.base_url().to_string(),
        criterion: harness.criterion(),
        mode: harness.mode(),
        thresholds: config.thresholds(),
        insecure: config.insecure,
    };

    let started_at = timestamp();
    if !json_output {
        print!("{}", output::render_banner(&context, &started_at));
    }

    let report = harness.run(&config.accounts);
    let finished_at = timestamp();
    let passed = context.thresholds.passed(&report.summary());

    if json_output {
        output::print_json(&JsonReport::new(&context, &report, started_at, finished_at));
    } else {
        print!("{}", output::render_report(&report, &context));
        println!("\n🏁 Tests finished at {}", finished_at);
    }

    passed
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
