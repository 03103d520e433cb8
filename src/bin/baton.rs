//! baton CLI - runs API test scenarios.

use anyhow::{anyhow, Context, Result};
use baton::report::{self, ReportFormat};
use baton::{DefaultScenarioRunner, RunConfig, Scenario, ScenarioLoader, ScenarioRunner};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs API test scenarios, threading response values between steps.
#[derive(Parser, Debug)]
#[command(name = "baton", version, about)]
struct Cli {
    /// Scenario file or directory path.
    #[arg(short = 'p', long = "path")]
    scenario_path: Option<String>,

    /// Filter scenarios by name (partial match).
    #[arg(short = 'f', long = "filter")]
    scenario_filter: Option<String>,

    /// Header added to every request, as "Name: value". Repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Initial variable, as "key=value". Repeatable.
    #[arg(short = 'V', long = "var")]
    variables: Vec<String>,

    /// Request timeout in seconds.
    #[arg(short = 't', long = "timeout", env = "BATON_TIMEOUT")]
    timeout: Option<u64>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Directory to save report files.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<String>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn build_run_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = RunConfig {
        timeout: cli.timeout,
        ..RunConfig::default()
    };
    for header in &cli.headers {
        config.add_header(header)?;
    }
    for variable in &cli.variables {
        config.add_variable(variable)?;
    }
    Ok(config)
}

fn load_scenarios(scenario_path: Option<&str>) -> Result<Vec<Scenario>> {
    let mut loader = ScenarioLoader::new();
    if Path::new("tests/scenarios").is_dir() {
        loader.add_path("tests/scenarios");
    }

    let scenarios = match scenario_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if path.is_file() {
                vec![loader
                    .load_scenario(&path)
                    .context(format!("Failed to load scenario: {}", path.display()))?]
            } else if path.is_dir() {
                loader.load_scenarios_from_dir(&path).context(format!(
                    "Failed to load scenarios from directory: {}",
                    path.display()
                ))?
            } else {
                return Err(anyhow!("Path does not exist: {}", path.display()));
            }
        }
        None => loader.load_all_scenarios()?,
    };

    if scenarios.is_empty() {
        return Err(anyhow!("No scenarios found"));
    }
    Ok(scenarios)
}

async fn run_all(
    scenarios: Vec<Scenario>,
    filter: Option<&str>,
    config: &RunConfig,
    verbose: bool,
    report_dir: Option<&Path>,
    report_format: ReportFormat,
) -> Result<bool> {
    let filtered: Vec<Scenario> = match filter {
        Some(filter) => scenarios
            .into_iter()
            .filter(|s| s.name.to_lowercase().contains(&filter.to_lowercase()))
            .collect(),
        None => scenarios,
    };
    if filtered.is_empty() {
        return Err(anyhow!("No scenarios matching the filter were found"));
    }

    let runner = DefaultScenarioRunner::from_config(config);
    let total_start = Instant::now();
    let total = filtered.len();
    let mut passed = 0;

    info!("Running {} scenario(s)...", total);
    for (idx, scenario) in filtered.iter().enumerate() {
        info!("Scenario {}/{}: {}", idx + 1, total, scenario.name);
        let result = runner.run(scenario).await;
        report::print_result(&result, verbose);

        if let Some(dir) = report_dir {
            match report::save_report(&result, dir, report_format) {
                Ok(path) => info!("Report saved: {}", path.display()),
                Err(e) => error!("Failed to save report: {}", e),
            }
        }

        if result.success {
            passed += 1;
        }
    }

    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Duration: {} ms",
        total,
        passed,
        total - passed,
        total_start.elapsed().as_millis()
    );

    Ok(passed == total)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!("baton {}", baton::VERSION);

    let config = build_run_config(&cli)?;
    let scenarios = load_scenarios(cli.scenario_path.as_deref())?;
    let report_dir = cli.report_dir.as_deref().map(Path::new);

    let success = run_all(
        scenarios,
        cli.scenario_filter.as_deref(),
        &config,
        cli.verbose,
        report_dir,
        cli.report_format,
    )
    .await?;

    if !success {
        exit(1);
    }
    Ok(())
}
