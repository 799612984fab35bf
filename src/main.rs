//! chain-regress CLI
//!
//! Runs LoopChainIR regression tests and reports one result per file.

use chain_regress::*;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "chain-regress",
    version,
    about = "Generate and run ordering verifiers for LoopChainIR regression tests"
)]
struct Cli {
    /// Test files to run
    #[arg(required_unless_present = "print_config_schema")]
    files: Vec<PathBuf>,

    /// Keep every test workspace
    #[arg(long)]
    save_env: bool,

    /// Keep the workspace of failed tests
    #[arg(long)]
    save_env_on_fail: bool,

    /// Write the log of passing tests too
    #[arg(long)]
    save_log: bool,

    /// Directory with template overrides
    #[arg(long, value_name = "DIR")]
    resources: Option<PathBuf>,

    /// YAML runner configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// LoopChainIR checkout the generated Makefiles build against
    #[arg(long, value_name = "DIR")]
    project_root: Option<PathBuf>,

    /// Number of tests run at once
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Print the JSON schema of the configuration file and exit
    #[arg(long)]
    print_config_schema: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.print_config_schema {
        println!("{}", RunnerConfig::schema_json()?);
        return Ok(());
    }

    let config = load_config(&cli)?;
    tracing::debug!(?config, "configuration");

    let templates = match &config.resources_dir {
        Some(dir) => TemplateSet::with_overrides(dir)?,
        None => TemplateSet::embedded(),
    };
    let toolchain = MakeToolchain::new(&config.build_tool);

    let report = SuiteRunner::new(&config, &templates, &toolchain).run(&cli.files);
    tracing::info!(passed = report.passed(), failed = report.failed(), "suite finished");

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

/// Config file first, then CLI flags on top
fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    if cli.save_env {
        config.retention = Retention::Always;
    } else if cli.save_env_on_fail {
        config.retention = Retention::OnFailure;
    }
    if cli.save_log {
        config.save_log = true;
    }
    if let Some(dir) = &cli.resources {
        config.resources_dir = Some(dir.clone());
    }
    if let Some(root) = &cli.project_root {
        config.project_root = root.clone();
    }
    if let Some(jobs) = cli.jobs {
        if jobs == 0 {
            return Err("--jobs must be at least 1".into());
        }
        config.jobs = jobs;
    }

    Ok(config)
}
