//! ops-health command line
//!
//! ```text
//! ops-health run [--parallel|--sequential] [--auto-repair] [--live] [--json] [--notify] [--fail-on-critical]
//! ops-health tools
//! ops-health config check|show
//! ```
//!
//! Secrets come from the environment (or a `.env` file) and are read once here.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use ops_health::config::{defaults, OpsConfig};
use ops_health::notify::{notify_if_needed, SlackWebhookNotifier};
use ops_health::{build_context, default_registry, Credentials, Orchestrator, Severity};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "ops-health")]
#[command(about = "Operational health checks and auto-repair for service dependencies")]
#[command(version)]
struct CliArgs {
    /// Configuration file (falls back to ./ops_health.toml, then built-in defaults)
    #[arg(long, global = true, env = defaults::CONFIG_ENV_VAR, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every health check and optionally repair what failed
    Run(RunArgs),
    /// List registered tools with their input schemas
    Tools,
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Dispatch checks concurrently
    #[arg(long, conflicts_with = "sequential")]
    parallel: bool,

    /// Run checks one at a time
    #[arg(long)]
    sequential: bool,

    /// Queue repairs for Degraded and Critical checks
    #[arg(long)]
    auto_repair: bool,

    /// Let repairs change things (otherwise they only describe their steps)
    #[arg(long, requires = "auto_repair")]
    live: bool,

    /// Print the run summary as JSON instead of the markdown report
    #[arg(long)]
    json: bool,

    /// Post the report to OPS_HEALTH_WEBHOOK_URL when the run is bad enough
    #[arg(long)]
    notify: bool,

    /// Exit with status 2 when any check is Critical
    #[arg(long)]
    fail_on_critical: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Load and validate the configuration, reporting every problem
    Check,
    /// Print the effective configuration as TOML
    Show,
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn credentials_from_env() -> Credentials {
    Credentials {
        database_url: env_secret("DATABASE_URL"),
        slack_bot_token: env_secret("SLACK_BOT_TOKEN"),
        speech_api_key: env_secret("SPEECH_API_KEY"),
        llm_api_key: env_secret("LLM_API_KEY"),
        storage_service_key: env_secret("STORAGE_SERVICE_KEY"),
    }
}

/// Explicit path first (flag or env), then the conventional file, then defaults.
fn load_config(explicit: Option<&Path>) -> Result<OpsConfig> {
    OpsConfig::load(explicit).context("loading configuration")
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: OpsConfig, args: &RunArgs) -> Result<i32> {
    let mut settings = config.orchestrator.clone();
    if args.parallel {
        settings.enable_parallel_checks = true;
    }
    if args.sequential {
        settings.enable_parallel_checks = false;
    }
    if args.auto_repair {
        settings.enable_auto_repair = true;
    }
    if args.live {
        settings.dry_run = false;
    }
    if settings.enable_auto_repair && !settings.dry_run {
        warn!("Live repairs enabled: repair tools will modify external systems");
    }

    let config = Arc::new(config);
    let registry = Arc::new(default_registry().context("building tool registry")?);
    let ctx = Arc::new(build_context(Arc::clone(&config), &credentials_from_env()));
    let mut orchestrator = Orchestrator::new(registry, ctx).with_settings(settings);

    let summary = orchestrator.execute().await;
    let report = orchestrator.generate_report(&summary);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary).context("serializing summary")?);
    } else {
        print!("{report}");
    }

    if args.notify {
        match env_secret("OPS_HEALTH_WEBHOOK_URL") {
            Some(url) => {
                let notifier = SlackWebhookNotifier::new(&url).context("building webhook client")?;
                if let Err(e) =
                    notify_if_needed(&notifier, &summary, &report, config.notify.min_severity).await
                {
                    warn!(error = %e, "Report delivery failed");
                }
            }
            None => warn!("--notify given but OPS_HEALTH_WEBHOOK_URL is not set"),
        }
    }

    if args.fail_on_critical && summary.overall() == Severity::Critical {
        return Ok(2);
    }
    Ok(0)
}

fn list_tools() -> Result<()> {
    let registry = default_registry().context("building tool registry")?;
    let descriptors = registry.descriptors();
    println!(
        "{}",
        serde_json::to_string_pretty(&descriptors).context("serializing tool descriptors")?
    );
    Ok(())
}

fn config_command(explicit: Option<&Path>, action: &ConfigAction) -> Result<()> {
    let config = load_config(explicit)?;
    match action {
        ConfigAction::Check => {
            println!("configuration ok");
        }
        ConfigAction::Show => {
            print!("{}", config.to_toml().context("rendering config")?);
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let dotenv = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_logging(args.log_json);
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    match &args.command {
        Command::Run(run_args) => {
            let config = load_config(args.config.as_deref())?;
            let code = run(config, run_args).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::Tools => list_tools()?,
        Command::Config { action } => config_command(args.config.as_deref(), action)?,
    }
    Ok(())
}
