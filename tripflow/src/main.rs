//! Tripflow command line.
//!
//! Loads configuration from the environment, runs the planner and prints
//! progress as it happens.

use anyhow::{bail, Context as _, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tripflow::clients::{fallback_model, OpenAiCompatibleBackend};
use tripflow::config::TripflowConfig;
use tripflow::core::{BudgetTier, Preferences, ProgressEvent, RunStatus, TravelStyle, Travelers, TripRequest};
use tripflow::events::NoOpProgressSink;
use tripflow::observability::{init_tracing, LogFormat};
use tripflow::pipeline::PipelineController;
use tripflow::report::{FileReportStore, ReportStore};

#[derive(Debug, Parser)]
#[command(name = "tripflow", version, about = "Plan a trip with search-grounded reasoning stages")]
struct Cli {
    /// Log output format (pretty or json). Overrides TRIPFLOW_LOG_FORMAT.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Reports directory. Overrides TRIPFLOW_REPORTS_DIR.
    #[arg(long, global = true)]
    reports_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a trip and store the report
    Plan(PlanArgs),
    /// Browse stored reports
    Reports {
        #[command(subcommand)]
        command: ReportsCommand,
    },
    /// Check credentials, the reports directory and the reasoning model
    Check,
}

#[derive(Debug, Subcommand)]
enum ReportsCommand {
    /// List stored reports, newest first
    List,
    /// Print one report
    Show {
        /// Report key as printed by `list`
        key: String,
    },
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Departure city
    #[arg(long)]
    origin: String,

    /// Destination city
    #[arg(long)]
    destination: String,

    /// First day of the trip (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the trip (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// budget, mid-range or luxury
    #[arg(long, default_value = "mid-range")]
    budget: BudgetTier,

    /// relaxed, adventure, cultural, romantic or business
    #[arg(long, default_value = "relaxed")]
    style: TravelStyle,

    #[arg(long, default_value_t = 1)]
    adults: u32,

    #[arg(long, default_value_t = 0)]
    children: u32,

    /// Comma-separated interests
    #[arg(long, value_delimiter = ',')]
    interests: Vec<String>,

    /// Comma-separated dietary restrictions
    #[arg(long, value_delimiter = ',')]
    dietary: Vec<String>,

    /// Places the plan must include
    #[arg(long = "must-see", value_delimiter = ',')]
    must_see: Vec<String>,

    /// Things to keep out of the plan
    #[arg(long, value_delimiter = ',')]
    avoid: Vec<String>,

    /// Mobility or accessibility needs
    #[arg(long)]
    mobility: Option<String>,
}

impl PlanArgs {
    fn into_request(self) -> TripRequest {
        TripRequest::new(self.origin, self.destination, self.start, self.end)
            .with_budget(self.budget)
            .with_style(self.style)
            .with_travelers(Travelers {
                adults: self.adults,
                children: self.children,
            })
            .with_preferences(Preferences {
                interests: self.interests,
                dietary_restrictions: self.dietary,
                mobility_needs: self.mobility,
                must_see: self.must_see,
                avoid: self.avoid,
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TripflowConfig::from_env().context("Failed to load configuration")?;
    if let Some(dir) = cli.reports_dir {
        config = config.with_reports_dir(dir);
    }
    init_tracing(cli.log_format.unwrap_or(config.log_format));

    info!(model = %config.reasoning.model, reports_dir = %config.reports_dir.display(), "Tripflow loaded config");

    match cli.command {
        Command::Plan(args) => cmd_plan(&config, args).await,
        Command::Reports { command } => match command {
            ReportsCommand::List => cmd_list(&config).await,
            ReportsCommand::Show { key } => cmd_show(&config, &key).await,
        },
        Command::Check => cmd_check(&config).await,
    }
}

/// Runs one plan, printing progress until the run ends. Ctrl-C cancels.
async fn cmd_plan(config: &TripflowConfig, args: PlanArgs) -> Result<()> {
    let controller = PipelineController::from_config(config)?;
    let handle = controller.spawn(args.into_request(), NoOpProgressSink)?;
    let mut stream = handle.subscribe();

    println!("Planning run {}", handle.id());
    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(event) => {
                    print_event(&event);
                    if event.kind.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_cancel_requested() => {
                warn!(run_id = %handle.id(), "Interrupted, cancelling run");
                handle.cancel("interrupted by user");
            }
        }
    }

    let run = handle.wait().await;
    match run.status {
        RunStatus::Completed => {
            let report = controller.report_for(run.id).await?;
            println!();
            println!("{report}");
            if let Some(key) = &run.report_key {
                println!("Saved as {key}");
            }
            Ok(())
        }
        RunStatus::Cancelled => {
            println!("Run cancelled");
            Ok(())
        }
        status => {
            let reason = run.failure_reason.as_deref().unwrap_or("no reason recorded");
            bail!("run ended {status}: {reason}")
        }
    }
}

fn print_event(event: &ProgressEvent) {
    let stage = event.stage.as_deref().unwrap_or("run");
    match &event.message {
        Some(message) => println!("[{:>3}] {stage:<24} {:<10} {message}", event.seq, event.kind.as_str()),
        None => println!("[{:>3}] {stage:<24} {}", event.seq, event.kind.as_str()),
    }
}

async fn cmd_list(config: &TripflowConfig) -> Result<()> {
    let store = FileReportStore::new(&config.reports_dir);
    let keys = store.list().await?;
    if keys.is_empty() {
        println!("No reports in {}", store.dir().display());
    }
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

async fn cmd_show(config: &TripflowConfig, key: &str) -> Result<()> {
    let store = FileReportStore::new(&config.reports_dir);
    let text = store
        .read(key)
        .await
        .with_context(|| format!("Failed to read report {key}"))?;
    println!("{text}");
    Ok(())
}

async fn cmd_check(config: &TripflowConfig) -> Result<()> {
    let missing = config.missing_credentials();
    for name in &missing {
        println!("missing credential: {name}");
    }

    let store = FileReportStore::new(&config.reports_dir);
    let writable = store.check_writable().await;
    match &writable {
        Ok(()) => println!("reports directory {} is writable", store.dir().display()),
        Err(e) => println!("reports directory {} is not writable: {e}", store.dir().display()),
    }

    let model_ready = check_model(config).await;

    if !missing.is_empty() || writable.is_err() || !model_ready {
        bail!("requirements not met");
    }
    println!("all requirements met");
    Ok(())
}

/// Lists the reasoning server's models and looks for the configured one.
async fn check_model(config: &TripflowConfig) -> bool {
    let backend = match OpenAiCompatibleBackend::new(
        &config.reasoning.base_url,
        config.reasoning.api_key.clone(),
        &config.reasoning.model,
        config.reasoning.settings.timeout,
    ) {
        Ok(backend) => backend,
        Err(e) => {
            println!("reasoning server not checked: {e}");
            return false;
        }
    };

    let available = match backend.available_models().await {
        Ok(models) => models,
        Err(e) => {
            println!("reasoning server {} is not reachable: {e}", config.reasoning.base_url);
            return false;
        }
    };
    println!(
        "reasoning server {} is reachable ({} models)",
        config.reasoning.base_url,
        available.len()
    );

    if available.iter().any(|m| *m == config.reasoning.model) {
        println!("model {} is available", config.reasoning.model);
        return true;
    }
    match fallback_model(&available) {
        Some(other) => println!(
            "model {} is not available; set TRIPFLOW_REASONING_MODEL={other} to use a served model",
            config.reasoning.model
        ),
        None => println!("model {} is not available and the server lists no models", config.reasoning.model),
    }
    false
}
