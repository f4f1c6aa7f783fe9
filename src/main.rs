use agent_pipelines::api::create_router;
use agent_pipelines::cli::commands::{AgentsCommand, HistoryCommand, RunCommand, ServeCommand, ValidateCommand};
use agent_pipelines::cli::output::*;
use agent_pipelines::cli::{Cli, Command, EXIT_INVALID_PIPELINE, EXIT_RUN_FAILED};
use agent_pipelines::core::spec::{ParallelRequest, DEFAULT_PIPELINE_NAME};
use agent_pipelines::core::{AppConfig, PipelineResult};
use agent_pipelines::persistence::{open_store, PersistenceBackend, RunRecord};
use agent_pipelines::service::PipelineService;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, config).await?,
        Command::Validate(cmd) => validate_pipeline(cmd, &config)?,
        Command::Serve(cmd) => serve(cmd, &config).await?,
        Command::History(cmd) => show_history(cmd, &config).await?,
        Command::Agents(cmd) => list_agents(cmd, &config)?,
    }

    Ok(())
}

fn load_pipeline_file(path: &Path) -> Result<ParallelRequest> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid pipeline file {}", path.display()))
}

async fn open_history(config: &AppConfig) -> Result<Option<Arc<dyn PersistenceBackend>>> {
    match config.history_path() {
        Some(path) => Ok(Some(open_store(&path).await?)),
        None => Ok(None),
    }
}

async fn run_pipeline(cmd: &RunCommand, mut config: AppConfig) -> Result<()> {
    let mut req = load_pipeline_file(&cmd.file)?;
    if let Some(input) = &cmd.input {
        req.input = input.clone();
    }
    if let Some(policy) = cmd.policy {
        config.group_failure_policy = policy.into();
    }

    // History is saved inline so that it lands before the process exits
    let store = if cmd.no_history { None } else { open_history(&config).await? };
    let service = PipelineService::from_config(&config, None);

    let name = req.name.clone().unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string());
    if !cmd.json {
        println!("{} Running pipeline {}", ROCKET, style(&name).bold());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pipeline");
            on_interrupt.cancel();
        }
    });

    let spinner = (!cmd.json).then(|| create_spinner(format!("{} steps", req.step_count())));
    let result = match req.as_sequential() {
        Some(seq) => service.run_sequential_with_cancel(&seq, cancel).await,
        None => service.run_parallel_with_cancel(&req, cancel).await,
    };
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            println!("{} Invalid pipeline: {}", CROSS, style(e).red());
            std::process::exit(EXIT_INVALID_PIPELINE);
        }
    };

    if let Some(store) = store {
        let record = RunRecord::new(result.clone(), req.step_count());
        match store.save_run(&record).await {
            Ok(()) if !cmd.json => println!(
                "{} Run saved to history (ID: {})",
                INFO,
                style(&result.run_id.to_string()[..8]).dim()
            ),
            Ok(()) => {}
            Err(e) => error!("Failed to save run history: {:#}", e),
        }
    }

    print_result(&result, cmd.json)?;

    if !result.ok {
        std::process::exit(EXIT_RUN_FAILED);
    }
    Ok(())
}

fn print_result(result: &PipelineResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    for outcome in &result.steps {
        println!("  {}", format_outcome(outcome));
    }
    println!("\n{}", format_result_summary(result));

    if let Some(output) = result.output.as_ref().filter(|_| result.ok) {
        println!("\n{}", serde_json::to_string_pretty(output)?);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand, config: &AppConfig) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let req = load_pipeline_file(&cmd.file)?;
    let service = PipelineService::from_config(config, None);

    match service.planner().plan_parallel(&req) {
        Ok(plan) => {
            let kind = if req.as_sequential().is_some() { "sequential" } else { "parallel" };
            println!("{} Pipeline is valid!", CHECK);
            println!("  Name: {}", style(&plan.name).bold());
            println!("  Kind: {}", style(kind).cyan());
            println!("  Steps: {}", style(plan.step_count()).cyan());

            if cmd.json {
                println!("\n{}", serde_json::to_string_pretty(&req)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(EXIT_INVALID_PIPELINE);
        }
    }
}

async fn serve(cmd: &ServeCommand, config: &AppConfig) -> Result<()> {
    let history = open_history(config).await?;
    let service = PipelineService::from_config(config, history);
    info!(agents = ?service.agents(), "Agents registered");

    let app = create_router(service);
    let listener = tokio::net::TcpListener::bind(&cmd.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", cmd.bind))?;

    info!("Listening on {}", cmd.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, config: &AppConfig) -> Result<()> {
    let Some(store) = open_history(config).await? else {
        println!("{} Run history is disabled", WARN);
        return Ok(());
    };

    // If a specific run is requested
    if let Some(run_id) = cmd.run_id {
        match store.load_run(run_id).await? {
            Some(record) if cmd.json => println!("{}", serde_json::to_string_pretty(&record)?),
            Some(record) => {
                println!("  {}", format_run_record(&record));
                print_result(&record.result, false)?;
            }
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    if cmd.pipelines {
        let names = store.list_pipelines().await?;
        if cmd.json {
            println!("{}", serde_json::to_string_pretty(&names)?);
        } else if names.is_empty() {
            println!("{} No runs found", INFO);
        } else {
            println!("{} Pipelines with recorded runs:", INFO);
            for name in &names {
                println!("  {}", style(name).cyan());
            }
        }
        return Ok(());
    }

    let runs = match &cmd.pipeline {
        Some(pipeline) => store.list_runs(pipeline, cmd.limit).await?,
        None => store.recent_runs(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for record in &runs {
        println!("  {}", format_run_record(record));
    }

    Ok(())
}

fn list_agents(cmd: &AgentsCommand, config: &AppConfig) -> Result<()> {
    let service = PipelineService::from_config(config, None);
    let agents = service.agents();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    println!("{} Registered agents:", INFO);
    for agent in &agents {
        let note = if config.disallowed_agents.contains(agent) {
            style(" (disallowed)").red().to_string()
        } else {
            String::new()
        };
        println!("  {}{}", style(agent).bold(), note);
    }
    Ok(())
}
