use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use workflow_monitor::bus::event_types::EVENT_LOG_APPENDED;
use workflow_monitor::monitor::AgentInfo;
use workflow_monitor::{HttpWorkflowApi, MonitorConfig, RunState, WorkflowController};

/// Run and watch multi-agent content workflows
#[derive(Parser, Debug)]
#[command(name = "workflow-monitor", version)]
struct Args {
    /// Service base URL
    #[arg(long, env = "WORKFLOW_MONITOR_BASE_URL")]
    base_url: Option<String>,

    /// Probe the service health endpoint before starting
    #[arg(long)]
    preflight: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a workflow and follow it until it finishes
    Run {
        /// JSON file with the workflow configuration ("-" reads stdin)
        #[arg(long)]
        request: PathBuf,
        /// Write the results here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Use the server's agent list instead of the built-in catalog
        #[arg(long)]
        remote_agents: bool,
    },
    /// Show the server-side status of a workflow
    Status { workflow_id: String },
    /// List the agents the service advertises
    Agents,
    /// Download the packaged output of a completed workflow
    Package {
        workflow_id: String,
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("workflow-monitor failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("workflow_monitor=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = MonitorConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    config.preflight |= args.preflight;
    config.validate().map_err(|e| e.to_string())?;

    match args.command {
        Command::Run {
            request,
            output,
            remote_agents,
        } => run_workflow(&config, request, output, remote_agents).await,
        Command::Status { workflow_id } => {
            let api = HttpWorkflowApi::new(&config).map_err(|e| e.to_string())?;
            let status = api
                .fetch_status(&workflow_id)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&status)
        }
        Command::Agents => {
            let api = HttpWorkflowApi::new(&config).map_err(|e| e.to_string())?;
            let agents = api.list_agents().await.map_err(|e| e.to_string())?;
            for agent in agents {
                let powered_by = agent.powered_by.as_deref().unwrap_or("-");
                println!("{:<20} {:<22} {} ({powered_by})", agent.id, agent.name, agent.description);
            }
            Ok(())
        }
        Command::Package {
            workflow_id,
            output,
        } => {
            let api = HttpWorkflowApi::new(&config).map_err(|e| e.to_string())?;
            let bytes = api
                .download_package(&workflow_id)
                .await
                .map_err(|e| e.to_string())?;
            std::fs::write(&output, &bytes)
                .map_err(|e| format!("failed to write {}: {e}", output.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), output.display());
            Ok(())
        }
    }
}

async fn run_workflow(
    config: &MonitorConfig,
    request: PathBuf,
    output: Option<PathBuf>,
    remote_agents: bool,
) -> Result<(), String> {
    let body = if request.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| format!("failed to read request from stdin: {e}"))?
    } else {
        std::fs::read_to_string(&request)
            .map_err(|e| format!("failed to read {}: {e}", request.display()))?
    };
    let workflow_config: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| format!("request is not valid JSON: {e}"))?;

    let mut controller = WorkflowController::from_config(config).map_err(|e| e.to_string())?;
    if remote_agents {
        let api = HttpWorkflowApi::new(config).map_err(|e| e.to_string())?;
        let catalog: Vec<AgentInfo> = api
            .list_agents()
            .await
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(AgentInfo::from)
            .collect();
        controller = controller.with_catalog(catalog);
    }

    let mut events = controller.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.event_type == EVENT_LOG_APPENDED => {
                    let kind = event.payload["kind"].as_str().unwrap_or("system");
                    let text = event.payload["text"].as_str().unwrap_or_default();
                    eprintln!("[{kind:>8}] {text}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("[  system] ({skipped} log lines skipped)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let started = controller.start(&workflow_config).await.map(|_| ());
    let outcome = match started {
        Ok(()) => controller.wait_for_terminal().await.clone(),
        Err(e) => {
            let mut run = controller.run().clone();
            run.last_error.get_or_insert_with(|| e.to_string());
            run
        }
    };
    let results = controller.results().cloned();
    drop(controller);
    let _ = printer.await;

    match outcome.state {
        RunState::Completed => match results {
            Some(bundle) => {
                let rendered = serde_json::to_string_pretty(&bundle)
                    .map_err(|e| format!("failed to render results: {e}"))?;
                match output {
                    Some(path) => std::fs::write(&path, rendered)
                        .map_err(|e| format!("failed to write {}: {e}", path.display())),
                    None => {
                        println!("{rendered}");
                        Ok(())
                    }
                }
            }
            None => Err("workflow completed but results could not be loaded".to_string()),
        },
        state => Err(outcome
            .last_error
            .unwrap_or_else(|| format!("workflow ended in state {state}"))),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to render: {e}"))?;
    println!("{rendered}");
    Ok(())
}
