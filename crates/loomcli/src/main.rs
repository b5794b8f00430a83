mod host;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use host::ConsoleHost;
use loomcore::{Flow, FlowEvent, IssueSeverity, ValueMap, MAIN_HANDLE};
use loomruntime::{is_runnable, FlowRuntime, NodeRegistry};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Loomflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to a flow JSON file (one flow, or an array whose first
        /// element is the entry flow)
        #[arg(short, long)]
        file: PathBuf,

        /// Entry payload as a JSON value, delivered on the trigger's main
        /// handle
        #[arg(short, long)]
        input: Option<String>,

        /// Print execution events as they happen
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        file: PathBuf,
    },

    /// List available node types
    Nodes,
}

fn load_flows(path: &PathBuf) -> Result<Vec<Flow>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing flow JSON")?;
    let flows = if value.is_array() {
        serde_json::from_value(value).context("parsing flow list")?
    } else {
        vec![serde_json::from_value(value).context("parsing flow")?]
    };
    Ok(flows)
}

fn build_registry() -> Result<Arc<NodeRegistry>> {
    let mut registry = NodeRegistry::new();
    loomnodes::register_all(&mut registry)?;
    Ok(Arc::new(registry))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { file, input, verbose } => run(file, input, verbose).await,
        Commands::Validate { file } => validate(file),
        Commands::Nodes => {
            let registry = build_registry()?;
            for node_type in registry.node_types() {
                let definition = registry.require(node_type)?;
                println!("{node_type:<24} {}", definition.label());
            }
            Ok(())
        }
    }
}

async fn run(file: PathBuf, input: Option<String>, verbose: bool) -> Result<()> {
    let flows = load_flows(&file)?;
    let Some(entry_flow) = flows.first().map(|f| f.id.clone()) else {
        bail!("flow file is empty");
    };

    let registry = build_registry()?;
    let runtime = FlowRuntime::new(registry, Arc::new(ConsoleHost::new()));
    for flow in flows {
        tracing::debug!(flow_id = %flow.id, "flow loaded");
        runtime.insert_flow(flow).await;
    }
    tracing::info!(flow_id = %entry_flow, file = %file.display(), "executing flow");

    if verbose {
        let mut events = runtime.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    FlowEvent::RunStarted { flow_id, depth, .. } => {
                        eprintln!("run started: {flow_id} (depth {depth})");
                    }
                    FlowEvent::NodeStarted { node_id, node_type, .. } => {
                        eprintln!("  -> {node_id} ({node_type})");
                    }
                    FlowEvent::NodeFinished { node_id, error, duration_ms, .. } => {
                        match error {
                            Some(e) => eprintln!("  !! {node_id} failed: {e}"),
                            None => eprintln!("  ok {node_id} ({duration_ms}ms)"),
                        }
                    }
                    FlowEvent::RunFinished { flow_id, status, .. } => {
                        eprintln!("run finished: {flow_id} ({status:?})");
                    }
                }
            }
        });
    }

    let mut entry = ValueMap::new();
    if let Some(raw) = input {
        let value: serde_json::Value = serde_json::from_str(&raw).context("parsing --input")?;
        entry.insert(MAIN_HANDLE.to_string(), value);
    }

    let report = runtime.execute_flow(&entry_flow, entry).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.error.is_some() {
        bail!("run failed");
    }
    Ok(())
}

fn validate(file: PathBuf) -> Result<()> {
    let flows = load_flows(&file)?;
    let registry = build_registry()?;
    let mut ok = true;

    for flow in &flows {
        let issues = loomruntime::validate_flow(flow, &registry);
        if issues.is_empty() {
            println!("{}: ok", flow.id);
            continue;
        }
        for node in &issues {
            for issue in &node.issues {
                let severity = match issue.severity {
                    IssueSeverity::Error => "error",
                    IssueSeverity::Warning => "warning",
                };
                println!("{}: {severity} at node '{}': {}", flow.id, node.node_id, issue.message);
            }
        }
        ok &= is_runnable(&issues);
    }

    if !ok {
        bail!("validation failed");
    }
    Ok(())
}
