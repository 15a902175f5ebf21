use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use typeflow_core::{ExecutionEvent, Operation, OperationEvent, Value};
use typeflow_runtime::{FlowRuntime, RuntimeConfig, WorkflowDocument};

#[derive(Parser)]
#[command(name = "typeflow")]
#[command(about = "Typed operation workflow CLI", long_about = None)]
struct Cli {
    /// Runtime configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// External inputs as a JSON object
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available operation discriminants
    Operations,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    tracing::debug!(?config, "Runtime configuration");

    match cli.command {
        Commands::Run { file, input } => run_workflow(config, &file, input).await?,
        Commands::Validate { file } => validate_workflow(config, &file)?,
        Commands::Operations => list_operations()?,
        Commands::Init { output } => create_example_workflow(&output)?,
    }

    Ok(())
}

fn create_runtime(config: RuntimeConfig) -> Result<FlowRuntime> {
    let registry = typeflow_ops::standard_registry()?;
    Ok(FlowRuntime::with_registry(Arc::new(registry), config))
}

fn parse_inputs(input: Option<String>) -> Result<BTreeMap<String, Value>> {
    let Some(input) = input else {
        return Ok(BTreeMap::new());
    };

    match serde_json::from_str(&input)? {
        serde_json::Value::Object(entries) => Ok(entries
            .into_iter()
            .map(|(name, value)| (name, Value::from_json(value)))
            .collect()),
        _ => Err(anyhow::anyhow!("Input must be a JSON object")),
    }
}

async fn run_workflow(config: RuntimeConfig, file: &Path, input: Option<String>) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let runtime = create_runtime(config)?;
    let graph = runtime.load_file(file)?;
    let inputs = parse_inputs(input)?;

    println!("📋 Workflow: {}", graph.id());
    println!("   Operations: {}", graph.operations().len());
    println!("   Connections: {}", graph.connections().len());
    println!();

    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::JobStarted { job_id, .. } => {
                    println!("▶️  Job {} started", job_id);
                }
                ExecutionEvent::OperationStarted {
                    operation_id,
                    discriminant,
                    ..
                } => {
                    println!("  ⚡ Starting operation: {} ({})", operation_id, discriminant);
                }
                ExecutionEvent::OperationCompleted {
                    operation_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Operation {} completed in {}ms", operation_id, duration_ms);
                }
                ExecutionEvent::OperationFailed {
                    operation_id,
                    error,
                    ..
                } => {
                    println!("  ❌ Operation {} failed: {}", operation_id, error);
                }
                ExecutionEvent::OperationEvent {
                    operation_id,
                    event,
                    ..
                } => match event {
                    OperationEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", operation_id, message);
                    }
                    OperationEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", operation_id, message);
                    }
                    OperationEvent::Progress { percent, message } => match message {
                        Some(msg) => println!("     📊 [{}] {}% - {}", operation_id, percent, msg),
                        None => println!("     📊 [{}] {}%", operation_id, percent),
                    },
                },
                ExecutionEvent::JobCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Job completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Job failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    tracing::info!(workflow = %graph.id(), inputs = inputs.len(), "Executing workflow");
    let result = runtime.execute(&graph, inputs).await;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let outputs = result?;

    println!();
    if outputs.is_empty() {
        println!("📤 No external outputs");
    } else {
        println!("📤 Outputs:");
        for (name, value) in &outputs {
            println!("   {}: {}", name, value.to_json());
        }
    }

    Ok(())
}

fn validate_workflow(config: RuntimeConfig, file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let runtime = create_runtime(config)?;
    let graph = runtime.load_file(file)?;
    tracing::debug!(workflow = %graph.id(), "Workflow passed validation");

    println!("✅ Workflow is valid:");
    println!("   Id: {}", graph.id());
    println!("   Operations: {}", graph.operations().len());
    println!("   Connections: {}", graph.connections().len());
    println!("   Execution order: {}", graph.execution_order().join(" -> "));

    for field in graph.input_shape() {
        println!("   Input  {}: {}", field.name, field.ty);
    }
    for field in graph.output_shape() {
        println!("   Output {}: {}", field.name, field.ty);
    }

    Ok(())
}

fn list_operations() -> Result<()> {
    println!("📦 Available Operations:");
    println!();

    let registry = typeflow_ops::standard_registry()?;

    for discriminant in registry.discriminants() {
        match registry.metadata(discriminant) {
            Some(metadata) if metadata.hidden => {}
            Some(metadata) => {
                println!("  • {} ({})", discriminant, metadata.category);
                if !metadata.description.is_empty() {
                    println!("    {}", metadata.description);
                }
                for field in &metadata.fields {
                    println!("      - {}: {}", field.name, field.description);
                }
            }
            None => println!("  • {}", discriminant),
        }
    }

    for (alias, target) in registry.aliases() {
        println!("  • {} (alias of {})", alias, target);
    }

    Ok(())
}

fn example_document() -> Result<WorkflowDocument> {
    let document = json!({
        "id": "example",
        "operations": [
            { "id": "number", "discriminant": "workflowInput", "name": "number", "type": "number" },
            { "id": "shift", "discriminant": "offset", "amount": 10 },
            { "id": "log", "discriminant": "debug" },
            { "id": "result", "discriminant": "workflowOutput", "name": "result", "type": "string" }
        ],
        "connections": [
            { "source": { "operation": "number", "field": "Value" },
              "target": { "operation": "shift", "field": "Input" } },
            { "source": { "operation": "shift", "field": "Output" },
              "target": { "operation": "log", "field": "Value" } },
            { "source": { "operation": "log", "field": "Value" },
              "target": { "operation": "result", "field": "Value" } }
        ]
    });

    Ok(serde_json::from_value(document)?)
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let json = example_document()?.to_json_pretty()?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  typeflow run --file {} --input '{{\"number\": 32}}'",
        output.display()
    );

    Ok(())
}
