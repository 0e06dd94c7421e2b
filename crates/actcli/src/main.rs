// crates/actcli/src/main.rs

use actcore::{
    handler_fn, ActivityScope, ContextSnapshot, EngineEvent, NextActivityKey, WorkflowScheme,
};
use actruntime::{EventBinding, FilePersistence, WorkflowRuntime};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "actflow")]
#[command(about = "Activity workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sample order workflow to completion
    Run {
        /// Directory for snapshot files (in-memory when omitted)
        #[arg(short, long)]
        snapshots: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run a waiting workflow and preempt it with a native event
    Preempt {
        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the contents of a snapshot file
    Inspect {
        /// Path to a snapshot JSON file
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { snapshots, verbose } => {
            init_logging(verbose);
            run_order_workflow(snapshots).await?;
        }

        Commands::Preempt { verbose } => {
            init_logging(verbose);
            run_preemption_demo().await?;
        }

        Commands::Inspect { file } => {
            inspect_snapshot(file)?;
        }
    }

    Ok(())
}

/// A small order pipeline: validate, reserve stock, charge, ship.
fn order_scheme() -> Arc<WorkflowScheme> {
    let step = |label: &str| {
        let label = label.to_string();
        handler_fn(move |scope: ActivityScope| {
            let label = label.clone();
            async move {
                println!("  ⚡ {} ({})", label, scope.activity.name);
                scope.context.sleep(Duration::from_millis(200)).await?;
                Ok(NextActivityKey::new("Ok"))
            }
        })
    };

    let mut b = WorkflowScheme::builder("order", "Ok");
    b.composite("Order");
    b.activity("Order.Validate")
        .handler(step("validating order"))
        .transition("Ok", "Order.Reserve");
    b.activity("Order.Reserve")
        .handler(step("reserving stock"))
        .transition("Ok", "Order.Charge");
    b.activity("Order.Charge")
        .handler(step("charging customer"))
        .transition("Ok", "Order.Ship");
    b.activity("Order.Ship").handler(step("shipping"));
    b.build().expect("valid scheme")
}

/// The preemption demo: a long wait that an `alarm` event cuts short.
fn alarm_scheme() -> Arc<WorkflowScheme> {
    let mut b = WorkflowScheme::builder("alarm-demo", "Done");
    b.composite("Root");
    b.subscribe("Root.Arm", "alarm", "Root.OnAlarm");
    b.activity("Root.Wait").handler(handler_fn(|scope: ActivityScope| async move {
        println!("  ⏳ waiting (would block for an hour)");
        scope.context.sleep(Duration::from_secs(3600)).await?;
        Ok(scope.default_key())
    }));
    b.activity("Root.OnAlarm").handler(handler_fn(|scope: ActivityScope| async move {
        println!("  🔔 alarm handled");
        Ok(scope.default_key())
    }));
    b.build().expect("valid scheme")
}

fn spawn_event_printer(runtime: &Arc<WorkflowRuntime>) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::WorkflowCreated { scheme, .. } => {
                    println!("▶️  Workflow created from scheme '{scheme}'");
                }
                EngineEvent::WorkflowStarted { .. } => {
                    println!("▶️  Workflow started");
                }
                EngineEvent::ContextChanged { checkpoint_depth, .. } => {
                    println!("  💾 checkpoint at depth {checkpoint_depth}");
                }
                EngineEvent::WorkflowCompleted { result, .. } => {
                    println!("✨ Workflow completed: {result}");
                }
                EngineEvent::WorkflowTerminated { reason, error, .. } => {
                    println!("💥 Workflow terminated: {reason} ({error})");
                }
            }
        }
    })
}

async fn run_order_workflow(snapshots: Option<PathBuf>) -> Result<()> {
    let runtime = WorkflowRuntime::new();
    if let Some(dir) = &snapshots {
        runtime.set_persistence(Arc::new(FilePersistence::new(dir)))?;
        println!("💾 Snapshots in: {}", dir.display());
    }
    runtime.start_runtime();

    let printer = spawn_event_printer(&runtime);

    let id = Uuid::new_v4();
    let instance = runtime.create_workflow(id, order_scheme())?;
    println!("🚀 Running order workflow {id}");
    instance.start();
    instance.join().await;

    // Let the printer drain the tail of the event stream.
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();

    if let Some(dir) = snapshots {
        println!();
        println!("Inspect the final snapshot with:");
        println!("  actflow inspect {}/{id}.json", dir.display());
    }
    Ok(())
}

async fn run_preemption_demo() -> Result<()> {
    let runtime = WorkflowRuntime::new();
    runtime.start_runtime();

    let printer = spawn_event_printer(&runtime);

    let id = Uuid::new_v4();
    let instance = runtime.create_workflow(id, alarm_scheme())?;
    println!("🚀 Running alarm workflow {id}");
    instance.start();

    let binding = EventBinding::new(&instance, "alarm");
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("🔥 Firing 'alarm'");
    let fired = binding.fire();
    println!("   routed to {fired} handler(s)");

    instance.join().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();
    Ok(())
}

fn inspect_snapshot(file: PathBuf) -> Result<()> {
    let json = std::fs::read_to_string(&file)?;
    let snapshot: ContextSnapshot = serde_json::from_str(&json)?;

    println!("🔍 Snapshot: {}", file.display());
    println!("   Scheme: {}", snapshot.scheme);
    println!("   Checkpoint depth: {}", snapshot.tracking_stack.len());
    for (depth, activity) in snapshot.tracking_stack.iter().enumerate() {
        println!("   {}{}", "  ".repeat(depth), activity);
    }
    if !snapshot.event_handlers.is_empty() {
        println!("   Event handlers:");
        for (event, handlers) in &snapshot.event_handlers {
            println!("     {} -> {}", event, handlers.join(", "));
        }
    }
    Ok(())
}
