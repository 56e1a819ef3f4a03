// crates/edgecli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use edgecore::{JsonObject, RuntimeConfig, TimeUnit, Tuple};
use edgeoplets::TopologyExt;
use edgeruntime::{ApplicationService, DirectProvider, Topology};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edgeflow")]
#[command(about = "Edge dataflow runtime CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the demo applications
    Apps,

    /// Dispatch JSON control requests, one per line
    Control {
        /// File of requests; stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// How long to let jobs run after the last request
        #[arg(long, default_value_t = 500)]
        linger_ms: u64,
    },

    /// Write an example request file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "requests.jsonl")]
        output: PathBuf,
    },
}

/// Applications every runtime started by the CLI knows about.
fn register_demo_apps(apps: &ApplicationService) {
    apps.register_topology("strings", |topology: &mut Topology, _config: &mut JsonObject| {
        let words = topology.strings(["alpha", "beta", "gamma"]);
        let upper = topology.map(words, |tuple| {
            tuple.as_str().map(|s| Tuple::String(s.to_uppercase()))
        });
        topology.debug(upper);
    });

    apps.register_topology("ticker", |topology: &mut Topology, config: &mut JsonObject| {
        let period = config.get("periodMs").and_then(Value::as_u64).unwrap_or(1000);
        let counter = Arc::new(AtomicU64::new(0));
        let ticks = topology.poll(period, TimeUnit::Milliseconds, move || {
            Ok(Some(json!({ "tick": counter.fetch_add(1, Ordering::SeqCst) })))
        });
        topology.debug(ticks);
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apps => {
            list_apps()?;
        }

        Commands::Control {
            file,
            config,
            verbose,
            linger_ms,
        } => {
            let default_level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(default_level)),
                )
                .init();

            run_control(file, config, linger_ms).await?;
        }

        Commands::Init { output } => {
            create_example_requests(output)?;
        }
    }

    Ok(())
}

fn list_apps() -> Result<()> {
    let provider = Arc::new(DirectProvider::new());
    let apps = ApplicationService::create_and_register(&provider)?;
    register_demo_apps(&apps);

    let mut names: Vec<String> = apps.application_names().into_iter().collect();
    names.sort();

    println!("📦 Applications:");
    for name in names {
        println!("  • {}", name);
    }
    Ok(())
}

async fn run_control(file: Option<PathBuf>, config: Option<PathBuf>, linger_ms: u64) -> Result<()> {
    let config: RuntimeConfig = match config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)?,
        None => RuntimeConfig::default(),
    };

    let requests = match file {
        Some(path) => std::fs::read_to_string(&path)?,
        None => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            input
        }
    };

    let provider = Arc::new(DirectProvider::with_config(config));
    let apps = ApplicationService::create_and_register(&provider)?;
    register_demo_apps(&apps);
    let dispatcher = provider.dispatcher();

    for line in requests.lines().map(str::trim).filter(|line| !line.is_empty()) {
        tracing::debug!("Dispatching control request: {}", line);
        let outcome = match serde_json::from_str::<Value>(line) {
            Ok(request) => dispatcher.handle(&request).await,
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(Value::Bool(true)) => println!("ok"),
            Ok(_) => println!("not found"),
            Err(e) => {
                tracing::warn!("Control request failed: {}", e);
                println!("failed: {}", e);
            }
        }
    }

    tokio::time::sleep(std::time::Duration::from_millis(linger_ms)).await;

    println!();
    println!("📋 Jobs:");
    let snapshots = provider.job_registry().snapshots();
    if snapshots.is_empty() {
        println!("   (none)");
    }
    for snapshot in snapshots {
        let next = snapshot
            .next_state
            .map_or_else(|| "-".to_string(), |state| state.to_string());
        println!(
            "   {:<10} {:<20} {:<12} {:<12} {}",
            snapshot.id,
            snapshot.name,
            snapshot.current_state,
            next,
            snapshot.updated_at.to_rfc3339()
        );
    }

    Ok(())
}

fn create_example_requests(output: PathBuf) -> Result<()> {
    let alias = RuntimeConfig::default().application_alias;
    let requests = [
        json!({"type": "appService", "alias": alias, "op": "submit", "args": ["strings", ""]}),
        json!({"type": "appService", "alias": alias, "op": "submit", "args": ["ticker", {"jobName": "ticker", "periodMs": 200}]}),
        json!({"type": "job", "alias": "ticker", "op": "stateChange", "args": ["CLOSE"]}),
    ];

    let lines: Vec<String> = requests.iter().map(Value::to_string).collect();
    std::fs::write(&output, lines.join("\n") + "\n")?;

    println!("✨ Created example requests: {}", output.display());
    println!();
    println!("Run them with:");
    println!("  edgeflow control --file {}", output.display());

    Ok(())
}
