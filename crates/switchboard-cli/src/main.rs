//! `switchboard` binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_actions::DetectionContext;
use switchboard_agent::{CompletionHandler, EchoCompletionService, HttpCompletionService};
use switchboard_core::{CompletionService, Priority, WorkerRequest};
use switchboard_orchestrator::{Engine, EngineConfig, ProcessRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard: capability-based routing for AI workers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print registered workers and their live stats
    Workers,
    /// Classify a request
    Classify {
        message: String,
        /// Attachment MIME type or file extension (repeatable)
        #[arg(short, long = "attachment")]
        attachments: Vec<String>,
    },
    /// Detect actions in text and show which would run
    Detect {
        text: String,
        /// Suggest every action instead of executing
        #[arg(long)]
        suggest_only: bool,
    },
    /// Send a message to a worker with an ordered fallback chain
    Route {
        primary: String,
        message: String,
        /// Fallback worker (repeatable, tried in order)
        #[arg(short, long = "fallback")]
        fallbacks: Vec<String>,
    },
    /// Classify, route, execute and gate a request end to end
    Run {
        message: String,
        /// Requesting worker; never selected as the target
        #[arg(long, default_value = "requester")]
        source: String,
        #[arg(short, long, default_value = "medium")]
        priority: String,
        #[arg(short, long = "attachment")]
        attachments: Vec<String>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so command output on stdout stays parseable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// One completion service per configured worker; workers without an HTTP
/// backend get the echo service.
fn build_handler(config: &EngineConfig) -> anyhow::Result<CompletionHandler> {
    let mut handler = CompletionHandler::new();
    for worker in &config.workers {
        let service: Arc<dyn CompletionService> = match config.backends.get(&worker.id) {
            Some(backend) => {
                info!(worker = %worker.id, model = %backend.model_id, "Using HTTP completion backend");
                Arc::new(HttpCompletionService::new(backend.clone())?)
            }
            None => {
                info!(worker = %worker.id, "No backend configured, using echo backend");
                Arc::new(EchoCompletionService::new(worker.id.clone()))
            }
        };
        handler.insert(worker.id.clone(), service);
    }
    Ok(handler)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    // API keys referenced by `api_key_env` may live in a local .env file.
    let _ = dotenvy::dotenv();

    let config = EngineConfig::from_file(&cli.config).map_err(|e| {
        anyhow::anyhow!("Failed to load config file '{}': {}", cli.config.display(), e)
    })?;
    let handler = build_handler(&config)?;
    let engine = Engine::builder(config).with_handler(Arc::new(handler)).build()?;
    engine.initialize().await?;

    let result = run_command(&engine, cli.command).await;
    engine.shutdown().await;
    result
}

async fn run_command(engine: &Engine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Workers => print_json(&engine.registry().to_json()),
        Commands::Classify { message, attachments } => {
            print_json(&engine.classify_request(&message, &attachments))
        }
        Commands::Detect { text, suggest_only } => {
            let context = if suggest_only {
                DetectionContext::default().suggest_only()
            } else {
                DetectionContext::default()
            };
            let gated = engine
                .detect_and_gate_actions(&text, &context, &serde_json::Value::Null)
                .await;
            print_json(&gated)
        }
        Commands::Route {
            primary,
            message,
            fallbacks,
        } => {
            let response = engine
                .route_with_fallback(&primary, &fallbacks, &WorkerRequest::new(message))
                .await;
            print_json(&response)
        }
        Commands::Run {
            message,
            source,
            priority,
            attachments,
        } => {
            let request = ProcessRequest::new(message)
                .with_source(source)
                .with_priority(Priority::parse_level(&priority))
                .with_attachments(attachments);
            let outcome = engine.process_request(request).await?;
            print_json(&outcome)
        }
    }
}
