//! warbler - MCP music generation server
//!
//! Subcommands:
//! - `warbler serve` - Serve `generate_music` over stdio (default)
//! - `warbler generate` - Generate one song from the command line
//! - `warbler config` - Show the effective configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use baton::ToolContext;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use warblerconf::{ConfigSources, WarblerConfig};

use warbler::{telemetry, MusicGenerator, WarblerHandler};

#[derive(Parser)]
#[command(name = "warbler")]
#[command(about = "MCP server that generates music through the Suno task API")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./warbler.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,

    /// Generate one song and print the result
    Generate(GenerateArgs),

    /// Print the effective configuration and where it came from
    Config,
}

#[derive(Args)]
struct GenerateArgs {
    /// Lyrics (custom mode)
    #[arg(long)]
    prompt: Option<String>,

    /// Comma-separated style tags (custom mode)
    #[arg(long)]
    tags: Option<String>,

    /// Song title (custom mode)
    #[arg(long)]
    title: Option<String>,

    /// Free-form description (inspiration mode)
    #[arg(long)]
    description: Option<String>,

    /// chirp-v3-0, chirp-v3-5 or chirp-v4
    #[arg(long)]
    model: Option<String>,

    /// No vocals
    #[arg(long)]
    instrumental: bool,

    /// Task id of the clip to continue
    #[arg(long)]
    continue_task_id: Option<String>,

    /// Seconds into the clip to continue from
    #[arg(long)]
    continue_at: Option<f64>,

    /// Clip id to continue
    #[arg(long)]
    continue_clip_id: Option<String>,
}

impl GenerateArgs {
    /// The same argument bag an MCP client would send.
    fn into_arguments(self) -> Value {
        let mut args = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                args.insert(key.to_string(), value);
            }
        };

        put("prompt", self.prompt.map(Value::from));
        put("tags", self.tags.map(Value::from));
        put("title", self.title.map(Value::from));
        put("gpt_description_prompt", self.description.map(Value::from));
        put("mv", self.model.map(Value::from));
        put("make_instrumental", self.instrumental.then_some(json!(true)));
        put("task_id", self.continue_task_id.map(Value::from));
        put("continue_at", self.continue_at.map(|at| json!(at)));
        put("continue_clip_id", self.continue_clip_id.map(Value::from));

        Value::Object(args)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Generate(args) => generate(cli.config, args).await,
        Commands::Config => show_config(cli.config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<(WarblerConfig, ConfigSources)> {
    let (config, sources) = WarblerConfig::load_with_sources_from(path.as_deref())
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok((config, sources))
}

fn log_startup(config: &WarblerConfig, sources: &ConfigSources) {
    tracing::info!(
        files = ?sources.files,
        env = ?sources.env_overrides,
        "Configuration loaded"
    );
    tracing::info!(
        base_url = %config.api.base_url,
        interval_ms = config.polling.interval_ms,
        max_attempts = config.polling.max_attempts,
        "Upstream API"
    );
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (config, sources) = load_config(config_path)?;
    let telemetry = telemetry::init(&config.telemetry)?;
    log_startup(&config, &sources);

    let generator =
        MusicGenerator::from_config(&config).context("Failed to create API client")?;
    let handler = Arc::new(WarblerHandler::new(generator));

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    tracing::info!("Serving MCP on stdio");
    let served = baton::serve_stdio(handler, shutdown)
        .await
        .context("MCP transport failed");

    tracing::info!("Shutting down");
    telemetry.shutdown();
    served
}

async fn generate(config_path: Option<PathBuf>, args: GenerateArgs) -> Result<()> {
    let (config, sources) = load_config(config_path)?;
    let telemetry = telemetry::init(&config.telemetry)?;
    log_startup(&config, &sources);

    let generator =
        MusicGenerator::from_config(&config).context("Failed to create API client")?;

    let cancellation = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancellation.clone()));
    let context = ToolContext {
        cancellation,
        ..Default::default()
    };

    let result = generator.generate(&args.into_arguments(), &context).await;
    telemetry.shutdown();

    let clip = result.map_err(|e| anyhow::anyhow!("{} [{}]", e, e.kind()))?;
    println!("{}", clip.to_text());
    Ok(())
}

fn show_config(config_path: Option<PathBuf>) -> Result<()> {
    let (config, sources) = WarblerConfig::load_with_sources_from(config_path.as_deref())
        .context("Failed to load configuration")?;

    print!("{}", config.to_toml());
    println!();
    println!("# Sources");
    if sources.files.is_empty() {
        println!("#   (no config files, compiled defaults)");
    }
    for file in &sources.files {
        println!("#   file: {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("#   env:  {}", var);
    }
    if let Err(e) = config.validate() {
        println!("# WARNING: {}", e);
    }
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
    token.cancel();
}
