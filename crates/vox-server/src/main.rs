//! vox-server: Vox Studio main binary
//!
//! Usage:
//!   vox-server                  - Start the HTTP API
//!   vox-server --config PATH    - Start with an explicit config file
//!   vox-server --help           - Show help

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vox_core::telemetry::{HttpSink, LogSink, Telemetry, TelemetrySink};
use vox_core::{
    Config, Database, Pipeline, SqliteGenerationLedger, SqliteQuotaLedger, TelemetryConfig,
};

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    Server { config_path: Option<String> },
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = match parse_args(std::env::args().skip(1))? {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("vox-server {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server { config_path } => config_path,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting vox-server...");
    run_server(config).await
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<RunMode> {
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config_path = Some(path);
            }
            other => match other.strip_prefix("--config=") {
                Some(path) => config_path = Some(path.to_string()),
                None => anyhow::bail!("Unknown argument: {} (see --help)", other),
            },
        }
    }

    Ok(RunMode::Server { config_path })
}

fn print_help() {
    println!("vox-server - Vox Studio audio generation API");
    println!();
    println!("Usage:");
    println!("  vox-server                 Start the HTTP API");
    println!("  vox-server --config PATH   Load configuration from PATH (default: vox.toml)");
    println!("  vox-server --help          Show this help message");
    println!("  vox-server --version       Show version");
    println!();
    println!("Environment Variables:");
    println!("  VOX_CONFIG            Config file path");
    println!("  PORT                  HTTP port (default: 3000)");
    println!("  API_KEY               Bearer key expected from the upstream proxy");
    println!("  DB_PATH               SQLite path (default: data/vox.db)");
    println!("  PRIMARY_PROVIDER      elevenlabs, minimax or noiz (default: elevenlabs)");
    println!("  ELEVENLABS_API_KEY    ElevenLabs API key");
    println!("  MINIMAX_API_KEY       Minimax API key");
    println!("  NOIZ_API_KEY          Noiz API key");
    println!("  STORAGE_BACKEND       b2 or memory (default: b2)");
    println!("  B2_KEY_ID, B2_APPLICATION_KEY, B2_BUCKET_ID, B2_BUCKET_NAME");
    println!("  POSTHOG_API_KEY       Analytics key (optional)");
    println!("  RUST_LOG              Log filter (default: info)");
}

fn build_telemetry(config: &TelemetryConfig) -> anyhow::Result<Telemetry> {
    if !config.enabled {
        tracing::info!("Telemetry disabled");
        return Ok(Telemetry::disabled());
    }

    let mut sinks: Vec<Arc<dyn TelemetrySink>> = Vec::new();

    let log_sink = match &config.log_file {
        Some(path) => LogSink::with_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to open telemetry log {}: {}", path, e))?,
        None => LogSink::new(),
    };
    sinks.push(Arc::new(log_sink));

    if let (Some(endpoint), Some(api_key)) = (&config.endpoint, &config.api_key) {
        let sink = HttpSink::new(endpoint, api_key)
            .map_err(|e| anyhow::anyhow!("Failed to create telemetry client: {}", e))?;
        tracing::info!("Telemetry capture endpoint: {}", endpoint);
        sinks.push(Arc::new(sink));
    }

    Ok(Telemetry::new(sinks))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

    let quota = Arc::new(SqliteQuotaLedger::new(db.clone(), config.plans.clone()));
    let generations = Arc::new(SqliteGenerationLedger::new(db));

    let providers = vox_voice::build_gateway(&config.providers)
        .map_err(|e| anyhow::anyhow!("Failed to configure providers: {}", e))?;
    let store = vox_storage::build_store(&config.storage)
        .map_err(|e| anyhow::anyhow!("Failed to configure storage: {}", e))?;
    let telemetry = build_telemetry(&config.telemetry)?;

    let pipeline = Pipeline::new(quota, Arc::new(providers), store, generations)
        .with_telemetry(telemetry)
        .with_limits(config.validation.clone());

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    };

    vox_api::start_server(config.server, pipeline, shutdown).await?;

    tracing::info!("vox-server stopped");
    Ok(())
}
