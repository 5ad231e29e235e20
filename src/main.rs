use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use workshop_insights::{
    build_router,
    cli::{execute_clear, execute_stats, execute_sync, CliResult, Commands},
    config::{Config, LogFormat},
    storage::SqliteStorage,
    tally::TallyClient,
    AppState,
};

/// Workshop registration insights backend
#[derive(Parser, Debug)]
#[command(name = "workshop-insights", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => return serve(config, storage).await,
        Commands::Sync => {
            let tally = TallyClient::new(&config.tally, config.request.clone())?;
            execute_sync(&tally, &storage).await
        }
        Commands::Stats { limit } => execute_stats(&storage, &config.tally.form_id, limit).await,
        Commands::Clear => execute_clear(&storage, &config.tally.form_id).await,
    };

    exit_with(result)
}

async fn serve(config: Config, storage: SqliteStorage) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Workshop insights server starting..."
    );

    let state = AppState::new(&config, Arc::new(storage))?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "Listening for HTTP requests");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn exit_with(result: CliResult) -> anyhow::Result<()> {
    if result.exit_code == 0 {
        println!("{}", result.message);
        Ok(())
    } else {
        eprintln!("{}", result.message);
        std::process::exit(result.exit_code);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
