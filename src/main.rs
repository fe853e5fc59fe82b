use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use speech_scorer::{
    build_router,
    cli::{execute_command, Cli, Commands},
    config::{Config, LogFormat},
    AppState, Pipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Serve { bind, upload_dir } = &command {
        if let Some(bind) = bind {
            config.server.bind_addr = bind.clone();
        }
        if let Some(upload_dir) = upload_dir {
            config = config.with_upload_dir(upload_dir.clone());
        }
    }

    init_logging(&config);

    let pipeline = match Pipeline::from_config(&config).await {
        Ok(p) => {
            info!(
                upload_dir = %config.storage.upload_dir.display(),
                database = %config.database.path.display(),
                model = %config.genai.model,
                "Pipeline initialized"
            );
            p
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize pipeline");
            return Err(e.into());
        }
    };

    if !matches!(command, Commands::Serve { .. }) {
        let result = execute_command(command, &pipeline).await;
        if result.exit_code == 0 {
            println!("{}", result.message);
        } else {
            eprintln!("{}", result.message);
        }
        std::process::exit(result.exit_code);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Speech scorer starting...");

    let router = build_router(AppState::new(pipeline), &config.server);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
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
