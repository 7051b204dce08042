use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;

use blinkdx_review::app::{build_router, AppState};
use blinkdx_review::auth::UserDirectory;
use blinkdx_review::cli::Cli;
use blinkdx_review::config::Config;
use blinkdx_review::error::AppError;
use blinkdx_review::logging::init_logging;
use blinkdx_review::metrics::AppMetrics;

fn exit_with(err: AppError) -> ! {
    tracing::error!("{}", err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map_err(AppError::Config)
        .unwrap_or_else(|err| exit_with(err))
        .apply_cli(&cli);

    tracing::info!(
        backend = %config.api_base_url,
        batch = config.frame_batch_size,
        secure_cookies = config.secure_cookies,
        "Service starting"
    );

    let users = match &config.users_file {
        Some(path) => UserDirectory::from_file(path).unwrap_or_else(|err| exit_with(err)),
        None => {
            tracing::warn!("USERS_FILE not set; using built-in demo accounts");
            UserDirectory::demo()
        }
    };
    tracing::info!("{} account(s) can sign in", users.len());

    let metrics = AppMetrics::new()
        .map(Arc::new)
        .unwrap_or_else(|err| exit_with(AppError::Config(format!("metrics registry: {}", err))));

    let state = Arc::new(AppState::new(&config, users, metrics));
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .unwrap_or_else(|err| exit_with(AppError::Config(format!("cannot bind {}: {}", config.bind_addr, err))));
    tracing::info!("Listening on {}", config.bind_addr);

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
    {
        exit_with(AppError::Unknown(format!("server error: {}", err)));
    }

    tracing::info!("Server stopped cleanly");
}
