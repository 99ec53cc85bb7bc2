use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::config::AppConfig;
use crate::routes::app;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "expense-api")]
#[command(about = "Expense tracking REST API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides EXPENSE_API_PORT/PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Mint a development bearer token signed with JWT_SECRET")]
    Token {
        #[arg(long, help = "Principal id to embed as the token subject")]
        user: Uuid,
        #[arg(long, help = "Email claim")]
        email: Option<String>,
        #[arg(long, help = "Lifetime in hours (defaults to SECURITY_JWT_EXPIRY_HOURS)")]
        hours: Option<u64>,
    },
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Token { user, email, hours } => {
            let hours = hours.unwrap_or(config.security.jwt_expiry_hours);
            let claims = Claims::new(user, email, None, hours);
            let token = generate_jwt(&claims, &config.security.jwt_secret)?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn serve(mut config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.api.port = port;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(
        "Starting Expense API in {:?} mode with {:?} storage",
        config.environment,
        config.database.backend
    );

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    let (state, notifier) = AppState::from_config(config).await?;
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Expense API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Router and state are gone; let queued notifications drain
    if let Err(e) = notifier.await {
        tracing::warn!("Notification worker ended abnormally: {}", e);
    }
    tracing::info!("Expense API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
