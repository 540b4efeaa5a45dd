//! Switchyard demo server.
//!
//! ```text
//! GET /health        → {"status":"ok"}
//! GET /echo/:word    → the word
//! GET /limited       → throttled to 10 requests per minute
//! GET /visits        → per-session visit counter (cookie "sid")
//! GET /ws            → WebSocket echo
//! ```

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;

use switchyard::config::{load_config, ListenerConfig, ServerConfig};
use switchyard::http::websocket::{self, WebSocket};
use switchyard::http::{interceptor_fn, Outcome, Reply, Server, ServerError};
use switchyard::lifecycle::signals::wait_for_shutdown;
use switchyard::observability::{logging, metrics};
use switchyard::routing::Route;
use switchyard::security::Throttle;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Demo application for the switchyard HTTP server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address when the configuration has no listeners
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if config.listeners.is_empty() {
        config.listeners.push(ListenerConfig {
            address: cli.address.clone(),
            port: cli.port,
            ..Default::default()
        });
    }

    logging::init(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.metrics.address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut server = Server::new(config);
    register_demo_routes(&mut server)?;

    for addr in server.serve().await? {
        tracing::info!(address = %addr, "Listening for connections");
    }

    let signal = wait_for_shutdown().await?;
    tracing::info!(signal, "Shutdown signal received");
    server.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn register_demo_routes(server: &mut Server) -> Result<(), ServerError> {
    server.after(interceptor_fn("access-log", |ctx| {
        Box::pin(async move {
            if let Some(response) = ctx.response() {
                tracing::info!(status = response.status().as_u16(), "Request completed");
            }
            Outcome::Continue
        })
    }))?;

    server
        .get("/health", |_ctx| {
            Box::pin(async { Reply::json(StatusCode::OK, &json!({ "status": "ok" })) })
        })?
        .get("/echo/:word", |ctx| {
            Box::pin(async move {
                let word = ctx.param("word").unwrap_or_default().to_string();
                Ok(Reply::text(StatusCode::OK, word))
            })
        })?
        .route(
            Route::get("/limited", |_ctx| {
                Box::pin(async { Ok(Reply::text(StatusCode::OK, "within limit")) })
            })
            .before(Throttle::new(10, Duration::from_secs(60))),
        )?
        .get("/visits", |ctx| {
            Box::pin(async move {
                let session = ctx.session_mut().await?;
                let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
                session.insert("visits", visits)?;
                Ok(Reply::text(StatusCode::OK, format!("visits: {visits}")))
            })
        })?
        .get("/ws", |ctx| Box::pin(async move { websocket::upgrade(ctx, echo) }))?;

    Ok(())
}

async fn echo(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.next().await {
        if message.is_close() {
            break;
        }
        if (message.is_text() || message.is_binary()) && socket.send(message).await.is_err() {
            break;
        }
    }
}
