//! tinyrpc demo server.
//!
//! ```text
//!     Client (tinyrpc-cli / Client)
//!         │  HTTP/2 stream: :method, :path = /name, body
//!         ▼
//!   ┌───────────┐   ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//!   │ listener  │──▶│ HTTP/2 conn │──▶│ middleware chain │──▶│ procedure │
//!   └───────────┘   └─────────────┘   └──────────────────┘   └─────┬─────┘
//!                                                                  │
//!         ◀────────── headers + body (gzip+base64 on accept: gzip) ┘
//! ```
//!
//! Serves `hi` and `echo`, logs each call from a middleware, and shuts down
//! on SIGTERM/SIGINT/SIGUSR1/SIGUSR2.

use std::path::PathBuf;

use clap::Parser;
use tinyrpc::config::{load_config, ServerConfig};
use tinyrpc::observability::{logging, metrics};
use tinyrpc::{Middleware, Procedure, Server};

#[derive(Parser)]
#[command(name = "tinyrpc")]
#[command(about = "Demo RPC server over HTTP/2", long_about = None)]
struct Cli {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    logging::init_logging(&config.observability);

    tracing::info!("tinyrpc v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let port = cli.port.unwrap_or(config.listener.port);
    let server = Server::new(config);

    server.use_middleware(Middleware::sync(|ctx| {
        tracing::info!(
            method = ctx.request.headers.method.as_deref().unwrap_or("-"),
            path = %ctx.request.headers.path,
            len = ctx.request.body.len(),
            "Incoming call"
        );
    }));
    server.attach("hi", Procedure::sync(|ctx| ctx.response.body.push_str("Hi!")));
    server.attach(
        "echo",
        Procedure::new(|ctx| {
            Box::pin(async move {
                ctx.response.body = ctx.request.body.clone();
            })
        }),
    );
    server.graceful(Some(Box::new(|| tracing::info!("Goodbye"))));

    server.listen(port).await?;
    server.install_signal_handlers();
    server.closed().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
